use crate::clinic::EntityClass;

use super::{
    client_consultations_key, client_sessions_key, clinic_clients_key, clinic_therapists_key,
    therapist_clients_key, therapist_sessions_key, QueryKey,
};

/// Returns the keys the next screen is likely to need after navigating to
/// an entity.
///
/// # Examples
///
/// ```
/// use clinicsync_core::cache::{client_sessions_key, prefetch_targets};
/// use clinicsync_core::clinic::EntityClass;
///
/// let targets = prefetch_targets(EntityClass::Client, "42");
/// assert!(targets.contains(&client_sessions_key("42")));
/// ```
pub fn prefetch_targets(class: EntityClass, id: &str) -> Vec<QueryKey> {
    match class {
        EntityClass::Client => vec![client_sessions_key(id), client_consultations_key(id)],
        EntityClass::Therapist => vec![therapist_clients_key(id), therapist_sessions_key(id)],
        EntityClass::Clinic => vec![clinic_therapists_key(id), clinic_clients_key(id)],
        EntityClass::Session
        | EntityClass::Consultation
        | EntityClass::Profile
        | EntityClass::Analytics => Vec::new(),
    }
}
