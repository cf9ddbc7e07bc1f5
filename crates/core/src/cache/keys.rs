use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clinic::{Collection, EntityClass};

/// Prefix carried by ids synthesized for staged creates.
const TEMP_ID_PREFIX: &str = "temp-";

/// Identifies one cached query result.
///
/// A key is an entity class followed by an ordered list of parameter
/// segments. `["client"]` is the client list, `["client", "42"]` is a single
/// client and `["client", "42", "sessions"]` is that client's session list.
/// The displayed form joins segments with `:` (`client:42:sessions`) and is
/// what glob patterns are matched against, so ids must not contain `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    class: EntityClass,
    segments: Vec<String>,
}

impl QueryKey {
    /// Creates the class-wide key (`[class]`).
    pub fn new(class: EntityClass) -> Self {
        Self {
            class,
            segments: Vec::new(),
        }
    }

    /// Appends a parameter segment.
    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn class(&self) -> EntityClass {
        self.class
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the entity id when the key is scoped to one entity.
    pub fn entity_id(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Returns true for the class-wide list key.
    pub fn is_list(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns true if `prefix` is a leading sub-sequence of this key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.class == prefix.class && self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class.as_str())?;
        for segment in &self.segments {
            write!(f, ":{}", segment)?;
        }
        Ok(())
    }
}

/// Returns the class-wide list key.
pub fn list_key(class: EntityClass) -> QueryKey {
    QueryKey::new(class)
}

/// Returns the key for a single entity of any class.
pub fn entity_key(class: EntityClass, id: &str) -> QueryKey {
    QueryKey::new(class).with(id)
}

/// Returns the key for a collection owned by an entity.
pub fn collection_key(class: EntityClass, id: &str, collection: Collection) -> QueryKey {
    entity_key(class, id).with(collection.as_str())
}

pub fn client_list_key() -> QueryKey {
    list_key(EntityClass::Client)
}

pub fn client_key(client_id: &str) -> QueryKey {
    entity_key(EntityClass::Client, client_id)
}

pub fn client_sessions_key(client_id: &str) -> QueryKey {
    collection_key(EntityClass::Client, client_id, Collection::Sessions)
}

pub fn client_consultations_key(client_id: &str) -> QueryKey {
    collection_key(EntityClass::Client, client_id, Collection::Consultations)
}

pub fn therapist_list_key() -> QueryKey {
    list_key(EntityClass::Therapist)
}

pub fn therapist_key(therapist_id: &str) -> QueryKey {
    entity_key(EntityClass::Therapist, therapist_id)
}

pub fn therapist_clients_key(therapist_id: &str) -> QueryKey {
    collection_key(EntityClass::Therapist, therapist_id, Collection::Clients)
}

pub fn therapist_sessions_key(therapist_id: &str) -> QueryKey {
    collection_key(EntityClass::Therapist, therapist_id, Collection::Sessions)
}

pub fn session_list_key() -> QueryKey {
    list_key(EntityClass::Session)
}

pub fn session_key(session_id: &str) -> QueryKey {
    entity_key(EntityClass::Session, session_id)
}

pub fn consultation_list_key() -> QueryKey {
    list_key(EntityClass::Consultation)
}

pub fn consultation_key(consultation_id: &str) -> QueryKey {
    entity_key(EntityClass::Consultation, consultation_id)
}

pub fn clinic_therapists_key(clinic_id: &str) -> QueryKey {
    collection_key(EntityClass::Clinic, clinic_id, Collection::Therapists)
}

pub fn clinic_clients_key(clinic_id: &str) -> QueryKey {
    collection_key(EntityClass::Clinic, clinic_id, Collection::Clients)
}

/// Returns the key for the signed-in user's profile.
pub fn profile_key(user_id: &str) -> QueryKey {
    entity_key(EntityClass::Profile, user_id)
}

/// Returns the key for a named dashboard report (e.g. `"monthly"`).
pub fn analytics_key(report: &str) -> QueryKey {
    entity_key(EntityClass::Analytics, report)
}

/// Synthesizes a placeholder id for an entity that the server has not
/// assigned an id to yet.
pub fn temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4())
}

/// Returns true for ids produced by [`temp_id`].
///
/// # Examples
///
/// ```
/// use clinicsync_core::cache::{is_temp_id, temp_id};
///
/// assert!(is_temp_id(&temp_id()));
/// assert!(!is_temp_id("client-42"));
/// ```
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_key_display() {
        assert_eq!(client_list_key().to_string(), "client");
        assert!(client_list_key().is_list());
    }

    #[test]
    fn test_entity_key_display() {
        let key = client_key("client-42");
        assert_eq!(key.to_string(), "client:client-42");
        assert_eq!(key.entity_id(), Some("client-42"));
        assert_eq!(key.class(), EntityClass::Client);
    }

    #[test]
    fn test_collection_keys() {
        assert_eq!(
            client_sessions_key("42").to_string(),
            "client:42:sessions"
        );
        assert_eq!(
            client_consultations_key("42").to_string(),
            "client:42:consultations"
        );
        assert_eq!(
            therapist_clients_key("7").to_string(),
            "therapist:7:clients"
        );
        assert_eq!(
            clinic_therapists_key("c1").to_string(),
            "clinic:c1:therapists"
        );
    }

    #[test]
    fn test_starts_with() {
        let scoped = client_sessions_key("42");
        assert!(scoped.starts_with(&client_key("42")));
        assert!(scoped.starts_with(&client_list_key()));
        assert!(!scoped.starts_with(&client_key("43")));
        assert!(!scoped.starts_with(&session_list_key()));
    }

    #[test]
    fn test_keys_order_by_class_then_segments() {
        let mut keys = vec![client_key("b"), client_list_key(), client_key("a")];
        keys.sort();
        assert_eq!(
            keys,
            vec![client_list_key(), client_key("a"), client_key("b")]
        );
    }

    #[test]
    fn test_temp_ids_are_unique() {
        let a = temp_id();
        let b = temp_id();
        assert_ne!(a, b);
        assert!(is_temp_id(&a));
    }

    #[test]
    fn test_key_serializes() {
        let key = client_sessions_key("42");
        let json = serde_json::to_string(&key).unwrap();
        let back: QueryKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
