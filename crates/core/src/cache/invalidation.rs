//! Static invalidation edges between entity classes.
//!
//! When an entity changes, the keys that logically depend on it are found
//! through [`INVALIDATION_EDGES`] and rendered as glob patterns for the store.

use crate::clinic::{Collection, EntityClass, Role};

/// A family of keys that depends on a changed entity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependent {
    /// The class-wide list key, e.g. `session`.
    List(EntityClass),
    /// A sub-collection under every owner of a class, e.g. `client:*:sessions`.
    Collection(EntityClass, Collection),
    /// Every key of a class.
    Class(EntityClass),
    /// The keys of another class that share the changed entity's id, e.g.
    /// `profile:<id>` for a client. Only reached when an id is given.
    SameId(EntityClass),
}

impl Dependent {
    fn patterns(&self, id: Option<&str>) -> Vec<String> {
        match self {
            Dependent::List(class) => vec![class.as_str().to_string()],
            Dependent::Collection(class, collection) => {
                vec![format!("{}:*:{}", class, collection)]
            }
            Dependent::Class(class) => class_patterns(*class),
            Dependent::SameId(class) => id
                .map(|id| entity_patterns(*class, id))
                .unwrap_or_default(),
        }
    }
}

/// The keys that must be marked stale when `source` changes.
#[derive(Debug, Clone, Copy)]
pub struct InvalidationEdge {
    pub source: EntityClass,
    pub dependents: &'static [Dependent],
}

pub const INVALIDATION_EDGES: &[InvalidationEdge] = &[
    InvalidationEdge {
        source: EntityClass::Client,
        dependents: &[
            Dependent::List(EntityClass::Client),
            Dependent::Collection(EntityClass::Therapist, Collection::Clients),
            Dependent::Collection(EntityClass::Clinic, Collection::Clients),
            Dependent::SameId(EntityClass::Profile),
            Dependent::Class(EntityClass::Analytics),
        ],
    },
    InvalidationEdge {
        source: EntityClass::Therapist,
        dependents: &[
            Dependent::List(EntityClass::Therapist),
            Dependent::Collection(EntityClass::Clinic, Collection::Therapists),
        ],
    },
    InvalidationEdge {
        source: EntityClass::Session,
        dependents: &[
            Dependent::List(EntityClass::Session),
            Dependent::Collection(EntityClass::Client, Collection::Sessions),
            Dependent::Collection(EntityClass::Therapist, Collection::Sessions),
            Dependent::Class(EntityClass::Analytics),
        ],
    },
    InvalidationEdge {
        source: EntityClass::Consultation,
        dependents: &[
            Dependent::List(EntityClass::Consultation),
            Dependent::Collection(EntityClass::Client, Collection::Consultations),
            Dependent::Class(EntityClass::Analytics),
        ],
    },
    InvalidationEdge {
        source: EntityClass::Clinic,
        dependents: &[Dependent::List(EntityClass::Clinic)],
    },
    InvalidationEdge {
        source: EntityClass::Profile,
        dependents: &[Dependent::List(EntityClass::Profile)],
    },
    InvalidationEdge {
        source: EntityClass::Analytics,
        dependents: &[],
    },
];

/// Returns the dependents registered for a class.
pub fn dependents_of(class: EntityClass) -> &'static [Dependent] {
    INVALIDATION_EDGES
        .iter()
        .find(|edge| edge.source == class)
        .map(|edge| edge.dependents)
        .unwrap_or(&[])
}

fn class_patterns(class: EntityClass) -> Vec<String> {
    vec![class.as_str().to_string(), format!("{}:*", class)]
}

fn entity_patterns(class: EntityClass, id: &str) -> Vec<String> {
    vec![format!("{}:{}", class, id), format!("{}:{}:*", class, id)]
}

fn normalize(mut patterns: Vec<String>) -> Vec<String> {
    patterns.sort();
    patterns.dedup();
    patterns
}

/// Returns the glob patterns to mark stale when an entity changes.
///
/// Always includes the class list key and every edge dependent. With an id,
/// the entity key, every key scoped under it and its same-id dependents are
/// included too.
///
/// # Examples
///
/// ```
/// use clinicsync_core::cache::invalidation_patterns;
/// use clinicsync_core::clinic::EntityClass;
///
/// let patterns = invalidation_patterns(EntityClass::Client, Some("42"));
/// assert!(patterns.contains(&"client".to_string()));
/// assert!(patterns.contains(&"client:42:*".to_string()));
/// ```
pub fn invalidation_patterns(class: EntityClass, id: Option<&str>) -> Vec<String> {
    let mut patterns = vec![class.as_str().to_string()];
    if let Some(id) = id {
        patterns.extend(entity_patterns(class, id));
    }
    for dependent in dependents_of(class) {
        patterns.extend(dependent.patterns(id));
    }
    normalize(patterns)
}

/// Returns the glob patterns to mark stale for a role-wide refresh.
///
/// `Admin` is unrestricted and matches everything. The other roles map to a
/// fixed set of classes, narrowed to `scope_id` where the role is scoped.
pub fn role_invalidation_patterns(role: Role, scope_id: Option<&str>) -> Vec<String> {
    let patterns = match role {
        Role::Admin => vec!["*".to_string()],
        // With a clinic id only that clinic's own rosters are touched:
        // `clinic:<id>`, `clinic:<id>:therapists` and `clinic:<id>:clients`.
        Role::ClinicAdmin => match scope_id {
            Some(clinic_id) => entity_patterns(EntityClass::Clinic, clinic_id),
            None => {
                let mut patterns = class_patterns(EntityClass::Clinic);
                patterns.extend(class_patterns(EntityClass::Therapist));
                patterns.extend(class_patterns(EntityClass::Client));
                patterns
            }
        },
        Role::Therapist => {
            let mut patterns = match scope_id {
                Some(therapist_id) => entity_patterns(EntityClass::Therapist, therapist_id),
                None => class_patterns(EntityClass::Therapist),
            };
            patterns.extend(class_patterns(EntityClass::Client));
            patterns.extend(class_patterns(EntityClass::Session));
            patterns.extend(class_patterns(EntityClass::Consultation));
            patterns
        }
        Role::Client => match scope_id {
            Some(client_id) => {
                let mut patterns = entity_patterns(EntityClass::Client, client_id);
                patterns.extend(entity_patterns(EntityClass::Profile, client_id));
                patterns
            }
            None => {
                let mut patterns = class_patterns(EntityClass::Client);
                patterns.extend(class_patterns(EntityClass::Profile));
                patterns
            }
        },
    };
    normalize(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{
        analytics_key, client_consultations_key, client_key, client_list_key,
        client_sessions_key, clinic_clients_key, clinic_therapists_key, key_matches,
        profile_key, session_list_key, therapist_key, QueryKey,
    };

    fn matched(patterns: &[String], key: &QueryKey) -> bool {
        patterns.iter().any(|p| key_matches(p, key))
    }

    #[test]
    fn test_every_class_has_an_edge() {
        for class in EntityClass::ALL {
            assert!(
                INVALIDATION_EDGES.iter().any(|edge| edge.source == class),
                "missing edge for {}",
                class
            );
        }
    }

    #[test]
    fn test_client_change_cascades() {
        let patterns = invalidation_patterns(EntityClass::Client, Some("42"));

        assert!(matched(&patterns, &client_list_key()));
        assert!(matched(&patterns, &client_key("42")));
        assert!(matched(&patterns, &client_sessions_key("42")));
        assert!(matched(&patterns, &client_consultations_key("42")));
        assert!(matched(&patterns, &clinic_clients_key("c1")));
        assert!(matched(&patterns, &analytics_key("monthly")));
        assert!(matched(&patterns, &profile_key("42")));

        assert!(!matched(&patterns, &profile_key("43")));
        assert!(!matched(&patterns, &client_key("43")));
        assert!(!matched(&patterns, &client_key("420")));
        assert!(!matched(&patterns, &session_list_key()));
    }

    #[test]
    fn test_without_id_only_lists_and_edges() {
        let patterns = invalidation_patterns(EntityClass::Client, None);
        assert!(matched(&patterns, &client_list_key()));
        assert!(!matched(&patterns, &client_key("42")));
        assert!(!matched(&patterns, &profile_key("42")));
    }

    #[test]
    fn test_session_change_reaches_owner_collections() {
        let patterns = invalidation_patterns(EntityClass::Session, Some("s-1"));
        assert!(matched(&patterns, &session_list_key()));
        assert!(matched(&patterns, &client_sessions_key("42")));
        assert!(!matched(&patterns, &client_consultations_key("42")));
    }

    #[test]
    fn test_admin_role_matches_everything() {
        let patterns = role_invalidation_patterns(Role::Admin, None);
        assert!(matched(&patterns, &client_key("42")));
        assert!(matched(&patterns, &analytics_key("monthly")));
    }

    #[test]
    fn test_clinic_admin_is_scoped_to_clinic() {
        let patterns = role_invalidation_patterns(Role::ClinicAdmin, Some("c1"));
        assert!(matched(&patterns, &clinic_clients_key("c1")));
        assert!(matched(&patterns, &clinic_therapists_key("c1")));
        assert!(!matched(&patterns, &clinic_clients_key("c2")));
        assert!(!matched(&patterns, &therapist_key("7")));
        assert!(!matched(&patterns, &client_key("42")));
        assert!(!matched(&patterns, &session_list_key()));
    }

    #[test]
    fn test_unscoped_clinic_admin_covers_therapists_and_clients() {
        let patterns = role_invalidation_patterns(Role::ClinicAdmin, None);
        assert!(matched(&patterns, &clinic_clients_key("c2")));
        assert!(matched(&patterns, &therapist_key("7")));
        assert!(matched(&patterns, &client_key("42")));
        assert!(!matched(&patterns, &session_list_key()));
    }

    #[test]
    fn test_client_role_is_self_scoped() {
        let patterns = role_invalidation_patterns(Role::Client, Some("42"));
        assert!(matched(&patterns, &client_sessions_key("42")));
        assert!(!matched(&patterns, &client_key("43")));
        assert!(!matched(&patterns, &client_list_key()));
    }

    #[test]
    fn test_patterns_are_deduplicated() {
        let patterns = role_invalidation_patterns(Role::Therapist, None);
        let mut deduped = patterns.clone();
        deduped.dedup();
        assert_eq!(patterns, deduped);
    }
}
