use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheTier;

/// Errors that can occur when parsing class, collection, or role names.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseNameError {
    #[error("Unknown entity class: {0}")]
    UnknownClass(String),
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),
    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

/// The class of a cached domain record.
///
/// The class is always the first segment of a [`QueryKey`](crate::cache::QueryKey)
/// and decides which cache tier the record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    Client,
    Therapist,
    Session,
    Consultation,
    Clinic,
    Profile,
    Analytics,
}

impl EntityClass {
    pub const ALL: [EntityClass; 7] = [
        EntityClass::Client,
        EntityClass::Therapist,
        EntityClass::Session,
        EntityClass::Consultation,
        EntityClass::Clinic,
        EntityClass::Profile,
        EntityClass::Analytics,
    ];

    /// Returns the key segment for this class.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityClass::Client => "client",
            EntityClass::Therapist => "therapist",
            EntityClass::Session => "session",
            EntityClass::Consultation => "consultation",
            EntityClass::Clinic => "clinic",
            EntityClass::Profile => "profile",
            EntityClass::Analytics => "analytics",
        }
    }

    /// Returns the cache tier records of this class are stored under.
    pub fn tier(&self) -> CacheTier {
        match self {
            EntityClass::Session | EntityClass::Consultation => CacheTier::Session,
            EntityClass::Client
            | EntityClass::Therapist
            | EntityClass::Clinic
            | EntityClass::Profile => CacheTier::Profile,
            EntityClass::Analytics => CacheTier::Static,
        }
    }

    /// Returns the entity type name used in error messages.
    pub fn entity_type(&self) -> &'static str {
        match self {
            EntityClass::Client => "Client",
            EntityClass::Therapist => "Therapist",
            EntityClass::Session => "Session",
            EntityClass::Consultation => "Consultation",
            EntityClass::Clinic => "Clinic",
            EntityClass::Profile => "Profile",
            EntityClass::Analytics => "Analytics",
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityClass {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityClass::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| ParseNameError::UnknownClass(s.to_string()))
    }
}

/// A sub-collection scoped under an owning entity (e.g. a client's sessions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Sessions,
    Consultations,
    Clients,
    Therapists,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Sessions,
        Collection::Consultations,
        Collection::Clients,
        Collection::Therapists,
    ];

    /// Returns the key segment for this collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Sessions => "sessions",
            Collection::Consultations => "consultations",
            Collection::Clients => "clients",
            Collection::Therapists => "therapists",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|collection| collection.as_str() == s)
            .ok_or_else(|| ParseNameError::UnknownCollection(s.to_string()))
    }
}

/// Top-level role of the signed-in user, used for coarse invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unrestricted access to every clinic.
    Admin,
    /// Scoped to a single clinic.
    ClinicAdmin,
    /// Scoped to a therapist's own caseload.
    Therapist,
    /// Scoped to the client's own records.
    Client,
}

impl Role {
    /// Returns the wire name for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::ClinicAdmin => "clinic_admin",
            Role::Therapist => "therapist",
            Role::Client => "client",
        }
    }
}

impl FromStr for Role {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "clinic_admin" => Ok(Role::ClinicAdmin),
            "therapist" => Ok(Role::Therapist),
            "client" => Ok(Role::Client),
            other => Err(ParseNameError::UnknownRole(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_round_trips_through_str() {
        for class in EntityClass::ALL {
            assert_eq!(class.as_str().parse::<EntityClass>(), Ok(class));
        }
    }

    #[test]
    fn test_unknown_class_is_rejected() {
        assert_eq!(
            "invoice".parse::<EntityClass>(),
            Err(ParseNameError::UnknownClass("invoice".to_string()))
        );
    }

    #[test]
    fn test_class_tiers() {
        assert_eq!(EntityClass::Session.tier(), CacheTier::Session);
        assert_eq!(EntityClass::Consultation.tier(), CacheTier::Session);
        assert_eq!(EntityClass::Client.tier(), CacheTier::Profile);
        assert_eq!(EntityClass::Analytics.tier(), CacheTier::Static);
    }

    #[test]
    fn test_collection_parse() {
        assert_eq!("sessions".parse::<Collection>(), Ok(Collection::Sessions));
        assert!("notes".parse::<Collection>().is_err());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("clinic_admin".parse::<Role>(), Ok(Role::ClinicAdmin));
        assert_eq!(
            "owner".parse::<Role>().unwrap_err().to_string(),
            "Unknown role: owner"
        );
    }
}
