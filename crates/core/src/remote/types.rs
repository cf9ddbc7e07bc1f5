use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{entity_key, QueryKey};
use crate::clinic::EntityClass;

/// The kind of write a mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A create/update/delete call sent to the mutate collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRequest {
    pub class: EntityClass,
    pub kind: MutationKind,
    /// Target id. For creates this is the temporary placeholder id.
    pub entity_id: String,
    /// Create body or update patch. `Null` for deletes.
    pub payload: Value,
}

impl MutationRequest {
    /// Returns the key of the entity this mutation targets.
    pub fn key(&self) -> QueryKey {
        entity_key(self.class, &self.entity_id)
    }
}
