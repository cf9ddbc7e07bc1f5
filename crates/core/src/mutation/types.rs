use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::cache::{Entry, QueryKey};
use crate::remote::MutationKind;

/// Lifecycle of one mutation call.
///
/// `Idle -> Staged -> {Committed, RolledBack}`; both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Staged,
    Committed,
    RolledBack,
}

impl MutationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MutationState::Committed | MutationState::RolledBack)
    }

    /// Returns true if moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: MutationState) -> bool {
        matches!(
            (self, next),
            (MutationState::Idle, MutationState::Staged)
                | (MutationState::Staged, MutationState::Committed)
                | (MutationState::Staged, MutationState::RolledBack)
        )
    }
}

/// Undo record for a tentative local write.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticUpdate {
    pub id: Uuid,
    pub kind: MutationKind,
    /// Key the tentative data was staged under.
    pub key: QueryKey,
    /// Entry contents at staging time, if the key had an entry.
    pub original_snapshot: Option<Entry>,
    pub tentative_data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl OptimisticUpdate {
    pub fn new(
        kind: MutationKind,
        key: QueryKey,
        original_snapshot: Option<Entry>,
        tentative_data: Option<Value>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            key,
            original_snapshot,
            tentative_data,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(MutationState::Idle.can_transition_to(MutationState::Staged));
        assert!(MutationState::Staged.can_transition_to(MutationState::Committed));
        assert!(MutationState::Staged.can_transition_to(MutationState::RolledBack));
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        for state in [MutationState::Committed, MutationState::RolledBack] {
            assert!(state.is_terminal());
            assert!(!state.can_transition_to(MutationState::Staged));
            assert!(!state.can_transition_to(MutationState::Committed));
        }
    }

    #[test]
    fn test_idle_cannot_skip_staging() {
        assert!(!MutationState::Idle.can_transition_to(MutationState::Committed));
        assert!(!MutationState::Idle.can_transition_to(MutationState::RolledBack));
    }
}
