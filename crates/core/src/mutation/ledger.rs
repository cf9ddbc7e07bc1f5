use std::collections::HashMap;

use uuid::Uuid;

use crate::cache::QueryKey;

use super::OptimisticUpdate;

/// Pending optimistic updates, grouped by the key they were staged under.
///
/// Several updates may be pending on one key; they are kept in staging
/// order and each one keeps the snapshot it captured.
#[derive(Debug, Clone, Default)]
pub struct PendingMutations {
    by_key: HashMap<QueryKey, Vec<OptimisticUpdate>>,
}

impl PendingMutations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, update: OptimisticUpdate) {
        self.by_key
            .entry(update.key.clone())
            .or_default()
            .push(update);
    }

    /// Removes and returns a pending update by id.
    pub fn take(&mut self, key: &QueryKey, id: &Uuid) -> Option<OptimisticUpdate> {
        let updates = self.by_key.get_mut(key)?;
        let position = updates.iter().position(|u| &u.id == id)?;
        let update = updates.remove(position);
        if updates.is_empty() {
            self.by_key.remove(key);
        }
        Some(update)
    }

    /// Returns the pending updates on a key, oldest first.
    pub fn pending_for(&self, key: &QueryKey) -> &[OptimisticUpdate] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_pending(&self, key: &QueryKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Total number of pending updates.
    pub fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::client_key;
    use crate::remote::MutationKind;
    use chrono::Utc;
    use serde_json::json;

    fn update(id: &str, progress: u8) -> OptimisticUpdate {
        OptimisticUpdate::new(
            MutationKind::Update,
            client_key(id),
            None,
            Some(json!({ "progress": progress })),
            Utc::now(),
        )
    }

    #[test]
    fn test_push_and_take() {
        let mut pending = PendingMutations::new();
        let first = update("42", 60);
        let first_id = first.id;
        pending.push(first);

        assert_eq!(pending.len(), 1);
        assert!(pending.has_pending(&client_key("42")));

        let taken = pending.take(&client_key("42"), &first_id).unwrap();
        assert_eq!(taken.id, first_id);
        assert!(pending.is_empty());
        assert!(!pending.has_pending(&client_key("42")));
    }

    #[test]
    fn test_updates_on_same_key_are_tracked_independently() {
        let mut pending = PendingMutations::new();
        let first = update("42", 60);
        let second = update("42", 70);
        let (first_id, second_id) = (first.id, second.id);
        pending.push(first);
        pending.push(second);

        assert_eq!(pending.pending_for(&client_key("42")).len(), 2);

        pending.take(&client_key("42"), &first_id).unwrap();
        let remaining = pending.pending_for(&client_key("42"));
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second_id);
    }

    #[test]
    fn test_take_unknown_is_none() {
        let mut pending = PendingMutations::new();
        assert!(pending.take(&client_key("42"), &Uuid::new_v4()).is_none());
    }
}
