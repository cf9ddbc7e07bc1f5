//! The subset of client state that survives a restart.
//!
//! Only authoritative domain records, the current filter/sort selections and
//! the last-updated timestamp are kept. Optimistic data, pending mutations,
//! loading flags and errors are never written, so they always start empty.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entry::time_after;
use super::{CacheTier, Entry, EntryStore, IssueStamp, QueryKey};

/// Current on-disk format version.
pub const PERSISTED_STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Filter and sort selections of list views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selections {
    pub filters: BTreeMap<String, String>,
    pub sort: Option<SortSpec>,
}

/// An authoritative record as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub key: QueryKey,
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
    pub tier: CacheTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    pub entries: Vec<PersistedEntry>,
    pub selections: Selections,
    pub last_updated: Option<DateTime<Utc>>,
}

impl PersistedState {
    pub fn new(
        entries: Vec<PersistedEntry>,
        selections: Selections,
        last_updated: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            version: PERSISTED_STATE_VERSION,
            entries,
            selections,
            last_updated,
        }
    }

    /// Captures the persistable subset of a store.
    ///
    /// Entries holding tentative optimistic data are skipped.
    pub fn capture(store: &EntryStore, selections: Selections, now: DateTime<Utc>) -> Self {
        let mut entries: Vec<PersistedEntry> = store
            .all()
            .filter(|e| !e.optimistic)
            .map(|e| PersistedEntry {
                key: e.key.clone(),
                data: e.data.clone(),
                fetched_at: e.fetched_at,
                tier: e.tier,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Self::new(entries, selections, Some(now))
    }

    /// Rebuilds store entries from persisted records.
    ///
    /// Restored entries are stale right away so the first observation
    /// refetches them, and have no observers.
    pub fn restore_entries(&self, now: DateTime<Utc>) -> Vec<Entry> {
        self.entries
            .iter()
            .map(|persisted| {
                let gc_at = time_after(now, persisted.tier.policy().gc_time)
                    .max(time_after(persisted.fetched_at, std::time::Duration::from_millis(1)));
                Entry {
                    key: persisted.key.clone(),
                    data: persisted.data.clone(),
                    fetched_at: persisted.fetched_at,
                    stale_at: persisted.fetched_at,
                    gc_at,
                    observer_count: 0,
                    tier: persisted.tier,
                    issued: IssueStamp::ZERO,
                    optimistic: false,
                    last_error: None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{client_key, deserialize_state, serialize_state, StoreAction};
    use crate::remote::SyncError;
    use chrono::{TimeDelta, TimeZone};
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn populated_store() -> EntryStore {
        EntryStore::new()
            .reduce(StoreAction::Write {
                key: client_key("1"),
                data: json!({"progress": 50}),
                tier: CacheTier::Profile,
                issued: IssueStamp(1),
                now: fixed_now(),
            })
            .reduce(StoreAction::RecordError {
                key: client_key("1"),
                error: SyncError::Network("timeout".to_string()),
            })
            .reduce(StoreAction::Stage {
                key: client_key("temp-1"),
                data: Some(json!({"name": "pending"})),
                tier: CacheTier::Profile,
                issued: IssueStamp(2),
                now: fixed_now(),
            })
    }

    #[test]
    fn test_capture_skips_optimistic_entries() {
        let state = PersistedState::capture(&populated_store(), Selections::default(), fixed_now());

        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[0].key, client_key("1"));
        assert_eq!(state.last_updated, Some(fixed_now()));
    }

    #[test]
    fn test_restored_entries_are_stale_without_errors() {
        let state = PersistedState::capture(&populated_store(), Selections::default(), fixed_now());
        let later = fixed_now() + TimeDelta::minutes(1);

        let entries = state.restore_entries(later);

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert!(entry.is_stale(later));
        assert!(entry.last_error.is_none());
        assert_eq!(entry.observer_count, 0);
        assert!(entry.gc_at > entry.stale_at);
    }

    #[test]
    fn test_selections_survive_encoding() {
        let mut selections = Selections::default();
        selections
            .filters
            .insert("status".to_string(), "scheduled".to_string());
        selections.sort = Some(SortSpec {
            field: "scheduled_at".to_string(),
            direction: SortDirection::Descending,
        });

        let state = PersistedState::capture(&populated_store(), selections.clone(), fixed_now());
        let bytes = serialize_state(&state).unwrap();
        let back = deserialize_state(&bytes).unwrap();

        assert_eq!(back.selections, selections);
        assert_eq!(back.version, PERSISTED_STATE_VERSION);
    }
}
