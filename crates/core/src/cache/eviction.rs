//! Size-bounded eviction planning.
//!
//! Planning is pure: it looks at a point-in-time view of the store and
//! returns which keys to remove. Applying the plan is the caller's job.

use serde::Serialize;

use super::{EntryStore, QueryKey};

/// Share of the configured maximum that triggers cleanup.
pub const DEFAULT_THRESHOLD_PERCENT: u8 = 80;

/// Default maximum cache footprint (50 MiB).
pub const DEFAULT_MAX_SIZE_BYTES: usize = 50 * 1024 * 1024;

/// Returns the cleanup threshold for a maximum size and percentage.
///
/// # Examples
///
/// ```
/// use clinicsync_core::cache::threshold_bytes;
///
/// assert_eq!(threshold_bytes(1000, 80), 800);
/// assert_eq!(threshold_bytes(1000, 150), 1000);
/// ```
pub fn threshold_bytes(max_size_bytes: usize, percent: u8) -> usize {
    let percent = usize::from(percent.min(100));
    max_size_bytes / 100 * percent + max_size_bytes % 100 * percent / 100
}

/// The keys selected for removal and the projected outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvictionPlan {
    pub victims: Vec<QueryKey>,
    pub size_before: usize,
    pub size_after: usize,
    pub threshold: usize,
}

impl EvictionPlan {
    /// Returns true if removing every victim still leaves the cache over
    /// threshold, which happens when the remaining entries are all observed.
    pub fn over_threshold(&self) -> bool {
        self.size_after > self.threshold
    }

    pub fn is_noop(&self) -> bool {
        self.victims.is_empty()
    }
}

/// Selects entries to evict until the store fits under `threshold`.
///
/// Only unobserved entries are candidates, and never tentative writes of a
/// mutation still in flight. They are taken oldest
/// `fetched_at` first, and selection stops as soon as the projected size is
/// at or below the threshold.
pub fn plan_eviction(store: &EntryStore, threshold: usize) -> EvictionPlan {
    let size_before = store.size_bytes();
    let mut plan = EvictionPlan {
        victims: Vec::new(),
        size_before,
        size_after: size_before,
        threshold,
    };

    if size_before <= threshold {
        return plan;
    }

    let mut candidates: Vec<_> = store
        .all()
        .filter(|e| !e.is_active() && !e.optimistic)
        .collect();
    // Key order breaks fetched_at ties so plans are deterministic.
    candidates.sort_by(|a, b| a.fetched_at.cmp(&b.fetched_at).then_with(|| a.key.cmp(&b.key)));

    for entry in candidates {
        if plan.size_after <= threshold {
            break;
        }
        plan.size_after -= entry.size_bytes();
        plan.victims.push(entry.key.clone());
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{client_key, CacheTier, IssueStamp, ObserverDelta, StoreAction};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn store_with(entries: &[(&str, i64)]) -> EntryStore {
        entries
            .iter()
            .enumerate()
            .fold(EntryStore::new(), |store, (i, (id, age_minutes))| {
                store.reduce(StoreAction::Write {
                    key: client_key(id),
                    data: json!({"payload": "x".repeat(100)}),
                    tier: CacheTier::Session,
                    issued: IssueStamp(i as u64 + 1),
                    now: fixed_now() - TimeDelta::minutes(*age_minutes),
                })
            })
    }

    #[test]
    fn test_under_threshold_is_noop() {
        let store = store_with(&[("a", 1)]);
        let plan = plan_eviction(&store, store.size_bytes());
        assert!(plan.is_noop());
        assert!(!plan.over_threshold());
    }

    #[test]
    fn test_evicts_oldest_first_until_under_threshold() {
        let store = store_with(&[("new", 1), ("old", 30), ("mid", 10)]);
        let one = store.get(&client_key("old")).unwrap().size_bytes();

        // Room for two entries only.
        let plan = plan_eviction(&store, store.size_bytes() - one);

        assert_eq!(plan.victims, vec![client_key("old")]);
        assert!(!plan.over_threshold());
    }

    #[test]
    fn test_observed_entries_are_never_victims() {
        let store = store_with(&[("a", 30), ("b", 20), ("c", 10)]).reduce(StoreAction::Touch {
            key: client_key("a"),
            delta: ObserverDelta::Observe,
            now: fixed_now(),
        });

        let plan = plan_eviction(&store, 0);

        assert_eq!(plan.victims, vec![client_key("b"), client_key("c")]);
        assert!(plan.over_threshold());
    }

    #[test]
    fn test_tentative_writes_are_never_victims() {
        let store = store_with(&[("a", 30), ("b", 20)]).reduce(StoreAction::Stage {
            key: client_key("a"),
            data: Some(json!({"payload": "y".repeat(100)})),
            tier: CacheTier::Session,
            issued: IssueStamp(10),
            now: fixed_now() - TimeDelta::minutes(30),
        });

        let plan = plan_eviction(&store, 0);

        assert_eq!(plan.victims, vec![client_key("b")]);
        assert!(plan.over_threshold());
    }

    #[test]
    fn test_threshold_bytes() {
        assert_eq!(threshold_bytes(DEFAULT_MAX_SIZE_BYTES, 80), 41_943_040);
        assert_eq!(threshold_bytes(0, 80), 0);
        assert_eq!(threshold_bytes(199, 50), 99);
    }
}
