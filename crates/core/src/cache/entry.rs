use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use crate::remote::SyncError;

use super::{estimate_size, CacheTier, QueryKey};

/// Ordering stamp taken when a request is issued.
///
/// Stamps come from a monotonically increasing counter, so two requests for
/// the same key can always be ordered by when they were issued, regardless of
/// when their responses arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct IssueStamp(pub u64);

impl IssueStamp {
    pub const ZERO: IssueStamp = IssueStamp(0);
}

/// Returns `at + duration`, saturating at the maximum representable time.
pub(crate) fn time_after(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A cached query result with its freshness metadata.
///
/// Invariants: `stale_at >= fetched_at` and `gc_at > stale_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: QueryKey,
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
    pub stale_at: DateTime<Utc>,
    pub gc_at: DateTime<Utc>,
    /// Number of active consumers. Only unobserved entries can be evicted.
    pub observer_count: u32,
    pub tier: CacheTier,
    /// Stamp of the request that produced `data`.
    pub issued: IssueStamp,
    /// True while `data` is a tentative optimistic write.
    pub optimistic: bool,
    /// Error from the most recent failed refresh, cleared on the next write.
    pub last_error: Option<SyncError>,
}

impl Entry {
    /// Creates an entry, stamping timers from the tier's policy.
    pub fn new(
        key: QueryKey,
        data: Value,
        tier: CacheTier,
        issued: IssueStamp,
        now: DateTime<Utc>,
    ) -> Self {
        let mut entry = Self {
            key,
            data: Value::Null,
            fetched_at: now,
            stale_at: now,
            gc_at: now,
            observer_count: 0,
            tier,
            issued,
            optimistic: false,
            last_error: None,
        };
        entry.replace_data(data, tier, issued, now);
        entry
    }

    /// Replaces the data and restamps every timer.
    pub(crate) fn replace_data(
        &mut self,
        data: Value,
        tier: CacheTier,
        issued: IssueStamp,
        now: DateTime<Utc>,
    ) {
        let policy = tier.policy();
        self.data = data;
        self.tier = tier;
        self.issued = issued;
        self.fetched_at = now;
        self.stale_at = time_after(now, policy.stale_time);
        self.gc_at = time_after(now, policy.gc_time);
        self.last_error = None;
    }

    /// Returns true once `stale_at` has passed.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.stale_at
    }

    /// Returns true if the entry is stale when judged by `tier`'s stale time
    /// from `fetched_at`, or already stale on its own.
    pub fn is_stale_under(&self, tier: CacheTier, now: DateTime<Utc>) -> bool {
        self.is_stale(now) || now >= time_after(self.fetched_at, tier.policy().stale_time)
    }

    /// Returns true if at least one consumer observes this entry.
    pub fn is_active(&self) -> bool {
        self.observer_count > 0
    }

    /// Returns true if the entry outlived its GC time with no observers.
    /// Tentative writes are kept until their mutation settles.
    pub fn is_gc_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_active() && !self.optimistic && now >= self.gc_at
    }

    /// Flags the entry for refetch without touching its data.
    ///
    /// Staleness only moves forward: an entry that is already stale keeps
    /// its earlier `stale_at`.
    pub fn mark_stale(&mut self, now: DateTime<Utc>) {
        if self.stale_at > now {
            self.stale_at = now.max(self.fetched_at);
        }
    }

    /// Estimated in-memory footprint in bytes.
    pub fn size_bytes(&self) -> usize {
        estimate_size(&self.key, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::client_key;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_new_entry_stamps_timers_from_tier() {
        let now = fixed_now();
        let entry = Entry::new(
            client_key("42"),
            json!({"progress": 50}),
            CacheTier::Profile,
            IssueStamp(1),
            now,
        );

        assert_eq!(entry.fetched_at, now);
        assert_eq!(entry.stale_at, now + TimeDelta::minutes(15));
        assert_eq!(entry.gc_at, now + TimeDelta::minutes(30));
        assert!(entry.stale_at >= entry.fetched_at);
        assert!(entry.gc_at > entry.stale_at);
    }

    #[test]
    fn test_critical_entry_is_immediately_stale() {
        let now = fixed_now();
        let entry = Entry::new(
            client_key("42"),
            json!(1),
            CacheTier::Critical,
            IssueStamp(1),
            now,
        );
        assert!(entry.is_stale(now));
    }

    #[test]
    fn test_mark_stale_is_monotonic() {
        let now = fixed_now();
        let mut entry = Entry::new(
            client_key("42"),
            json!(1),
            CacheTier::Session,
            IssueStamp(1),
            now,
        );

        let first = now + TimeDelta::seconds(10);
        entry.mark_stale(first);
        assert_eq!(entry.stale_at, first);

        // A later invalidation never pushes staleness back.
        entry.mark_stale(first + TimeDelta::seconds(10));
        assert_eq!(entry.stale_at, first);
        assert!(entry.is_stale(first));
    }

    #[test]
    fn test_gc_requires_no_observers() {
        let now = fixed_now();
        let mut entry = Entry::new(
            client_key("42"),
            json!(1),
            CacheTier::Critical,
            IssueStamp(1),
            now,
        );
        let later = now + TimeDelta::hours(1);
        assert!(entry.is_gc_due(later));

        entry.observer_count = 1;
        assert!(!entry.is_gc_due(later));
    }

    #[test]
    fn test_time_after_saturates() {
        let far = time_after(DateTime::<Utc>::MAX_UTC, Duration::from_secs(60));
        assert_eq!(far, DateTime::<Utc>::MAX_UTC);
    }
}
