//! The Entry Store: a keyed table of cached query results.
//!
//! The store is a plain value driven by [`EntryStore::reduce`], a pure
//! transition `(state, action) -> state'`. The client owns a single store
//! behind a lock and dispatches actions between await points, which makes
//! the action list the only way cached data changes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::remote::SyncError;

use super::entry::time_after;
use super::{key_matches, CacheTier, Entry, IssueStamp, QueryKey};

/// A change to observer counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverDelta {
    Observe,
    Release,
}

/// A transition of the Entry Store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreAction {
    /// Authoritative write of a fetch or mutation response.
    Write {
        key: QueryKey,
        data: Value,
        tier: CacheTier,
        issued: IssueStamp,
        now: DateTime<Utc>,
    },
    /// Tentative optimistic write. `None` stages a delete.
    Stage {
        key: QueryKey,
        data: Option<Value>,
        tier: CacheTier,
        issued: IssueStamp,
        now: DateTime<Utc>,
    },
    /// Puts back a snapshot taken before staging. `None` removes the key.
    Restore {
        key: QueryKey,
        snapshot: Option<Entry>,
        issued: IssueStamp,
    },
    Remove {
        key: QueryKey,
    },
    RemoveMany {
        keys: Vec<QueryKey>,
    },
    /// Removes every key matching any of the glob patterns.
    RemoveMatching {
        patterns: Vec<String>,
    },
    Touch {
        key: QueryKey,
        delta: ObserverDelta,
        now: DateTime<Utc>,
    },
    /// Flags every key matching any of the glob patterns as stale.
    MarkStale {
        patterns: Vec<String>,
        now: DateTime<Utc>,
    },
    /// Records a failed refresh while keeping the cached data.
    RecordError {
        key: QueryKey,
        error: SyncError,
    },
    /// Drops unobserved entries whose GC time elapsed.
    CollectGarbage {
        now: DateTime<Utc>,
    },
    /// Forgets removal records older than every fetch still in flight.
    /// `None` means nothing is in flight.
    PruneTombstones {
        oldest_in_flight: Option<IssueStamp>,
    },
    /// Loads entries restored from persisted state.
    Hydrate {
        entries: Vec<Entry>,
    },
    /// Drops every entry. Observer counts survive and reattach when the
    /// keys are written again.
    Clear,
}

/// Keyed table of cached query results.
#[derive(Debug, Clone, Default)]
pub struct EntryStore {
    entries: HashMap<QueryKey, Entry>,
    /// Highest stamp seen for keys that currently have no entry, so a late
    /// response cannot resurrect a removed key.
    removed_at: HashMap<QueryKey, IssueStamp>,
    /// Observers registered for keys that have no entry yet.
    detached_observers: HashMap<QueryKey, u32>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates over every entry in unspecified order.
    pub fn all(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the serialization-based size estimate over all entries.
    pub fn size_bytes(&self) -> usize {
        self.entries.values().map(Entry::size_bytes).sum()
    }

    /// Number of entries with at least one observer.
    pub fn active_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_active()).count()
    }

    /// Number of observers on a key, whether or not it has an entry.
    pub fn observer_count(&self, key: &QueryKey) -> u32 {
        match self.entries.get(key) {
            Some(entry) => entry.observer_count,
            None => self.detached_observers.get(key).copied().unwrap_or(0),
        }
    }

    /// Returns the keys matching any of the glob patterns.
    pub fn keys_matching(&self, patterns: &[String]) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .entries
            .keys()
            .filter(|key| patterns.iter().any(|p| key_matches(p, key)))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Returns true if a write issued at `issued` would be applied.
    ///
    /// Writes are ordered by issue time, not completion time: a response for
    /// a request issued before the one that produced the current data is
    /// discarded.
    pub fn accepts(&self, key: &QueryKey, issued: IssueStamp) -> bool {
        let latest = self
            .entries
            .get(key)
            .map(|e| e.issued)
            .or_else(|| self.removed_at.get(key).copied())
            .unwrap_or(IssueStamp::ZERO);
        issued >= latest
    }

    /// Applies one action, returning the next state.
    pub fn reduce(mut self, action: StoreAction) -> Self {
        match action {
            StoreAction::Write {
                key,
                data,
                tier,
                issued,
                now,
            } => {
                if self.accepts(&key, issued) {
                    self.upsert(key, data, tier, issued, now, false);
                }
            }
            StoreAction::Stage {
                key,
                data,
                tier,
                issued,
                now,
            } => {
                if self.accepts(&key, issued) {
                    match data {
                        Some(data) => self.upsert(key, data, tier, issued, now, true),
                        None => self.remove_entry(&key, issued),
                    }
                }
            }
            StoreAction::Restore {
                key,
                snapshot,
                issued,
            } => match snapshot {
                Some(mut snapshot) => {
                    let observers = self.observer_count(&key);
                    self.detached_observers.remove(&key);
                    self.removed_at.remove(&key);
                    snapshot.key = key.clone();
                    snapshot.observer_count = observers;
                    snapshot.issued = issued;
                    self.entries.insert(key, snapshot);
                }
                None => self.remove_entry(&key, issued),
            },
            StoreAction::Remove { key } => {
                let issued = self.current_stamp(&key);
                self.remove_entry(&key, issued);
            }
            StoreAction::RemoveMany { keys } => {
                for key in keys {
                    let issued = self.current_stamp(&key);
                    self.remove_entry(&key, issued);
                }
            }
            StoreAction::RemoveMatching { patterns } => {
                for key in self.keys_matching(&patterns) {
                    let issued = self.current_stamp(&key);
                    self.remove_entry(&key, issued);
                }
            }
            StoreAction::Touch { key, delta, now } => self.touch(key, delta, now),
            StoreAction::MarkStale { patterns, now } => {
                for entry in self.entries.values_mut() {
                    if patterns.iter().any(|p| key_matches(p, &entry.key)) {
                        entry.mark_stale(now);
                    }
                }
            }
            StoreAction::RecordError { key, error } => {
                if let Some(entry) = self.entries.get_mut(&key) {
                    entry.last_error = Some(error);
                }
            }
            StoreAction::CollectGarbage { now } => {
                let due: Vec<QueryKey> = self
                    .entries
                    .values()
                    .filter(|e| e.is_gc_due(now))
                    .map(|e| e.key.clone())
                    .collect();
                for key in due {
                    let issued = self.current_stamp(&key);
                    self.remove_entry(&key, issued);
                }
            }
            StoreAction::PruneTombstones { oldest_in_flight } => {
                // A record only blocks responses issued before it.
                self.removed_at
                    .retain(|_, removed| oldest_in_flight.is_some_and(|oldest| oldest < *removed));
            }
            StoreAction::Hydrate { entries } => {
                for mut entry in entries {
                    if self.entries.contains_key(&entry.key) {
                        continue;
                    }
                    entry.observer_count = self
                        .detached_observers
                        .remove(&entry.key)
                        .unwrap_or(0);
                    self.entries.insert(entry.key.clone(), entry);
                }
            }
            StoreAction::Clear => {
                let mut detached = std::mem::take(&mut self.detached_observers);
                for (key, entry) in self.entries.drain() {
                    if entry.observer_count > 0 {
                        detached.insert(key, entry.observer_count);
                    }
                }
                self = Self::default();
                self.detached_observers = detached;
            }
        }
        self
    }

    fn current_stamp(&self, key: &QueryKey) -> IssueStamp {
        self.entries
            .get(key)
            .map(|e| e.issued)
            .unwrap_or(IssueStamp::ZERO)
    }

    fn upsert(
        &mut self,
        key: QueryKey,
        data: Value,
        tier: CacheTier,
        issued: IssueStamp,
        now: DateTime<Utc>,
        optimistic: bool,
    ) {
        self.removed_at.remove(&key);
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.replace_data(data, tier, issued, now);
                entry.optimistic = optimistic;
            }
            None => {
                let mut entry = Entry::new(key.clone(), data, tier, issued, now);
                entry.optimistic = optimistic;
                entry.observer_count = self.detached_observers.remove(&key).unwrap_or(0);
                self.entries.insert(key, entry);
            }
        }
    }

    fn remove_entry(&mut self, key: &QueryKey, issued: IssueStamp) {
        if let Some(entry) = self.entries.remove(key) {
            if entry.observer_count > 0 {
                self.detached_observers
                    .insert(key.clone(), entry.observer_count);
            }
        }
        let latest = self.removed_at.entry(key.clone()).or_default();
        *latest = (*latest).max(issued);
    }

    fn touch(&mut self, key: QueryKey, delta: ObserverDelta, now: DateTime<Utc>) {
        let count = match self.entries.get_mut(&key) {
            Some(entry) => &mut entry.observer_count,
            None => self.detached_observers.entry(key.clone()).or_default(),
        };
        match delta {
            ObserverDelta::Observe => *count += 1,
            ObserverDelta::Release => *count = count.saturating_sub(1),
        }
        let released = *count == 0;

        if released {
            self.detached_observers.remove(&key);
            // The GC clock restarts when the last observer leaves.
            if let Some(entry) = self.entries.get_mut(&key) {
                let gc_at = time_after(now, entry.tier.policy().gc_time);
                entry.gc_at = entry.gc_at.max(gc_at);
            }
        }
    }
}
