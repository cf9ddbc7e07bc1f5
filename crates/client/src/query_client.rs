//! The query client: the async shell around the Entry Store.
//!
//! A [`QueryClient`] owns the single store and dispatches reducer actions
//! between await points. Fetching goes through the injected [`Fetcher`] and
//! time through the injected [`Clock`], so every service built on top of the
//! client can be driven deterministically in tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use clinicsync_core::cache::{
    decode_data, invalidation_patterns, role_invalidation_patterns, CacheTier, Entry, EntryStore,
    IssueStamp, ObserverDelta, PersistedState, QueryKey, Selections, StoreAction,
    DEFAULT_MAX_SIZE_BYTES,
};
use clinicsync_core::clinic::{EntityClass, Role};
use clinicsync_core::clock::{Clock, SystemClock};
use clinicsync_core::mutation::PendingMutations;
use clinicsync_core::remote::{Fetcher, Result as SyncResult, SyncError};

use crate::config::Config;
use crate::error::Result;
use crate::scheduler::Refresher;

/// Tunables of a [`QueryClient`].
#[derive(Debug, Clone)]
pub struct QueryClientOptions {
    /// Extra attempts after a failed read.
    pub read_retries: u32,
    /// Delay before the first retry. Doubles on each further retry.
    pub retry_delay: Duration,
    /// Reported by [`QueryClient::stats`].
    pub max_size_bytes: usize,
}

impl Default for QueryClientOptions {
    fn default() -> Self {
        Self {
            read_retries: 2,
            retry_delay: Duration::from_millis(1000),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

impl From<&Config> for QueryClientOptions {
    fn from(config: &Config) -> Self {
        Self {
            read_retries: config.read_retries,
            retry_delay: config.retry_delay(),
            max_size_bytes: config.max_cache_bytes,
        }
    }
}

/// Result of a non-blocking read.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedRead {
    Fresh(Value),
    /// Servable data that is due for a refetch. `error` holds the last
    /// failed refresh, if any.
    Stale {
        data: Value,
        error: Option<SyncError>,
    },
    /// Nothing cached yet; a fetch is needed.
    Missing,
}

impl CachedRead {
    pub fn data(&self) -> Option<&Value> {
        match self {
            CachedRead::Fresh(data) | CachedRead::Stale { data, .. } => Some(data),
            CachedRead::Missing => None,
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub active_entries: usize,
    pub stale_entries: usize,
    pub pending_mutations: usize,
    pub size_bytes: usize,
    pub max_size_bytes: usize,
}

/// Outcome of refetching a batch of keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefetchReport {
    pub refreshed: Vec<QueryKey>,
    pub failed: Vec<QueryKey>,
}

impl RefetchReport {
    pub fn attempted(&self) -> usize {
        self.refreshed.len() + self.failed.len()
    }
}

struct Inner {
    store: Mutex<EntryStore>,
    pending: Mutex<PendingMutations>,
    selections: Mutex<Selections>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    next_stamp: AtomicU64,
    /// Stamps of fetches that have not resolved yet.
    in_flight: Mutex<BTreeSet<IssueStamp>>,
    options: QueryClientOptions,
}

/// Registers a fetch's stamp while it runs, including when its future is
/// dropped early.
struct InFlight<'a> {
    client: &'a QueryClient,
    issued: IssueStamp,
}

impl<'a> InFlight<'a> {
    fn register(client: &'a QueryClient, issued: IssueStamp) -> Self {
        client.in_flight().insert(issued);
        Self { client, issued }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.client.in_flight().remove(&self.issued);
    }
}

/// Cheaply cloneable handle to the shared cache.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl QueryClient {
    /// Creates a client on the system clock with default options.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_clock(fetcher, Arc::new(SystemClock), QueryClientOptions::default())
    }

    pub fn with_clock(
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        options: QueryClientOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(EntryStore::new()),
                pending: Mutex::new(PendingMutations::new()),
                selections: Mutex::new(Selections::default()),
                fetcher,
                clock,
                next_stamp: AtomicU64::new(0),
                in_flight: Mutex::new(BTreeSet::new()),
                options,
            }),
        }
    }

    pub fn options(&self) -> &QueryClientOptions {
        &self.inner.options
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Returns a fresh issue stamp. Stamps strictly increase.
    pub(crate) fn issue(&self) -> IssueStamp {
        IssueStamp(self.inner.next_stamp.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn in_flight(&self) -> MutexGuard<'_, BTreeSet<IssueStamp>> {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stamp of the oldest fetch still waiting for its response.
    pub(crate) fn oldest_in_flight(&self) -> Option<IssueStamp> {
        self.in_flight().first().copied()
    }

    pub(crate) fn store(&self) -> MutexGuard<'_, EntryStore> {
        self.inner
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn pending(&self) -> MutexGuard<'_, PendingMutations> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a function to the store under its lock and returns its output.
    pub(crate) fn apply<T>(&self, f: impl FnOnce(EntryStore) -> (EntryStore, T)) -> T {
        let mut guard = self.store();
        let (next, output) = f(std::mem::take(&mut *guard));
        *guard = next;
        output
    }

    /// Applies one action to the store.
    pub fn dispatch(&self, action: StoreAction) {
        self.apply(|store| (store.reduce(action), ()));
    }

    /// Returns a copy of the entry for a key.
    pub fn get(&self, key: &QueryKey) -> Option<Entry> {
        self.store().get(key).cloned()
    }

    /// Reads the cache without fetching.
    pub fn peek(&self, key: &QueryKey) -> CachedRead {
        self.peek_under(key, None)
    }

    /// Reads the cache without fetching, judging freshness by `tier` when
    /// given instead of the entry's own stale time.
    fn peek_under(&self, key: &QueryKey, tier: Option<CacheTier>) -> CachedRead {
        let now = self.now();
        let stale = |entry: &Entry| match tier {
            Some(tier) => entry.is_stale_under(tier, now),
            None => entry.is_stale(now),
        };
        match self.store().get(key) {
            Some(entry) if entry.optimistic || !stale(entry) => {
                CachedRead::Fresh(entry.data.clone())
            }
            Some(entry) => CachedRead::Stale {
                data: entry.data.clone(),
                error: entry.last_error.clone(),
            },
            None => CachedRead::Missing,
        }
    }

    /// Reads a key, fetching on miss or when stale, with the key's own tier.
    pub async fn read(&self, key: &QueryKey) -> SyncResult<Value> {
        self.read_under(key, None).await
    }

    /// Reads a key with an overriding cache tier.
    ///
    /// Cached data counts as fresh only while it is fresh under `tier`,
    /// measured from when it was fetched. On failure the error is returned
    /// and any cached data stays in place, flagged with the error (see
    /// [`QueryClient::peek`]).
    pub async fn read_with_tier(&self, key: &QueryKey, tier: CacheTier) -> SyncResult<Value> {
        self.read_under(key, Some(tier)).await
    }

    async fn read_under(&self, key: &QueryKey, tier: Option<CacheTier>) -> SyncResult<Value> {
        if let CachedRead::Fresh(data) = self.peek_under(key, tier) {
            tracing::trace!(key = %key, "Cache hit");
            return Ok(data);
        }
        tracing::trace!(key = %key, "Cache miss or stale");
        let tier = tier.unwrap_or_else(|| key.class().tier());
        self.fetch_query(key, tier, self.inner.options.read_retries)
            .await
    }

    /// Reads and decodes a key into a typed record.
    pub async fn read_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<T> {
        let data = self.read(key).await?;
        Ok(decode_data(&data)?)
    }

    /// Fetches a key and writes the response, retrying failed attempts.
    ///
    /// The issue stamp is taken once, before the first attempt, so a
    /// response is ordered by when the read was requested. Returns the data
    /// cached for the key afterwards, which is newer than the response when
    /// the response lost to a later write.
    pub async fn fetch_query(
        &self,
        key: &QueryKey,
        tier: CacheTier,
        retries: u32,
    ) -> SyncResult<Value> {
        let issued = self.issue();
        let _in_flight = InFlight::register(self, issued);
        let mut attempt = 0;

        loop {
            match self.inner.fetcher.fetch(key).await {
                Ok(data) => return Ok(self.write_response(key, data, tier, issued)),
                Err(error) => {
                    if attempt >= retries || !error.should_retry_read() {
                        tracing::debug!(
                            key = %key,
                            attempt,
                            error_kind = error.kind(),
                            error = %error,
                            "Fetch failed"
                        );
                        self.dispatch(StoreAction::RecordError {
                            key: key.clone(),
                            error: error.clone(),
                        });
                        return Err(error);
                    }
                    let delay = self
                        .inner
                        .options
                        .retry_delay
                        .saturating_mul(1u32 << attempt.min(16));
                    tracing::debug!(key = %key, attempt, error = %error, ?delay, "Retrying fetch");
                    attempt += 1;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    fn write_response(
        &self,
        key: &QueryKey,
        data: Value,
        tier: CacheTier,
        issued: IssueStamp,
    ) -> Value {
        let now = self.now();
        self.apply(|store| {
            let optimistic = store.get(key).is_some_and(|e| e.optimistic);
            if optimistic || !store.accepts(key, issued) {
                tracing::debug!(key = %key, issued = issued.0, "Discarding superseded response");
                let current = store.get(key).map(|e| e.data.clone()).unwrap_or(data);
                return (store, current);
            }
            let store = store.reduce(StoreAction::Write {
                key: key.clone(),
                data: data.clone(),
                tier,
                issued,
                now,
            });
            (store, data)
        })
    }

    /// Fetches a key only if it is missing or stale, without observing it
    /// and without retries.
    pub async fn prefetch(&self, key: &QueryKey) -> SyncResult<()> {
        if let CachedRead::Fresh(_) = self.peek(key) {
            return Ok(());
        }
        self.fetch_query(key, key.class().tier(), 0).await.map(|_| ())
    }

    /// Registers an observer on a key for the lifetime of the handle.
    pub fn observe(&self, key: QueryKey) -> QueryObserver {
        self.dispatch(StoreAction::Touch {
            key: key.clone(),
            delta: ObserverDelta::Observe,
            now: self.now(),
        });
        QueryObserver {
            client: self.clone(),
            key,
        }
    }

    /// Marks an entity class, and optionally one entity, stale along with
    /// every dependent key. Returns the keys that were matched.
    pub fn invalidate(&self, class: EntityClass, id: Option<&str>) -> Vec<QueryKey> {
        let patterns = invalidation_patterns(class, id);
        self.mark_stale(patterns)
    }

    /// Marks the entity classes a role may see stale.
    pub fn invalidate_by_role(&self, role: Role, scope_id: Option<&str>) -> Vec<QueryKey> {
        let patterns = role_invalidation_patterns(role, scope_id);
        self.mark_stale(patterns)
    }

    fn mark_stale(&self, patterns: Vec<String>) -> Vec<QueryKey> {
        let now = self.now();
        let keys = self.apply(|store| {
            let keys = store.keys_matching(&patterns);
            let store = store.reduce(StoreAction::MarkStale {
                patterns: patterns.clone(),
                now,
            });
            (store, keys)
        });
        tracing::debug!(?patterns, matched = keys.len(), "Invalidated queries");
        keys
    }

    /// Removes every key matching the glob patterns.
    pub fn remove_queries(&self, patterns: Vec<String>) -> Vec<QueryKey> {
        self.apply(|store| {
            let keys = store.keys_matching(&patterns);
            (store.reduce(StoreAction::RemoveMatching { patterns }), keys)
        })
    }

    pub fn clear(&self) {
        self.dispatch(StoreAction::Clear);
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.now();
        let pending_mutations = self.pending().len();
        let store = self.store();
        CacheStats {
            total_entries: store.len(),
            active_entries: store.active_count(),
            stale_entries: store.all().filter(|e| e.is_stale(now)).count(),
            pending_mutations,
            size_bytes: store.size_bytes(),
            max_size_bytes: self.inner.options.max_size_bytes,
        }
    }

    /// Observed keys, optionally restricted to one tier.
    pub fn active_keys(&self, tier: Option<CacheTier>) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .store()
            .all()
            .filter(|e| e.is_active() && !e.optimistic)
            .filter(|e| tier.is_none_or(|t| e.tier == t))
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Observed keys whose data is stale.
    pub fn stale_active_keys(&self) -> Vec<QueryKey> {
        let now = self.now();
        let mut keys: Vec<QueryKey> = self
            .store()
            .all()
            .filter(|e| e.is_active() && !e.optimistic && e.is_stale(now))
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Refetches keys concurrently. Failures are logged, not returned.
    pub async fn refetch(&self, keys: Vec<QueryKey>) -> RefetchReport {
        let results = join_all(keys.into_iter().map(|key| async move {
            let tier = self
                .get(&key)
                .map(|e| e.tier)
                .unwrap_or_else(|| key.class().tier());
            let outcome = self
                .fetch_query(&key, tier, self.inner.options.read_retries)
                .await;
            (key, outcome)
        }))
        .await;

        let mut report = RefetchReport::default();
        for (key, outcome) in results {
            match outcome {
                Ok(_) => report.refreshed.push(key),
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "Background refresh failed");
                    report.failed.push(key);
                }
            }
        }
        report
    }

    pub fn selections(&self) -> Selections {
        self.inner
            .selections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_selections(&self, selections: Selections) {
        *self
            .inner
            .selections
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = selections;
    }

    /// Captures the persistable subset of the client state.
    pub fn snapshot(&self) -> PersistedState {
        let selections = self.selections();
        let now = self.now();
        PersistedState::capture(&self.store(), selections, now)
    }

    /// Loads persisted state. Keys already cached are left untouched.
    pub fn hydrate(&self, state: &PersistedState) {
        let entries = state.restore_entries(self.now());
        tracing::debug!(entries = entries.len(), "Hydrating cache");
        self.dispatch(StoreAction::Hydrate { entries });
        self.set_selections(state.selections.clone());
    }
}

#[async_trait]
impl Refresher for QueryClient {
    async fn refresh_tier(&self, tier: CacheTier) -> RefetchReport {
        let keys = self.active_keys(Some(tier));
        tracing::trace!(tier = %tier, keys = keys.len(), "Refreshing tier");
        self.refetch(keys).await
    }

    async fn refresh_stale_active(&self) -> RefetchReport {
        let keys = self.stale_active_keys();
        tracing::debug!(keys = keys.len(), "Refreshing stale active queries");
        self.refetch(keys).await
    }
}

/// Keeps a key observed until dropped.
pub struct QueryObserver {
    client: QueryClient,
    key: QueryKey,
}

impl QueryObserver {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Reads the observed key, fetching when needed.
    pub async fn read(&self) -> SyncResult<Value> {
        self.client.read(&self.key).await
    }

    pub fn peek(&self) -> CachedRead {
        self.client.peek(&self.key)
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        self.client.dispatch(StoreAction::Touch {
            key: self.key.clone(),
            delta: ObserverDelta::Release,
            now: self.client.now(),
        });
    }
}

impl std::fmt::Debug for QueryObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryObserver")
            .field("key", &self.key)
            .finish()
    }
}
