//! Size-bounded eviction and garbage collection of the shared cache.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;

use clinicsync_core::cache::{plan_eviction, threshold_bytes, QueryKey, StoreAction};

use crate::config::Config;
use crate::query_client::QueryClient;
use crate::timer::{CancelToken, Timer};

/// Outcome of one cleanup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Entries dropped because their GC time elapsed unobserved.
    pub collected: Vec<QueryKey>,
    /// Entries dropped to get under the size threshold.
    pub evicted: Vec<QueryKey>,
    pub size_before: usize,
    pub size_after: usize,
    pub threshold: usize,
    /// The cache is still over threshold because every remaining entry is
    /// observed.
    pub over_threshold: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EvictorSettings {
    pub max_size_bytes: usize,
    pub threshold_percent: u8,
    pub interval: Duration,
}

impl From<&Config> for EvictorSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_size_bytes: config.max_cache_bytes,
            threshold_percent: config.eviction_threshold_percent,
            interval: config.cleanup_interval(),
        }
    }
}

/// Keeps the cache under its size threshold.
pub struct Evictor {
    client: QueryClient,
    settings: EvictorSettings,
    timer: Arc<dyn Timer>,
    token: Mutex<Option<CancelToken>>,
}

impl Evictor {
    pub fn new(client: QueryClient, settings: EvictorSettings, timer: Arc<dyn Timer>) -> Self {
        Self {
            client,
            settings,
            timer,
            token: Mutex::new(None),
        }
    }

    pub fn threshold(&self) -> usize {
        threshold_bytes(self.settings.max_size_bytes, self.settings.threshold_percent)
    }

    /// Evicts unobserved entries, oldest first, until the cache fits under
    /// the threshold. A no-op when already under it.
    pub fn run_cleanup(&self) -> CleanupReport {
        let threshold = self.threshold();
        let oldest_in_flight = self.client.oldest_in_flight();
        let plan = self.client.apply(|store| {
            let plan = plan_eviction(&store, threshold);
            if plan.is_noop() {
                return (store, plan);
            }
            let store = store
                .reduce(StoreAction::RemoveMany {
                    keys: plan.victims.clone(),
                })
                .reduce(StoreAction::PruneTombstones { oldest_in_flight });
            (store, plan)
        });

        if !plan.is_noop() {
            tracing::info!(
                evicted = plan.victims.len(),
                size_before = plan.size_before,
                size_after = plan.size_after,
                threshold,
                "Evicted cache entries"
            );
        }
        if plan.over_threshold() {
            tracing::warn!(
                size = plan.size_after,
                threshold,
                "Cache over threshold with only observed entries left"
            );
        }

        CleanupReport {
            collected: Vec::new(),
            over_threshold: plan.over_threshold(),
            evicted: plan.victims,
            size_before: plan.size_before,
            size_after: plan.size_after,
            threshold,
        }
    }

    /// Drops unobserved entries whose GC time has passed, along with
    /// removal records no pending fetch still needs.
    pub fn collect_garbage(&self) -> Vec<QueryKey> {
        let now = self.client.now();
        let oldest_in_flight = self.client.oldest_in_flight();
        let collected = self.client.apply(|store| {
            let due: Vec<QueryKey> = store
                .all()
                .filter(|e| e.is_gc_due(now))
                .map(|e| e.key.clone())
                .collect();
            let store = store
                .reduce(StoreAction::CollectGarbage { now })
                .reduce(StoreAction::PruneTombstones { oldest_in_flight });
            (store, due)
        });
        if !collected.is_empty() {
            tracing::debug!(collected = collected.len(), "Garbage collected entries");
        }
        collected
    }

    /// Garbage collection followed by size cleanup.
    pub fn run_once(&self) -> CleanupReport {
        let collected = self.collect_garbage();
        let mut report = self.run_cleanup();
        report.collected = collected;
        report
    }

    /// Starts the periodic cleanup. Restarting replaces the running task.
    pub fn start(self: &Arc<Self>) {
        let evictor = Arc::downgrade(self);
        let token = self.timer.schedule(
            self.settings.interval,
            Arc::new(move || {
                let evictor = evictor.clone();
                async move {
                    if let Some(evictor) = evictor.upgrade() {
                        evictor.run_once();
                    }
                }
                .boxed()
            }),
        );
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        tracing::debug!(interval = ?self.settings.interval, "Evictor started");
    }

    pub fn stop(&self) {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_running(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_client::tests::{fixed_now, test_client, MockFetcher};
    use crate::timer::ManualTimer;
    use clinicsync_core::cache::{client_key, estimate_size, CacheTier};
    use clinicsync_core::clock::{Clock, ManualClock};
    use serde_json::json;

    fn write(client: &QueryClient, key: QueryKey, data: serde_json::Value) {
        client.dispatch(StoreAction::Write {
            key,
            data,
            tier: CacheTier::Profile,
            issued: client.issue(),
            now: client.now(),
        });
    }

    fn evictor(client: &QueryClient, max_size_bytes: usize, timer: ManualTimer) -> Arc<Evictor> {
        Arc::new(Evictor::new(
            client.clone(),
            EvictorSettings {
                max_size_bytes,
                threshold_percent: 100,
                interval: Duration::from_secs(300),
            },
            Arc::new(timer),
        ))
    }

    #[tokio::test]
    async fn test_cleanup_under_threshold_is_noop() {
        let client = test_client(Arc::new(MockFetcher::new()), ManualClock::new(fixed_now()));
        write(&client, client_key("1"), json!({"progress": 1}));

        let report = evictor(&client, 10_000, ManualTimer::new()).run_cleanup();

        assert!(report.evicted.is_empty());
        assert!(!report.over_threshold);
        assert_eq!(client.stats().total_entries, 1);
    }

    #[tokio::test]
    async fn test_cleanup_never_removes_observed_entries() {
        let clock = ManualClock::new(fixed_now());
        let client = test_client(Arc::new(MockFetcher::new()), clock.clone());
        let data = json!({"notes": "x".repeat(100)});
        let size = estimate_size(&client_key("a"), &data);
        write(&client, client_key("a"), data.clone());
        write(&client, client_key("b"), data.clone());
        let _observer_a = client.observe(client_key("a"));
        let _observer_b = client.observe(client_key("b"));

        let report = evictor(&client, size, ManualTimer::new()).run_cleanup();

        assert!(report.evicted.is_empty());
        assert!(report.over_threshold);
        assert_eq!(client.stats().total_entries, 2);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let clock = ManualClock::new(fixed_now());
        let client = test_client(Arc::new(MockFetcher::new()), clock.clone());
        let data = json!({"notes": "x".repeat(100)});
        let size = estimate_size(&client_key("a"), &data);
        write(&client, client_key("a"), data.clone());
        clock.advance(Duration::from_secs(1));
        write(&client, client_key("b"), data);
        let evictor = evictor(&client, size, ManualTimer::new());

        let first = evictor.run_cleanup();
        let second = evictor.run_cleanup();

        assert_eq!(first.evicted, vec![client_key("a")]);
        assert!(second.evicted.is_empty());
    }

    #[tokio::test]
    async fn test_periodic_tick_collects_garbage() {
        let clock = ManualClock::new(fixed_now());
        let timer = ManualTimer::with_clock(clock.clone());
        let client = test_client(Arc::new(MockFetcher::new()), clock.clone());
        write(&client, client_key("1"), json!({"progress": 1}));
        let evictor = evictor(&client, 10_000, timer.clone());

        evictor.start();
        assert!(evictor.is_running());
        timer.advance(Duration::from_secs(30 * 60)).await;

        assert_eq!(client.stats().total_entries, 0);
        assert_eq!(clock.now(), fixed_now() + chrono::TimeDelta::minutes(30));

        evictor.stop();
        assert!(!evictor.is_running());
        assert_eq!(timer.active_tasks(), 0);
    }
}
