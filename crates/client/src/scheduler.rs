//! Background refresh of observed queries.
//!
//! One timer runs per cache tier. Each tick refreshes the tier's observed
//! queries when the gate allows it: the client must be online, and every
//! tier except `critical` also needs the page to be visible. Going offline
//! clears every timer; coming back online reschedules them and refetches
//! stale observed queries right away, as does the page becoming visible.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use clinicsync_core::cache::CacheTier;

use crate::query_client::RefetchReport;
use crate::timer::{CancelToken, TickFn, Timer};

/// What the scheduler refreshes.
#[async_trait]
pub trait Refresher: Send + Sync {
    /// Refetches the observed queries of one tier.
    async fn refresh_tier(&self, tier: CacheTier) -> RefetchReport;

    /// Refetches every observed query whose data is stale.
    async fn refresh_stale_active(&self) -> RefetchReport;
}

/// Returns true if a tier's tick may refresh.
///
/// # Examples
///
/// ```
/// use clinicsync_client::scheduler::refresh_allowed;
/// use clinicsync_core::cache::CacheTier;
///
/// assert!(refresh_allowed(CacheTier::Critical, true, false));
/// assert!(!refresh_allowed(CacheTier::Session, true, false));
/// assert!(!refresh_allowed(CacheTier::Critical, false, true));
/// ```
pub fn refresh_allowed(tier: CacheTier, online: bool, visible: bool) -> bool {
    online && (tier.refreshes_when_hidden() || visible)
}

struct SchedulerState {
    online: bool,
    visible: bool,
    started: bool,
    timers: HashMap<CacheTier, CancelToken>,
}

pub struct RefreshScheduler {
    refresher: Arc<dyn Refresher>,
    timer: Arc<dyn Timer>,
    state: Arc<Mutex<SchedulerState>>,
}

impl RefreshScheduler {
    /// Creates a stopped scheduler that assumes online and visible.
    pub fn new(refresher: Arc<dyn Refresher>, timer: Arc<dyn Timer>) -> Self {
        Self {
            refresher,
            timer,
            state: Arc::new(Mutex::new(SchedulerState {
                online: true,
                visible: true,
                started: false,
                timers: HashMap::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_online(&self) -> bool {
        self.state().online
    }

    pub fn is_visible(&self) -> bool {
        self.state().visible
    }

    /// Number of tier timers currently scheduled.
    pub fn active_timers(&self) -> usize {
        self.state().timers.len()
    }

    pub fn start(&self) {
        let mut state = self.state();
        state.started = true;
        if state.online {
            self.schedule_all(&mut state);
        }
    }

    pub fn stop(&self) {
        let mut state = self.state();
        state.started = false;
        state.timers.clear();
        tracing::debug!("Refresh scheduler stopped");
    }

    fn schedule_all(&self, state: &mut SchedulerState) {
        for tier in CacheTier::ALL {
            let token = self
                .timer
                .schedule(tier.refresh_interval(), self.tick_for(tier));
            state.timers.insert(tier, token);
        }
        tracing::debug!(timers = state.timers.len(), "Refresh timers scheduled");
    }

    fn tick_for(&self, tier: CacheTier) -> TickFn {
        let refresher = self.refresher.clone();
        let state = Arc::downgrade(&self.state);
        Arc::new(move || {
            let refresher = refresher.clone();
            let state = state.clone();
            async move {
                let Some(state) = state.upgrade() else {
                    return;
                };
                let allowed = {
                    let state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    refresh_allowed(tier, state.online, state.visible)
                };
                if !allowed {
                    tracing::trace!(tier = %tier, "Refresh tick gated");
                    return;
                }
                let report = refresher.refresh_tier(tier).await;
                if !report.failed.is_empty() {
                    tracing::debug!(
                        tier = %tier,
                        refreshed = report.refreshed.len(),
                        failed = report.failed.len(),
                        "Tier refresh finished with failures"
                    );
                }
            }
            .boxed()
        })
    }

    /// Applies a connectivity change.
    ///
    /// Returns the refetch report when coming back online triggered one.
    pub async fn set_online(&self, online: bool) -> Option<RefetchReport> {
        {
            let mut state = self.state();
            if state.online == online {
                return None;
            }
            state.online = online;
            if !online {
                state.timers.clear();
                tracing::info!("Offline: refresh timers cleared");
                return None;
            }
            if state.started {
                self.schedule_all(&mut state);
            }
            tracing::info!("Online: refreshing stale queries");
        }
        Some(self.refresher.refresh_stale_active().await)
    }

    /// Applies a visibility change.
    ///
    /// Returns the refetch report when becoming visible triggered one.
    pub async fn set_visible(&self, visible: bool) -> Option<RefetchReport> {
        {
            let mut state = self.state();
            if state.visible == visible {
                return None;
            }
            state.visible = visible;
            if !visible || !state.online {
                return None;
            }
        }
        tracing::debug!("Visible: refreshing stale queries");
        Some(self.refresher.refresh_stale_active().await)
    }

    /// Follows connectivity and visibility signals until both senders drop.
    pub fn listen(
        self: Arc<Self>,
        mut online: watch::Receiver<bool>,
        mut visible: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut online_open = true;
            let mut visible_open = true;
            while online_open || visible_open {
                tokio::select! {
                    changed = online.changed(), if online_open => match changed {
                        Ok(()) => {
                            let value = *online.borrow_and_update();
                            self.set_online(value).await;
                        }
                        Err(_) => online_open = false,
                    },
                    changed = visible.changed(), if visible_open => match changed {
                        Ok(()) => {
                            let value = *visible.borrow_and_update();
                            self.set_visible(value).await;
                        }
                        Err(_) => visible_open = false,
                    },
                }
            }
        })
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.state().timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualTimer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockRefresher {
        tier_calls: Mutex<Vec<CacheTier>>,
        stale_calls: AtomicUsize,
    }

    impl MockRefresher {
        fn tier_calls(&self, tier: CacheTier) -> usize {
            self.tier_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|t| **t == tier)
                .count()
        }
    }

    #[async_trait]
    impl Refresher for MockRefresher {
        async fn refresh_tier(&self, tier: CacheTier) -> RefetchReport {
            self.tier_calls.lock().unwrap().push(tier);
            RefetchReport::default()
        }

        async fn refresh_stale_active(&self) -> RefetchReport {
            self.stale_calls.fetch_add(1, Ordering::SeqCst);
            RefetchReport::default()
        }
    }

    fn scheduler() -> (Arc<MockRefresher>, ManualTimer, RefreshScheduler) {
        let refresher = Arc::new(MockRefresher::default());
        let timer = ManualTimer::new();
        let scheduler = RefreshScheduler::new(refresher.clone(), Arc::new(timer.clone()));
        (refresher, timer, scheduler)
    }

    #[test]
    fn test_refresh_gate() {
        for tier in CacheTier::ALL {
            assert!(refresh_allowed(tier, true, true));
            assert!(!refresh_allowed(tier, false, true));
            assert!(!refresh_allowed(tier, false, false));
        }
        assert!(refresh_allowed(CacheTier::Critical, true, false));
        assert!(!refresh_allowed(CacheTier::Realtime, true, false));
        assert!(!refresh_allowed(CacheTier::Static, true, false));
    }

    #[tokio::test]
    async fn test_one_timer_per_tier() {
        let (refresher, timer, scheduler) = scheduler();
        scheduler.start();
        assert_eq!(scheduler.active_timers(), 5);

        timer.advance(Duration::from_secs(30 * 60)).await;

        assert_eq!(refresher.tier_calls(CacheTier::Critical), 30);
        assert_eq!(refresher.tier_calls(CacheTier::Realtime), 15);
        assert_eq!(refresher.tier_calls(CacheTier::Session), 6);
        assert_eq!(refresher.tier_calls(CacheTier::Profile), 2);
        assert_eq!(refresher.tier_calls(CacheTier::Static), 1);
    }

    #[tokio::test]
    async fn test_hidden_page_only_refreshes_critical() {
        let (refresher, timer, scheduler) = scheduler();
        scheduler.start();
        assert!(scheduler.set_visible(false).await.is_none());

        timer.advance(Duration::from_secs(5 * 60)).await;

        assert_eq!(refresher.tier_calls(CacheTier::Critical), 5);
        assert_eq!(refresher.tier_calls(CacheTier::Realtime), 0);
        assert_eq!(refresher.tier_calls(CacheTier::Session), 0);
    }

    #[tokio::test]
    async fn test_becoming_visible_refreshes_stale_queries() {
        let (refresher, _timer, scheduler) = scheduler();
        scheduler.start();
        scheduler.set_visible(false).await;

        assert!(scheduler.set_visible(true).await.is_some());
        assert!(scheduler.set_visible(true).await.is_none());
        assert_eq!(refresher.stale_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offline_clears_timers_until_online() {
        let (refresher, timer, scheduler) = scheduler();
        scheduler.start();
        timer.advance(Duration::from_secs(60)).await;
        assert_eq!(refresher.tier_calls(CacheTier::Critical), 1);

        scheduler.set_online(false).await;
        assert_eq!(scheduler.active_timers(), 0);
        timer.advance(Duration::from_secs(60 * 60)).await;
        assert_eq!(refresher.tier_calls(CacheTier::Critical), 1);
        assert_eq!(refresher.stale_calls.load(Ordering::SeqCst), 0);

        assert!(scheduler.set_online(true).await.is_some());
        assert_eq!(refresher.stale_calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_timers(), 5);
        timer.advance(Duration::from_secs(60)).await;
        assert_eq!(refresher.tier_calls(CacheTier::Critical), 2);
    }

    #[tokio::test]
    async fn test_visible_while_offline_does_not_refresh() {
        let (refresher, _timer, scheduler) = scheduler();
        scheduler.set_online(false).await;
        scheduler.set_visible(false).await;

        assert!(scheduler.set_visible(true).await.is_none());
        assert_eq!(refresher.stale_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_cancels_timers() {
        let (refresher, timer, scheduler) = scheduler();
        scheduler.start();
        scheduler.stop();

        timer.advance(Duration::from_secs(60 * 60)).await;

        assert_eq!(timer.active_tasks(), 0);
        assert_eq!(refresher.tier_calls(CacheTier::Critical), 0);
    }

    #[tokio::test]
    async fn test_listen_follows_signals() {
        let (refresher, _timer, scheduler) = scheduler();
        let scheduler = Arc::new(scheduler);
        scheduler.start();
        let (online_tx, online_rx) = watch::channel(true);
        let (visible_tx, visible_rx) = watch::channel(true);
        let handle = scheduler.clone().listen(online_rx, visible_rx);

        online_tx.send(false).unwrap();
        online_tx.send(true).unwrap();
        drop(online_tx);
        drop(visible_tx);
        handle.await.unwrap();

        assert!(scheduler.is_online());
        assert_eq!(scheduler.active_timers(), 5);
        assert!(refresher.stale_calls.load(Ordering::SeqCst) <= 1);
    }
}
