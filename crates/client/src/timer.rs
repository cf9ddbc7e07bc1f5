//! Cancellable periodic scheduling.
//!
//! Background services never touch platform timers directly; they schedule
//! through [`Timer`]. [`TokioTimer`] runs on the tokio runtime and
//! [`ManualTimer`] fires only when a test advances virtual time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;

use clinicsync_core::clock::ManualClock;

/// A periodic task body.
pub type TickFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle to a scheduled task. Cancels the task when dropped.
#[derive(Debug)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl CancelToken {
    fn new(cancelled: Arc<AtomicBool>, abort: Option<AbortHandle>) -> Self {
        Self { cancelled, abort }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for CancelToken {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub trait Timer: Send + Sync {
    /// Runs `tick` every `every`, first firing one interval from now.
    fn schedule(&self, every: Duration, tick: TickFn) -> CancelToken;
}

/// Timer backed by `tokio::time::interval`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn schedule(&self, every: Duration, tick: TickFn) -> CancelToken {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let every = every.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                tick().await;
            }
        });

        CancelToken::new(cancelled, Some(handle.abort_handle()))
    }
}

struct ManualTask {
    every: Duration,
    next_due: Duration,
    tick: TickFn,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct ManualState {
    elapsed: Duration,
    tasks: Vec<ManualTask>,
}

/// Timer driven by [`ManualTimer::advance`].
///
/// When built with a [`ManualClock`], the clock is moved to each tick's due
/// time before the tick runs.
#[derive(Clone, Default)]
pub struct ManualTimer {
    state: Arc<Mutex<ManualState>>,
    clock: Option<ManualClock>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: ManualClock) -> Self {
        Self {
            state: Arc::default(),
            clock: Some(clock),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of scheduled tasks that have not been cancelled.
    pub fn active_tasks(&self) -> usize {
        self.state()
            .tasks
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Moves virtual time forward, running every tick that falls due in
    /// order of due time. Returns how many ticks ran.
    pub async fn advance(&self, by: Duration) -> usize {
        let target = self.state().elapsed + by;
        let mut fired = 0;

        loop {
            let next = {
                let mut state = self.state();
                state
                    .tasks
                    .retain(|t| !t.cancelled.load(Ordering::SeqCst));
                let due = state
                    .tasks
                    .iter_mut()
                    .filter(|t| t.next_due <= target)
                    .min_by_key(|t| t.next_due);
                match due {
                    Some(task) => {
                        let at = task.next_due;
                        task.next_due += task.every;
                        let tick = task.tick.clone();
                        let previous = state.elapsed;
                        state.elapsed = at;
                        Some((tick, at.saturating_sub(previous)))
                    }
                    None => None,
                }
            };

            let Some((tick, step)) = next else {
                break;
            };
            if let Some(clock) = &self.clock {
                clock.advance(step);
            }
            tick().await;
            fired += 1;
        }

        let remaining = {
            let mut state = self.state();
            let remaining = target.saturating_sub(state.elapsed);
            state.elapsed = target;
            remaining
        };
        if let Some(clock) = &self.clock {
            clock.advance(remaining);
        }
        fired
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, every: Duration, tick: TickFn) -> CancelToken {
        let every = every.max(Duration::from_millis(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.state();
        let next_due = state.elapsed + every;
        state.tasks.push(ManualTask {
            every,
            next_due,
            tick,
            cancelled: cancelled.clone(),
        });
        CancelToken::new(cancelled, None)
    }
}
