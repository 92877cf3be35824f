use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, TokioRuntimeError};

pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Handle of one scheduled callback.
#[derive(Debug)]
pub struct TaskHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// `true` until the callback has run or the handle has been cancelled.
    pub fn is_pending(&self) -> bool {
        !self.token.is_cancelled() && self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Cancel the callback if it has not run yet. Returns whether anything was cancelled;
    /// cancelling twice, or after the callback ran, does nothing.
    pub fn cancel(&mut self) -> bool {
        let pending = self.is_pending();
        self.token.cancel();
        self.join.take();
        pending
    }
}

/// Runs callbacks after a delay on some timeline.
///
/// Implementations must never run the callback from inside `schedule_after`.
pub trait Scheduler: Clone + Send + Sync + 'static {
    fn schedule_after(&self, delay: Duration, callback: Callback) -> TaskHandle;

    fn cancel(&self, handle: &mut TaskHandle) -> bool {
        handle.cancel()
    }
}

/// Schedules callbacks as tasks on a tokio runtime. Honors paused time.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the current context.
    pub fn current() -> Result<Self, Error> {
        let handle = Handle::try_current().map_err(TokioRuntimeError::from)?;
        Ok(Self::new(handle))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, callback: Callback) -> TaskHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let join = self.handle.spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {
                    trace!("Scheduled callback cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    // On a multi-thread runtime cancel() can still lose the race against this
                    // branch, callers guard their own state.
                    callback();
                }
            }
        });
        TaskHandle {
            token,
            join: Some(join),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    cancelled: bool,
    pending: Option<TaskHandle>,
}

struct Recurring<S> {
    scheduler: S,
    period: Duration,
    tick: Box<dyn Fn() + Send + Sync>,
    slot: Mutex<Slot>,
}

impl<S: Scheduler> Recurring<S> {
    fn arm(this: &Arc<Self>) {
        let mut slot = this.slot.lock();
        if slot.cancelled {
            return;
        }
        let next = Arc::clone(this);
        let handle = this.scheduler.schedule_after(
            this.period,
            Box::new(move || {
                (next.tick)();
                // Measured from this tick: a late wakeup delays the next tick, it never
                // causes a burst of catch-up ticks.
                Recurring::arm(&next);
            }),
        );
        slot.pending = Some(handle);
    }
}

/// A callback that re-arms itself `period` after each run until cancelled.
///
/// Only one callback is ever pending, and its handle is the single point of cancellation.
pub struct RecurringTask<S: Scheduler> {
    inner: Arc<Recurring<S>>,
}

impl<S: Scheduler> RecurringTask<S> {
    /// Arm the task; the first tick happens one `period` from now.
    pub fn start<F>(scheduler: S, period: Duration, tick: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        debug!(?period, "Start recurring task");
        let inner = Arc::new(Recurring {
            scheduler,
            period,
            tick: Box::new(tick),
            slot: Mutex::new(Slot::default()),
        });
        Recurring::arm(&inner);
        Self { inner }
    }

    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Stop re-arming and cancel the pending callback. Idempotent.
    pub fn cancel(&self) {
        let mut slot = self.inner.slot.lock();
        if slot.cancelled {
            return;
        }
        slot.cancelled = true;
        if let Some(mut pending) = slot.pending.take() {
            self.inner.scheduler.cancel(&mut pending);
        }
        debug!(period = ?self.inner.period, "Cancel recurring task");
    }
}

impl<S: Scheduler> Drop for RecurringTask<S> {
    fn drop(&mut self) {
        self.cancel();
    }
}
