use std::sync::Arc;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Aqm, AqmQueue, Verdict};
use crate::cells::Packet;
use crate::error::Error;
use crate::timer::{RecurringTask, Scheduler, TokioScheduler};

/// An [`AqmQueue`] together with the timer that runs its controller's update rule.
///
/// Packets are enqueued and dequeued synchronously by the owner; the update rule runs on the
/// scheduler every `update_interval` once the disc is started.
pub struct QueueDisc<P, A, R, S: Scheduler = TokioScheduler> {
    queue: Arc<Mutex<AqmQueue<P, A, R>>>,
    scheduler: S,
    updater: Option<RecurringTask<S>>,
    // Checked by the update callback under the queue lock, so no update runs after stop()
    alive: CancellationToken,
}

impl<P, A, R, S: Scheduler> QueueDisc<P, A, R, S> {
    pub fn is_running(&self) -> bool {
        self.updater.is_some()
    }

    /// Cancel the periodic update. Stopping a stopped disc does nothing.
    pub fn stop(&mut self) {
        let Some(updater) = self.updater.take() else {
            return;
        };
        {
            let _queue = self.queue.lock();
            self.alive.cancel();
        }
        updater.cancel();
        info!("Stop queue disc");
    }
}

impl<P, A, R, S> QueueDisc<P, A, R, S>
where
    P: Packet,
    A: Aqm + 'static,
    R: Rng + SeedableRng + Send + 'static,
    S: Scheduler,
{
    pub fn new(queue: AqmQueue<P, A, R>, scheduler: S) -> Self {
        debug!("New QueueDisc");
        Self {
            queue: Arc::new(Mutex::new(queue)),
            scheduler,
            updater: None,
            alive: CancellationToken::new(),
        }
    }

    /// Initialize the controller and start the periodic update. Restarts a running disc.
    pub fn start(&mut self) -> Result<(), Error> {
        self.stop();
        self.queue.lock().initialize()?;
        self.arm();
        info!("Start queue disc");
        Ok(())
    }

    fn arm(&mut self) {
        let period = self.queue.lock().controller().update_interval();
        let alive = CancellationToken::new();
        self.alive = alive.clone();
        let queue = Arc::clone(&self.queue);
        self.updater = Some(RecurringTask::start(
            self.scheduler.clone(),
            period,
            move || {
                let mut queue = queue.lock();
                if alive.is_cancelled() {
                    return;
                }
                queue.run_update();
            },
        ));
    }

    pub fn enqueue(&self, packet: P) -> Verdict {
        self.queue.lock().enqueue(packet)
    }

    pub fn dequeue(&self) -> Option<P> {
        self.queue.lock().dequeue()
    }

    /// Network layer length of the head packet.
    pub fn peek_size(&self) -> Option<usize> {
        self.queue.lock().peek().map(|packet| packet.l3_length())
    }

    pub fn occupancy(&self) -> usize {
        self.queue.lock().occupancy()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn stats(&self) -> A::Stats {
        self.queue.lock().stats()
    }

    pub fn assign_streams(&self, stream: u64) -> u64 {
        self.queue.lock().assign_streams(stream)
    }

    /// Run `f` against the queue while holding its lock.
    pub fn inspect<T>(&self, f: impl FnOnce(&AqmQueue<P, A, R>) -> T) -> T {
        f(&self.queue.lock())
    }

    /// Apply a new controller config. A running disc picks up a changed update interval.
    pub fn configure(&mut self, config: A::Config) -> Result<(), Error> {
        let period = {
            let mut queue = self.queue.lock();
            queue.configure(config)?;
            queue.controller().update_interval()
        };
        if self
            .updater
            .as_ref()
            .is_some_and(|updater| updater.period() != period)
        {
            self.stop();
            self.arm();
        }
        Ok(())
    }

    /// Apply a (possibly partial) JSON config on top of the current one.
    #[cfg(feature = "serde")]
    pub fn config_queue(&mut self, payload: serde_json::Value) -> Result<(), Error> {
        let mut current = serde_json::to_value(self.queue.lock().controller().config())?;
        match (current.as_object_mut(), payload) {
            (Some(current), serde_json::Value::Object(payload)) => current.extend(payload),
            (_, payload) => {
                return Err(Error::ConfigError(crate::error::ConfigError::Load(
                    format!("Expect a JSON object, got {payload}"),
                )))
            }
        }
        let config: A::Config = serde_json::from_value(current)?;
        self.configure(config)
    }
}

impl<P, A, R, S: Scheduler> Drop for QueueDisc<P, A, R, S> {
    fn drop(&mut self) {
        self.stop();
    }
}
