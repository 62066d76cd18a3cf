//! Async cadence for owners that run the queue inside a tokio runtime.
//!
//! The queue itself never schedules anything. `Driver` calls
//! [`MessageQueue::do_work`] on an interval until a shutdown future resolves,
//! lets in-flight messages finish for up to the shutdown timeout, then cancels
//! whatever is left so every message still gets its terminal notification.
//!
//! The queue is `!Send`, so the driver runs on a current-thread runtime or
//! inside a `tokio::task::LocalSet`.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use crate::queue::MessageQueue;

/// Periodic driver for a [`MessageQueue`].
#[derive(Debug, Clone)]
pub struct Driver {
    tick_interval: Duration,
    shutdown_timeout: Duration,
}

impl Default for Driver {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::ZERO,
        }
    }
}

impl Driver {
    /// Create a driver that ticks every `tick_interval`.
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            ..Default::default()
        }
    }

    /// How long to keep ticking after shutdown so in-flight messages can
    /// finish. Zero cancels immediately.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Tick the queue until `shutdown` completes, then drain it.
    pub async fn run_until<M, R, S>(&self, queue: &mut MessageQueue<M, R>, shutdown: S)
    where
        M: Clone + 'static,
        R: 'static,
        S: Future<Output = ()>,
    {
        tracing::info!(
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            "Queue driver started"
        );

        let mut interval = time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => queue.do_work(),
            }
        }

        tracing::info!(tracked = queue.len(), "Shutdown requested, draining...");
        self.drain(queue, &mut interval).await;

        tracing::info!("Queue driver stopped");
    }

    /// Keep ticking until the queue empties or the shutdown timeout passes,
    /// then cancel the rest.
    async fn drain<M, R>(&self, queue: &mut MessageQueue<M, R>, interval: &mut time::Interval)
    where
        M: Clone + 'static,
        R: 'static,
    {
        let deadline = time::Instant::now() + self.shutdown_timeout;

        while !queue.is_empty() {
            if time::Instant::now() >= deadline {
                tracing::warn!(
                    tracked = queue.len(),
                    "Shutdown timeout reached, cancelling remaining messages"
                );
                break;
            }

            interval.tick().await;
            queue.do_work();
        }

        queue.remove_all();
    }
}
