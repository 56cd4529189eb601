use std::time::{Duration, SystemTime};

use hermod_common::{Signal, internal};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

use crate::Queue;

/// Drives [`Queue::tick`] on a fixed interval until shutdown
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    queue: Queue,
    interval: Duration,
}

impl RetryScheduler {
    #[must_use]
    pub fn new(queue: Queue, interval: Duration) -> Self {
        Self {
            queue,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Uses the queue's configured scan interval
    #[must_use]
    pub fn from_config(queue: Queue) -> Self {
        let interval = Duration::from_secs(queue.config().scan_interval_secs);
        Self::new(queue, interval)
    }

    /// Run until a shutdown signal arrives or the sender goes away.
    ///
    /// Deliveries already in flight are left to finish on their own; the
    /// store holds everything needed to resume them after a restart.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) {
        internal!(
            level = INFO,
            "Retry scheduler starting, scanning every {:?}",
            self.interval
        );

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // The first tick fires immediately
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let summary = self.queue.tick(SystemTime::now()).await;

                    if summary.dispatched + summary.expired + summary.cleaned > 0 {
                        info!(
                            dispatched = summary.dispatched,
                            expired = summary.expired,
                            resolved = summary.resolved,
                            cleaned = summary.cleaned,
                            "Scheduler pass complete"
                        );
                    } else {
                        debug!(queued = self.queue.len(), "Nothing due");
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) | Err(RecvError::Closed) => {
                            internal!(
                                level = INFO,
                                "Retry scheduler stopping with {} item(s) queued",
                                self.queue.len()
                            );
                            break;
                        }
                        Err(RecvError::Lagged(_)) => {}
                    }
                }
            }
        }
    }
}
