// src/publish/worker.rs
//! Single consumer of the overflow queue. Dequeue, deliver once, pause, repeat.

use metrics::counter;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::queue::OverflowQueue;
use super::Publisher;
use crate::config::RelayConfig;
use crate::shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Dequeuing,
    Publishing,
    Pausing,
    Stopped,
}

/// Randomized pause range between publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn from_config(cfg: &RelayConfig) -> Self {
        Self::new(
            Duration::from_millis(cfg.pacing_min_ms),
            Duration::from_millis(cfg.pacing_max_ms),
        )
    }

    pub fn next_pause(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let ms = rand::rng().random_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub published: u64,
    pub failed: u64,
}

pub struct PublishWorker {
    queue: Arc<OverflowQueue>,
    publisher: Arc<dyn Publisher>,
    pacing: Pacing,
    state: watch::Sender<WorkerState>,
}

impl PublishWorker {
    pub fn new(queue: Arc<OverflowQueue>, publisher: Arc<dyn Publisher>, pacing: Pacing) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            queue,
            publisher,
            pacing,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn set_state(&self, s: WorkerState) {
        self.state.send_replace(s);
        tracing::trace!(target: "publish", state = ?s, "worker state");
    }

    /// Runs until shutdown is signalled or the queue is closed and drained.
    /// A publish in progress is always allowed to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        tracing::info!(target: "publish", "worker started processing queue");

        loop {
            self.set_state(WorkerState::Dequeuing);
            let task = tokio::select! {
                biased;
                _ = shutdown::signalled(&mut shutdown) => break,
                t = self.queue.dequeue() => match t {
                    Some(t) => t,
                    None => break,
                },
            };

            self.set_state(WorkerState::Publishing);
            let payload = &task.payload;
            match self.publisher.deliver(payload).await {
                Ok(()) => {
                    stats.published += 1;
                    counter!("relay_published_total").increment(1);
                    tracing::info!(
                        target: "publish",
                        channel = %payload.channel,
                        kind = payload.kind_label(),
                        "published"
                    );
                }
                Err(e) => {
                    // At most one attempt: the task is dropped, never re-enqueued.
                    stats.failed += 1;
                    counter!("relay_delivery_errors_total").increment(1);
                    tracing::error!(
                        target: "publish",
                        channel = %payload.channel,
                        kind = payload.kind_label(),
                        error = %e,
                        "publish failed, task dropped"
                    );
                }
            }

            let pause = self.pacing.next_pause();
            if !pause.is_zero() {
                self.set_state(WorkerState::Pausing);
                tokio::select! {
                    biased;
                    _ = shutdown::signalled(&mut shutdown) => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
            self.set_state(WorkerState::Idle);
        }

        self.set_state(WorkerState::Stopped);
        tracing::info!(
            target: "publish",
            published = stats.published,
            failed = stats.failed,
            "worker stopped"
        );
        stats
    }
}
