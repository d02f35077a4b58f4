// src/runtime.rs
//! Wires source, controller, queue, worker and store into one running relay.
//!
//! Startup order: open the live subscription, start the listener, run the
//! backfill, then let the worker drain (or drain from the start when the
//! queue blocks on full).

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::clock::Clock;
use crate::config::RelayConfig;
use crate::dedup::{spawn_sweeper, FingerprintStore};
use crate::error::SourceError;
use crate::ingest::backfill::{BackfillReport, BackfillScanner};
use crate::ingest::live::{LiveListener, LiveStats};
use crate::ingest::types::SourceClient;
use crate::ingest::PipelineController;
use crate::publish::queue::OverflowQueue;
use crate::publish::worker::{Pacing, PublishWorker, WorkerState, WorkerStats};
use crate::publish::Publisher;
use crate::shutdown;
use crate::transform::ContentTransform;

/// Read-only view of a running relay, shared with the status endpoint.
#[derive(Clone)]
pub struct RelayStatus {
    queue: Arc<OverflowQueue>,
    worker_state: watch::Receiver<WorkerState>,
    backfill_done: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub worker_state: WorkerState,
    pub backfill_done: bool,
}

impl RelayStatus {
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            queue_depth: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            worker_state: *self.worker_state.borrow(),
            backfill_done: self.backfill_done.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub backfill: BackfillReport,
    pub live: LiveStats,
    pub worker: WorkerStats,
}

pub struct Relay {
    config: Arc<RelayConfig>,
    source: Arc<dyn SourceClient>,
    store: Arc<dyn FingerprintStore>,
    clock: Arc<dyn Clock>,
    controller: Arc<PipelineController>,
    queue: Arc<OverflowQueue>,
    worker: PublishWorker,
    backfill_done: Arc<AtomicBool>,
}

impl Relay {
    pub fn new(
        config: Arc<RelayConfig>,
        source: Arc<dyn SourceClient>,
        transform: Arc<dyn ContentTransform>,
        store: Arc<dyn FingerprintStore>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queue = Arc::new(OverflowQueue::new(
            config.queue_capacity,
            config.overflow_policy,
        ));
        let controller = Arc::new(PipelineController::new(
            config.clone(),
            transform,
            store.clone(),
            queue.clone(),
            clock.clone(),
        ));
        let worker = PublishWorker::new(queue.clone(), publisher, Pacing::from_config(&config));
        Self {
            config,
            source,
            store,
            clock,
            controller,
            queue,
            worker,
            backfill_done: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            queue: self.queue.clone(),
            worker_state: self.worker.state(),
            backfill_done: self.backfill_done.clone(),
        }
    }

    pub fn queue(&self) -> Arc<OverflowQueue> {
        self.queue.clone()
    }

    /// Run until `shutdown` flips. Fails only if the initial subscription
    /// cannot be opened.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<RunSummary, SourceError> {
        let Relay {
            config,
            source,
            store,
            clock,
            controller,
            queue,
            worker,
            backfill_done,
        } = self;

        let listener = LiveListener::new(source.clone(), controller.clone());
        let stream = listener.subscribe().await?;
        let live = tokio::spawn(listener.run(stream, shutdown.clone()));

        let sweeper = spawn_sweeper(
            store,
            std::time::Duration::from_secs(config.sweep_interval_secs),
            shutdown.clone(),
        );

        let mut worker = Some(worker);
        let mut worker_handle = None;
        if config.worker_starts_before_backfill() {
            if let Some(w) = worker.take() {
                worker_handle = Some(tokio::spawn(w.run(shutdown.clone())));
            }
        }

        let scanner = BackfillScanner::new(source, controller, clock);
        let backfill = tokio::select! {
            biased;
            _ = shutdown::signalled(&mut shutdown) => BackfillReport { aborted: true, ..Default::default() },
            r = scanner.run() => r,
        };
        backfill_done.store(true, Ordering::SeqCst);
        tracing::info!(target: "ingest", "backfill complete, switching to real-time monitor");

        if let Some(w) = worker.take() {
            worker_handle = Some(tokio::spawn(w.run(shutdown.clone())));
        }

        shutdown::signalled(&mut shutdown).await;
        tracing::info!("shutdown requested");
        queue.close();

        let live = live.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "live listener task failed");
            LiveStats::default()
        });
        let worker = match worker_handle {
            Some(h) => h.await.unwrap_or_else(|e| {
                tracing::error!(error = %e, "publish worker task failed");
                WorkerStats::default()
            }),
            None => WorkerStats::default(),
        };
        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "sweeper task failed");
        }

        Ok(RunSummary {
            backfill,
            live,
            worker,
        })
    }
}
