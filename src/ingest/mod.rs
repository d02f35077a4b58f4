// src/ingest/mod.rs
pub mod backfill;
pub mod live;
pub mod providers;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::RelayConfig;
use crate::dedup::{fingerprint, FingerprintStore};
use crate::error::{HandleError, StoreError};
use crate::ingest::types::RawMessage;
use crate::publish::queue::{Admission, OverflowQueue, QueueTask};
use crate::transform::ContentTransform;

/// One-time metrics registration (so series show up on /metrics). Must run
/// after the recorder is installed; descriptions sent to the no-op recorder are lost.
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_messages_total", "Raw messages handed to the pipeline.");
        describe_counter!("relay_candidates_total", "Payload candidates produced by the transform.");
        describe_counter!(
            "relay_short_discarded_total",
            "Candidates dropped below the minimum content length."
        );
        describe_counter!("relay_duplicates_total", "Candidates already recorded in the store.");
        describe_counter!(
            "relay_race_lost_total",
            "Candidates recorded concurrently by another path."
        );
        describe_counter!("relay_enqueued_total", "Publish tasks enqueued.");
        describe_counter!("relay_queue_evicted_total", "Tasks evicted by drop-oldest overflow.");
        describe_counter!("relay_published_total", "Tasks delivered to the output.");
        describe_counter!("relay_delivery_errors_total", "Tasks dropped after a failed delivery.");
        describe_counter!("relay_store_errors_total", "Fingerprint store failures.");
        describe_counter!("relay_source_errors_total", "Source history/subscription failures.");
        describe_gauge!("relay_queue_depth", "Pending tasks in the overflow queue.");
    });
}

/// Per-message accounting returned by [`PipelineController::handle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleOutcome {
    pub candidates: usize,
    pub too_short: usize,
    pub duplicates: usize,
    pub race_lost: usize,
    pub enqueued: usize,
    pub evicted: usize,
    /// Message came from a channel with no category assignment.
    pub unmonitored: bool,
}

/// Transform → fingerprint check → record → enqueue. Shared by backfill and live.
pub struct PipelineController {
    config: Arc<RelayConfig>,
    transform: Arc<dyn ContentTransform>,
    store: Arc<dyn FingerprintStore>,
    queue: Arc<OverflowQueue>,
    clock: Arc<dyn Clock>,
}

impl PipelineController {
    pub fn new(
        config: Arc<RelayConfig>,
        transform: Arc<dyn ContentTransform>,
        store: Arc<dyn FingerprintStore>,
        queue: Arc<OverflowQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            transform,
            store,
            queue,
            clock,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<OverflowQueue> {
        &self.queue
    }

    pub async fn handle(&self, raw: &RawMessage) -> Result<HandleOutcome, HandleError> {
        counter!("relay_messages_total").increment(1);
        let mut out = HandleOutcome::default();

        let Some(category) = self.config.category_of(&raw.channel) else {
            tracing::debug!(target: "ingest", channel = %raw.channel, "message from unmonitored channel");
            out.unmonitored = true;
            return Ok(out);
        };

        let candidates = self.transform.classify(raw, category);
        out.candidates = candidates.len();
        counter!("relay_candidates_total").increment(candidates.len() as u64);

        for payload in candidates {
            if payload
                .content_len()
                .is_some_and(|n| n < self.config.min_content_len)
            {
                out.too_short += 1;
                counter!("relay_short_discarded_total").increment(1);
                continue;
            }

            let digest = fingerprint(&payload);
            if self.store.is_duplicate(&digest).await.inspect_err(store_failed)? {
                out.duplicates += 1;
                counter!("relay_duplicates_total").increment(1);
                tracing::trace!(target: "dedup", %digest, channel = %raw.channel, "duplicate");
                continue;
            }

            match self.store.record(&digest, &raw.channel).await {
                Ok(()) => {}
                Err(StoreError::AlreadyExists { .. }) => {
                    // The other path won the insert race and owns publishing this content.
                    out.race_lost += 1;
                    counter!("relay_race_lost_total").increment(1);
                    tracing::debug!(target: "dedup", %digest, channel = %raw.channel, "record race lost");
                    continue;
                }
                Err(e) => {
                    store_failed(&e);
                    return Err(e.into());
                }
            }

            // Enqueue only after the record is durable.
            let task = QueueTask::new(payload, self.clock.now());
            match self.queue.enqueue(task).await? {
                Admission::Queued => {}
                Admission::EvictedOldest(_) => out.evicted += 1,
            }
            out.enqueued += 1;
            counter!("relay_enqueued_total").increment(1);
            tracing::debug!(target: "ingest", %digest, channel = %raw.channel, seq = raw.seq_id, "enqueued");
        }

        Ok(out)
    }

    /// `handle` with exponential backoff on `StoreError::Unavailable`.
    pub async fn handle_with_retry(&self, raw: &RawMessage) -> Result<HandleOutcome, HandleError> {
        let attempts = self.config.store_retry_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.handle(raw).await {
                Err(HandleError::Store(e)) if attempt < attempts => {
                    let backoff = Duration::from_millis(
                        self.config
                            .store_retry_base_ms
                            .saturating_mul(1u64 << (attempt - 1).min(16)),
                    );
                    tracing::warn!(
                        target: "ingest",
                        channel = %raw.channel,
                        seq = raw.seq_id,
                        attempt,
                        error = %e,
                        ?backoff,
                        "store unavailable, retrying message"
                    );
                    tokio::time::sleep(backoff).await;
                }
                other => return other,
            }
        }
    }
}

fn store_failed(e: &StoreError) {
    counter!("relay_store_errors_total").increment(1);
    tracing::warn!(target: "dedup", error = %e, "fingerprint store call failed");
}
