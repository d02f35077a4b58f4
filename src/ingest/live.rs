// src/ingest/live.rs
//! Persistent subscription to new messages, funneled through the same
//! controller path as backfill.

use futures::StreamExt;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::types::{MessageStream, SourceClient};
use super::PipelineController;
use crate::error::{HandleError, SourceError};
use crate::shutdown;

const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveStats {
    pub messages: u64,
    pub enqueued: u64,
    pub errors: u64,
    pub resubscribes: u64,
}

pub struct LiveListener {
    source: Arc<dyn SourceClient>,
    controller: Arc<PipelineController>,
}

impl LiveListener {
    pub fn new(source: Arc<dyn SourceClient>, controller: Arc<PipelineController>) -> Self {
        Self { source, controller }
    }

    /// Open the subscription. Called before backfill starts so nothing falls
    /// between the history window and the live feed.
    pub async fn subscribe(&self) -> Result<MessageStream, SourceError> {
        let channels = self.controller.config().channel_names();
        self.source.subscribe(&channels).await
    }

    /// Consume `stream` until shutdown. Per-event failures are logged; a
    /// stream that ends is reopened.
    pub async fn run(self, mut stream: MessageStream, mut shutdown: watch::Receiver<bool>) -> LiveStats {
        let mut stats = LiveStats::default();
        tracing::info!(target: "ingest", source = self.source.name(), "live listener started");

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown::signalled(&mut shutdown) => break,
                n = stream.next() => n,
            };

            match next {
                Some(Ok(msg)) => {
                    stats.messages += 1;
                    match self.controller.handle_with_retry(&msg).await {
                        Ok(o) => stats.enqueued += o.enqueued as u64,
                        Err(HandleError::Queue(_)) => {
                            tracing::info!(target: "ingest", "live listener stopped: queue closed");
                            break;
                        }
                        Err(HandleError::Store(e)) => {
                            stats.errors += 1;
                            tracing::error!(
                                target: "ingest",
                                channel = %msg.channel,
                                seq = msg.seq_id,
                                error = %e,
                                "live handler gave up on message"
                            );
                        }
                    }
                }
                Some(Err(e)) => {
                    stats.errors += 1;
                    counter!("relay_source_errors_total").increment(1);
                    tracing::warn!(target: "ingest", error = %e, "live event failed");
                }
                None => {
                    tracing::warn!(target: "ingest", "live subscription ended, reopening");
                    match self.reopen(&mut shutdown).await {
                        Some(s) => {
                            stream = s;
                            stats.resubscribes += 1;
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::info!(
            target: "ingest",
            messages = stats.messages,
            enqueued = stats.enqueued,
            "live listener stopped"
        );
        stats
    }

    /// Retry `subscribe` with a fixed backoff until it succeeds or shutdown.
    async fn reopen(&self, shutdown: &mut watch::Receiver<bool>) -> Option<MessageStream> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown::signalled(shutdown) => return None,
                _ = tokio::time::sleep(RESUBSCRIBE_BACKOFF) => {}
            }
            match self.subscribe().await {
                Ok(s) => return Some(s),
                Err(e) => {
                    counter!("relay_source_errors_total").increment(1);
                    tracing::warn!(target: "ingest", error = %e, "resubscribe failed");
                }
            }
        }
    }
}
