// src/ingest/backfill.rs
//! One-shot replay of recent channel history, oldest to newest, channel by channel.

use futures::StreamExt;
use metrics::counter;
use std::sync::Arc;

use super::types::SourceClient;
use super::PipelineController;
use crate::clock::Clock;
use crate::error::HandleError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub channels_scanned: usize,
    pub channels_failed: usize,
    pub messages: usize,
    pub enqueued: usize,
    pub duplicates: usize,
    /// Stopped early because the queue was closed (shutdown).
    pub aborted: bool,
}

pub struct BackfillScanner {
    source: Arc<dyn SourceClient>,
    controller: Arc<PipelineController>,
    clock: Arc<dyn Clock>,
}

impl BackfillScanner {
    pub fn new(
        source: Arc<dyn SourceClient>,
        controller: Arc<PipelineController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            controller,
            clock,
        }
    }

    /// Scan every monitored channel in configured order. A failing channel is
    /// logged and skipped; the scan never aborts on a single channel.
    pub async fn run(&self) -> BackfillReport {
        let cfg = self.controller.config();
        let since = self.clock.now() - cfg.backfill_lookback();
        let channels = cfg.channel_names();
        let pause = cfg.channel_pause();
        let mut report = BackfillReport::default();

        tracing::info!(
            target: "ingest",
            channels = channels.len(),
            since = %since.to_rfc3339(),
            "backfill started"
        );

        for (i, channel) in channels.iter().enumerate() {
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            let mut stream = match self.source.iterate_history(channel, since).await {
                Ok(s) => s,
                Err(e) => {
                    report.channels_failed += 1;
                    counter!("relay_source_errors_total").increment(1);
                    tracing::warn!(target: "ingest", %channel, error = %e, "backfill skipped channel");
                    continue;
                }
            };

            let mut channel_msgs = 0usize;
            let mut channel_failed = false;
            while let Some(item) = stream.next().await {
                let msg = match item {
                    Ok(m) => m,
                    Err(e) => {
                        channel_failed = true;
                        counter!("relay_source_errors_total").increment(1);
                        tracing::warn!(target: "ingest", %channel, error = %e, "backfill stream failed");
                        break;
                    }
                };
                if msg.observed_at < since {
                    continue;
                }
                channel_msgs += 1;
                match self.controller.handle_with_retry(&msg).await {
                    Ok(o) => {
                        report.enqueued += o.enqueued;
                        report.duplicates += o.duplicates + o.race_lost;
                    }
                    Err(HandleError::Queue(e)) => {
                        tracing::info!(target: "ingest", error = %e, "backfill stopped: queue closed");
                        report.messages += channel_msgs;
                        report.aborted = true;
                        return report;
                    }
                    Err(HandleError::Store(e)) => {
                        tracing::error!(
                            target: "ingest",
                            %channel,
                            seq = msg.seq_id,
                            error = %e,
                            "backfill gave up on message"
                        );
                    }
                }
            }

            report.messages += channel_msgs;
            if channel_failed {
                report.channels_failed += 1;
            } else {
                report.channels_scanned += 1;
            }
            tracing::debug!(target: "ingest", %channel, messages = channel_msgs, "backfill channel done");
        }

        tracing::info!(
            target: "ingest",
            scanned = report.channels_scanned,
            failed = report.channels_failed,
            messages = report.messages,
            enqueued = report.enqueued,
            "backfill complete"
        );
        report
    }
}
