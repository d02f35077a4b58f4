// src/ingest/providers/replay.rs
//! In-memory source: canned history per channel plus a live feed driven
//! through an mpsc sender. Used by tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::SourceError;
use crate::ingest::types::{MessageStream, RawMessage, SourceClient};

pub struct ReplaySource {
    history: HashMap<String, Vec<RawMessage>>,
    failing: HashSet<String>,
    live_tx: mpsc::UnboundedSender<RawMessage>,
    live_rx: Mutex<Option<mpsc::UnboundedReceiver<RawMessage>>>,
}

impl Default for ReplaySource {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplaySource {
    pub fn new() -> Self {
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        Self {
            history: HashMap::new(),
            failing: HashSet::new(),
            live_tx,
            live_rx: Mutex::new(Some(live_rx)),
        }
    }

    /// Add history messages; they are keyed by each message's channel.
    pub fn with_history(mut self, msgs: impl IntoIterator<Item = RawMessage>) -> Self {
        for m in msgs {
            self.history
                .entry(m.channel.to_ascii_lowercase())
                .or_default()
                .push(m);
        }
        self
    }

    /// History for `channel` reports `SourceError::Unavailable`.
    pub fn failing_channel(mut self, channel: &str) -> Self {
        self.failing.insert(channel.to_ascii_lowercase());
        self
    }

    /// Push messages into the live subscription.
    pub fn live_sender(&self) -> mpsc::UnboundedSender<RawMessage> {
        self.live_tx.clone()
    }
}

#[async_trait]
impl SourceClient for ReplaySource {
    async fn iterate_history(
        &self,
        channel: &str,
        since: DateTime<Utc>,
    ) -> Result<MessageStream, SourceError> {
        let key = channel.to_ascii_lowercase();
        if self.failing.contains(&key) {
            return Err(SourceError::unavailable(channel, "replay channel marked failing"));
        }
        let mut msgs: Vec<RawMessage> = self
            .history
            .get(&key)
            .map(|v| v.iter().filter(|m| m.observed_at >= since).cloned().collect())
            .unwrap_or_default();
        msgs.sort_by_key(|m| (m.observed_at, m.seq_id));
        Ok(stream::iter(msgs.into_iter().map(Ok)).boxed())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream, SourceError> {
        let rx = self
            .live_rx
            .lock()
            .map_err(|_| SourceError::unavailable("replay", "live feed mutex poisoned"))?
            .take()
            .ok_or_else(|| SourceError::unavailable("replay", "live feed already subscribed"))?;
        let wanted: HashSet<String> = channels.iter().map(|c| c.to_ascii_lowercase()).collect();
        let s = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|m| (m, rx)) })
            .filter(move |m| {
                let keep = wanted.contains(&m.channel.to_ascii_lowercase());
                async move { keep }
            })
            .map(Ok);
        Ok(s.boxed())
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
