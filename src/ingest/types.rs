// src/ingest/types.rs
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Deserialize;

use crate::error::SourceError;

/// Static per-channel category; a channel belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCategory {
    News,
    Proxy,
}

/// Opaque media handle the output side understands (file id or URL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef(pub String);

/// A document attached to a source message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub id: String,
    pub file_name: String,
    pub size: Option<u64>,
}

/// One item observed on a monitored channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub channel: String,
    /// May be empty (media-only posts).
    pub text: String,
    pub media: Option<MediaRef>,
    pub document: Option<FileRef>,
    pub seq_id: i64,
    pub observed_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn text(channel: impl Into<String>, seq_id: i64, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            media: None,
            document: None,
            seq_id,
            observed_at: Utc::now(),
        }
    }

    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_document(mut self, doc: FileRef) -> Self {
        self.document = Some(doc);
        self
    }

    pub fn observed_at(mut self, ts: DateTime<Utc>) -> Self {
        self.observed_at = ts;
        self
    }
}

pub type MessageStream = BoxStream<'static, Result<RawMessage, SourceError>>;

/// Source-feed collaborator.
#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    /// Finite, oldest-first history of `channel` since `since`.
    async fn iterate_history(
        &self,
        channel: &str,
        since: DateTime<Utc>,
    ) -> Result<MessageStream, SourceError>;

    /// Infinite push-driven stream of new messages on `channels`.
    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream, SourceError>;

    fn name(&self) -> &'static str;
}
