// src/publish/mod.rs
//! Output side: the bounded queue, the paced worker draining it, and the
//! `Publisher` seam to the output channel.

pub mod format;
pub mod queue;
pub mod telegram;
pub mod worker;

use crate::error::DeliveryError;
use crate::transform::{PayloadKind, PublishPayload};

/// Output collaborator. One call per task; callers never retry.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn deliver(&self, payload: &PublishPayload) -> Result<(), DeliveryError>;
}

/// Dry-run publisher: logs what would have been sent.
#[derive(Debug, Clone, Default)]
pub struct LogPublisher;

#[async_trait::async_trait]
impl Publisher for LogPublisher {
    async fn deliver(&self, payload: &PublishPayload) -> Result<(), DeliveryError> {
        match &payload.kind {
            PayloadKind::NewsItem { text, media } => tracing::info!(
                target: "publish",
                channel = %payload.channel,
                has_media = media.is_some(),
                chars = text.chars().count(),
                "dry-run news"
            ),
            PayloadKind::ProxyText { config } => tracing::info!(
                target: "publish",
                channel = %payload.channel,
                scheme = config.split("://").next().unwrap_or_default(),
                "dry-run proxy"
            ),
            PayloadKind::ProxyFile { display_name, .. } => tracing::info!(
                target: "publish",
                channel = %payload.channel,
                file = %display_name,
                "dry-run proxy file"
            ),
        }
        Ok(())
    }
}
