// src/transform/mod.rs
//! Content transform seam: turns a raw channel message into zero or more
//! publishable payloads.

pub mod rules;

use crate::ingest::types::{ChannelCategory, FileRef, MediaRef, RawMessage};

/// What will be published, as a closed set of variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadKind {
    NewsItem {
        text: String,
        media: Option<MediaRef>,
    },
    ProxyText {
        config: String,
    },
    ProxyFile {
        file: FileRef,
        display_name: String,
    },
}

/// Normalized result of content transformation plus its originating channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPayload {
    pub channel: String,
    pub kind: PayloadKind,
}

impl PublishPayload {
    pub fn news(channel: impl Into<String>, text: impl Into<String>, media: Option<MediaRef>) -> Self {
        Self {
            channel: channel.into(),
            kind: PayloadKind::NewsItem {
                text: text.into(),
                media,
            },
        }
    }

    pub fn proxy_text(channel: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            kind: PayloadKind::ProxyText {
                config: config.into(),
            },
        }
    }

    pub fn proxy_file(channel: impl Into<String>, file: FileRef) -> Self {
        let display_name = file.file_name.clone();
        Self {
            channel: channel.into(),
            kind: PayloadKind::ProxyFile { file, display_name },
        }
    }

    /// Character count used by the minimum-length gate. Files have no text and are exempt.
    pub fn content_len(&self) -> Option<usize> {
        match &self.kind {
            PayloadKind::NewsItem { text, .. } => Some(text.trim().chars().count()),
            PayloadKind::ProxyText { config } => Some(config.trim().chars().count()),
            PayloadKind::ProxyFile { .. } => None,
        }
    }

    /// The content the fingerprint is derived from.
    pub fn fingerprint_source(&self) -> String {
        match &self.kind {
            PayloadKind::NewsItem { text, .. } => text.clone(),
            PayloadKind::ProxyText { config } => config.clone(),
            PayloadKind::ProxyFile { file, display_name } => {
                format!("file:{}:{}", display_name, file.size.unwrap_or(0))
            }
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            PayloadKind::NewsItem { .. } => "news",
            PayloadKind::ProxyText { .. } => "proxy",
            PayloadKind::ProxyFile { .. } => "proxy_file",
        }
    }
}

/// Content-transform collaborator.
pub trait ContentTransform: Send + Sync {
    fn classify(&self, raw: &RawMessage, category: ChannelCategory) -> Vec<PublishPayload>;
}
