// src/error.rs
//! Error kinds shared across the relay pipeline.
//!
//! Only `StoreError::AlreadyExists` is an expected outcome (a lost insert race);
//! everything else is surfaced to the caller's log/retry loop.

use thiserror::Error;

/// Failures of the fingerprint store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The digest is already recorded (concurrent insert of the same content).
    #[error("fingerprint {digest} already recorded")]
    AlreadyExists { digest: String },

    /// The backing store could not be reached or failed mid-operation.
    #[error("fingerprint store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::unavailable(e.to_string())
    }
}

/// The output collaborator failed to deliver a payload.
#[derive(Debug, Error)]
#[error("delivery failed: {reason}")]
pub struct DeliveryError {
    pub reason: String,
}

impl DeliveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        // Request URLs carry the bot token.
        Self::new(e.without_url().to_string())
    }
}

/// A source channel's history or subscription is temporarily failing.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable for {channel}: {reason}")]
    Unavailable { channel: String, reason: String },
}

impl SourceError {
    pub fn unavailable(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

/// The overflow queue no longer accepts tasks (shutdown).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,
}

/// Why the pipeline controller could not finish handling a message.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Failures while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{var} points to non-existent path {path}")]
    MissingPath { var: &'static str, path: String },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
}
