// src/dedup/mod.rs
//! Content fingerprints and the persistent, TTL-bounded store that remembers
//! which fingerprints were already published.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::shutdown;
use crate::transform::PublishPayload;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Hex-encoded SHA-256 of normalized content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recorded fingerprint. `source_channel` is diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub digest: ContentDigest,
    pub source_channel: String,
    pub created_at: DateTime<Utc>,
}

/// Case-fold and drop all whitespace.
pub fn normalize_for_digest(s: &str) -> String {
    RE_WS.replace_all(&s.trim().to_lowercase(), "").into_owned()
}

pub fn digest_text(s: &str) -> ContentDigest {
    let normalized = normalize_for_digest(s);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    ContentDigest(out)
}

/// Channel-independent digest of a payload's content.
pub fn fingerprint(payload: &PublishPayload) -> ContentDigest {
    digest_text(&payload.fingerprint_source())
}

/// Persistent duplicate-detection store.
///
/// Implementations enforce digest uniqueness across live entries so that a
/// concurrent `record` of the same digest yields exactly one `Ok`.
#[async_trait::async_trait]
pub trait FingerprintStore: Send + Sync {
    /// True iff a non-expired fingerprint with this digest exists.
    async fn is_duplicate(&self, digest: &ContentDigest) -> Result<bool, StoreError>;

    /// Atomically insert; `AlreadyExists` when a live entry already holds the digest.
    async fn record(&self, digest: &ContentDigest, channel: &str) -> Result<(), StoreError>;

    /// Physically drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

/// Periodically purge expired fingerprints until shutdown.
pub fn spawn_sweeper(
    store: Arc<dyn FingerprintStore>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown::signalled(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(target: "dedup", removed = n, "expired fingerprints purged"),
                Err(e) => tracing::warn!(target: "dedup", error = %e, "fingerprint sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_whitespace_do_not_change_digest() {
        let a = digest_text("Breaking:  Markets\n RALLY today");
        let b = digest_text("  breaking: markets rally\ttoday ");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn different_content_differs() {
        assert_ne!(digest_text("one"), digest_text("two"));
    }

    #[test]
    fn payload_digest_ignores_channel() {
        let p1 = PublishPayload::news("BBCPersian", "Same Story", None);
        let p2 = PublishPayload::news("RadioFarda", "same   story", None);
        assert_eq!(fingerprint(&p1), fingerprint(&p2));
    }
}
