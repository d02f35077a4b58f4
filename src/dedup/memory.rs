// src/dedup/memory.rs
//! Process-local fingerprint store. Same semantics as the SQLite store, no persistence.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{ContentDigest, Fingerprint, FingerprintStore};
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

pub struct MemoryFingerprintStore {
    inner: Mutex<HashMap<ContentDigest, Fingerprint>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryFingerprintStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<ContentDigest, Fingerprint>>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::unavailable("fingerprint mutex poisoned"))
    }
}

#[async_trait::async_trait]
impl FingerprintStore for MemoryFingerprintStore {
    async fn is_duplicate(&self, digest: &ContentDigest) -> Result<bool, StoreError> {
        let cutoff = self.clock.now() - self.ttl;
        let map = self.lock()?;
        Ok(map.get(digest).is_some_and(|fp| fp.created_at > cutoff))
    }

    async fn record(&self, digest: &ContentDigest, channel: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        let cutoff = now - self.ttl;
        let mut map = self.lock()?;
        if map.get(digest).is_some_and(|fp| fp.created_at > cutoff) {
            return Err(StoreError::AlreadyExists {
                digest: digest.to_string(),
            });
        }
        map.insert(
            digest.clone(),
            Fingerprint {
                digest: digest.clone(),
                source_channel: channel.to_string(),
                created_at: now,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let cutoff = self.clock.now() - self.ttl;
        let mut map = self.lock()?;
        let before = map.len();
        map.retain(|_, fp| fp.created_at > cutoff);
        Ok(before - map.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dedup::digest_text;
    use chrono::{TimeZone, Utc};

    fn store() -> (MemoryFingerprintStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ));
        (
            MemoryFingerprintStore::with_clock(Duration::seconds(259_200), clock.clone()),
            clock,
        )
    }

    #[tokio::test]
    async fn second_record_is_already_exists() {
        let (s, _) = store();
        let d = digest_text("hello world");
        s.record(&d, "a").await.unwrap();
        let err = s.record(&d, "b").await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn expired_entry_can_be_recorded_again() {
        let (s, clock) = store();
        let d = digest_text("hello world");
        s.record(&d, "a").await.unwrap();
        clock.advance(Duration::seconds(259_201));
        assert!(!s.is_duplicate(&d).await.unwrap());
        s.record(&d, "a").await.unwrap();
        assert!(s.is_duplicate(&d).await.unwrap());
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let (s, clock) = store();
        s.record(&digest_text("old"), "a").await.unwrap();
        clock.advance(Duration::seconds(200_000));
        s.record(&digest_text("new"), "a").await.unwrap();
        clock.advance(Duration::seconds(100_000));
        assert_eq!(s.purge_expired().await.unwrap(), 1);
        assert_eq!(s.len(), 1);
    }
}
