// src/testing.rs
//! Test doubles shared by unit and integration tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::dedup::{ContentDigest, FingerprintStore};
use crate::error::{DeliveryError, StoreError};
use crate::publish::Publisher;
use crate::transform::PublishPayload;

/// Records every delivery attempt; fails those whose content contains `fail_on`.
#[derive(Default)]
pub struct RecordingPublisher {
    pub attempts: Mutex<Vec<PublishPayload>>,
    pub delivered: Mutex<Vec<PublishPayload>>,
    fail_on: Option<String>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(needle: impl Into<String>) -> Self {
        Self {
            fail_on: Some(needle.into()),
            ..Self::default()
        }
    }

    pub fn delivered_sources(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.fingerprint_source())
            .collect()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Publisher for RecordingPublisher {
    async fn deliver(&self, payload: &PublishPayload) -> Result<(), DeliveryError> {
        self.attempts.lock().unwrap().push(payload.clone());
        if let Some(needle) = &self.fail_on {
            if payload.fingerprint_source().contains(needle.as_str()) {
                return Err(DeliveryError::new(format!("refusing {needle}")));
            }
        }
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Wraps a store and fails the next `n` calls with `Unavailable`, or all calls while `down`.
pub struct FlakyStore<S> {
    inner: S,
    fail_next: AtomicUsize,
    down: AtomicBool,
    pub calls: AtomicUsize,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_next: AtomicUsize::new(0),
            down: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(self, n: usize) -> Self {
        self.fail_next.store(n, Ordering::SeqCst);
        self
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("store is down"));
        }
        let took = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if took.is_ok() {
            return Err(StoreError::unavailable("transient store failure"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: FingerprintStore> FingerprintStore for FlakyStore<S> {
    async fn is_duplicate(&self, digest: &ContentDigest) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.is_duplicate(digest).await
    }

    async fn record(&self, digest: &ContentDigest, channel: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.record(digest, channel).await
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.inner.purge_expired().await
    }
}
