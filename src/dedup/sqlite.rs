// src/dedup/sqlite.rs
//! SQLite-backed fingerprint store. `digest` is the primary key, so the
//! database arbitrates concurrent inserts of the same content.

use chrono::Duration;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{ContentDigest, FingerprintStore};
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Clone)]
pub struct SqliteFingerprintStore {
    conn: Arc<Mutex<Connection>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SqliteFingerprintStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteFingerprintStore")
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl SqliteFingerprintStore {
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, StoreError> {
        Self::open_with_clock(path, ttl, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        path: impl AsRef<Path>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::unavailable(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, ttl, clock)
    }

    pub fn open_in_memory(ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, ttl, clock)
    }

    fn from_connection(conn: Connection, ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl,
            clock,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::unavailable("sqlite mutex poisoned"))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS fingerprints (
                digest TEXT PRIMARY KEY,
                source_channel TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_fingerprints_created_at
            ON fingerprints(created_at);
            "#,
        )?;
        Ok(())
    }

    /// Unix millis before which entries are expired.
    fn cutoff_ms(&self) -> i64 {
        (self.clock.now() - self.ttl).timestamp_millis()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::unavailable("sqlite mutex poisoned"))?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::unavailable(format!("sqlite task failed: {e}")))?
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

#[async_trait::async_trait]
impl FingerprintStore for SqliteFingerprintStore {
    async fn is_duplicate(&self, digest: &ContentDigest) -> Result<bool, StoreError> {
        let cutoff = self.cutoff_ms();
        let digest = digest.as_str().to_string();
        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM fingerprints WHERE digest = ?1 AND created_at > ?2",
                    params![digest, cutoff],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn record(&self, digest: &ContentDigest, channel: &str) -> Result<(), StoreError> {
        let now_ms = self.clock.now().timestamp_millis();
        let cutoff = self.cutoff_ms();
        let digest = digest.as_str().to_string();
        let channel = channel.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            // An expired row that the sweeper has not reached yet must not block a fresh insert.
            tx.execute(
                "DELETE FROM fingerprints WHERE digest = ?1 AND created_at <= ?2",
                params![digest, cutoff],
            )?;
            match tx.execute(
                "INSERT INTO fingerprints (digest, source_channel, created_at) VALUES (?1, ?2, ?3)",
                params![digest, channel, now_ms],
            ) {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(StoreError::AlreadyExists { digest });
                }
                Err(e) => return Err(e.into()),
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let cutoff = self.cutoff_ms();
        self.with_conn(move |conn| {
            let n = conn.execute(
                "DELETE FROM fingerprints WHERE created_at <= ?1",
                params![cutoff],
            )?;
            Ok(n)
        })
        .await
    }
}
