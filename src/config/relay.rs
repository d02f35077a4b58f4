// src/config/relay.rs
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::ingest::types::ChannelCategory;

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

/// What the overflow queue does when it is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Suspend the producer until the worker frees a slot.
    Block,
    /// Evict the oldest pending task to make room for the newest.
    #[default]
    DropOldest,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelAssignment {
    pub name: String,
    pub category: ChannelCategory,
}

fn default_queue_capacity() -> usize {
    100
}
fn default_ttl_secs() -> u64 {
    86_400 * 3
}
fn default_pacing_min_ms() -> u64 {
    2_000
}
fn default_pacing_max_ms() -> u64 {
    5_000
}
fn default_lookback_secs() -> u64 {
    3_600
}
fn default_channel_pause_ms() -> u64 {
    1_500
}
fn default_min_content_len() -> usize {
    30
}
fn default_min_proxy_len() -> usize {
    50
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_sweep_interval_secs() -> u64 {
    600
}
fn default_store_path() -> String {
    "state/fingerprints.db".to_string()
}
fn default_news_signature() -> String {
    "\n\n📡 <b>News Radar</b>".to_string()
}
fn default_proxy_signature() -> String {
    "\n\n🔐 <b>Dedicated config</b>".to_string()
}

/// Immutable relay configuration. Built once at startup and shared via `Arc`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    /// Retention window for recorded fingerprints.
    #[serde(default = "default_ttl_secs")]
    pub fingerprint_ttl_secs: u64,
    #[serde(default = "default_pacing_min_ms")]
    pub pacing_min_ms: u64,
    #[serde(default = "default_pacing_max_ms")]
    pub pacing_max_ms: u64,
    #[serde(default = "default_lookback_secs")]
    pub backfill_lookback_secs: u64,
    /// Pause between channels during backfill.
    #[serde(default = "default_channel_pause_ms")]
    pub channel_pause_ms: u64,
    /// Candidates with fewer characters are dropped before fingerprinting.
    #[serde(default = "default_min_content_len")]
    pub min_content_len: usize,
    /// Extracted proxy configs must be longer than this to count as valid.
    #[serde(default = "default_min_proxy_len")]
    pub min_proxy_len: usize,
    #[serde(default = "default_retry_attempts")]
    pub store_retry_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub store_retry_base_ms: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Start the publish worker before backfill instead of after it.
    #[serde(default)]
    pub drain_during_backfill: bool,
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default)]
    pub channels: Vec<ChannelAssignment>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default = "default_news_signature")]
    pub news_signature: String,
    #[serde(default = "default_proxy_signature")]
    pub proxy_signature: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow_policy: OverflowPolicy::default(),
            fingerprint_ttl_secs: default_ttl_secs(),
            pacing_min_ms: default_pacing_min_ms(),
            pacing_max_ms: default_pacing_max_ms(),
            backfill_lookback_secs: default_lookback_secs(),
            channel_pause_ms: default_channel_pause_ms(),
            min_content_len: default_min_content_len(),
            min_proxy_len: default_min_proxy_len(),
            store_retry_attempts: default_retry_attempts(),
            store_retry_base_ms: default_retry_base_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            drain_during_backfill: false,
            store_path: default_store_path(),
            channels: Vec::new(),
            blacklist: Vec::new(),
            news_signature: default_news_signature(),
            proxy_signature: default_proxy_signature(),
        }
    }
}

impl RelayConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let mut cfg: RelayConfig = toml::from_str(s)?;
        cfg.sanitize();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load config using env var + fallbacks:
    /// 1) $RELAY_CONFIG_PATH
    /// 2) config/relay.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(&p);
            if !pb.exists() {
                return Err(ConfigError::MissingPath {
                    var: ENV_CONFIG_PATH,
                    path: p,
                });
            }
            return Self::load_from(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        Ok(Self::default())
    }

    fn sanitize(&mut self) {
        for ch in &mut self.channels {
            ch.name = ch.name.trim().trim_start_matches('@').to_string();
        }
        self.blacklist.retain(|b| !b.trim().is_empty());
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be >= 1".into()));
        }
        if self.pacing_min_ms > self.pacing_max_ms {
            return Err(ConfigError::Invalid(format!(
                "pacing_min_ms ({}) > pacing_max_ms ({})",
                self.pacing_min_ms, self.pacing_max_ms
            )));
        }
        let mut seen = HashSet::new();
        for ch in &self.channels {
            if ch.name.is_empty() {
                return Err(ConfigError::Invalid("empty channel name".into()));
            }
            if !seen.insert(ch.name.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "channel {} assigned more than once",
                    ch.name
                )));
            }
        }
        Ok(())
    }

    /// Category of a monitored channel (case-insensitive), `None` if unmonitored.
    pub fn category_of(&self, channel: &str) -> Option<ChannelCategory> {
        let channel = channel.trim_start_matches('@');
        self.channels
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(channel))
            .map(|c| c.category)
    }

    /// Monitored channels in configured order.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn fingerprint_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.fingerprint_ttl_secs).unwrap_or(i64::MAX))
    }

    pub fn backfill_lookback(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.backfill_lookback_secs).unwrap_or(i64::MAX))
    }

    pub fn channel_pause(&self) -> Duration {
        Duration::from_millis(self.channel_pause_ms)
    }

    /// The worker must drain concurrently when producers can block on a full queue.
    pub fn worker_starts_before_backfill(&self) -> bool {
        self.drain_during_backfill || self.overflow_policy == OverflowPolicy::Block
    }
}
