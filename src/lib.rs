// src/lib.rs
// Public library surface for integration tests and the binary.

pub mod api;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod publish;
pub mod runtime;
pub mod shutdown;
pub mod transform;

// Test doubles (publisher/store) shared with integration tests
pub mod testing;

// ---- Re-exports for stable public API ----
pub use crate::config::{OverflowPolicy, RelayConfig};
pub use crate::ingest::types::{ChannelCategory, RawMessage};
pub use crate::runtime::Relay;
pub use crate::transform::{PayloadKind, PublishPayload};
