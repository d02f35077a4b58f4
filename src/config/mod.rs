pub mod credentials;
pub mod relay;

pub use credentials::Credentials;
pub use relay::{ChannelAssignment, OverflowPolicy, RelayConfig};
