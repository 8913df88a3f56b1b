pub mod channel;
pub mod chunk;
pub mod error;
pub mod types;

pub use channel::Channel;
pub use chunk::split_chunks;
pub use error::ChannelError;
pub use types::{ChannelStatus, OutboundMessage};
