use async_trait::async_trait;

use crate::{
    error::ChannelError,
    types::{ChannelStatus, OutboundMessage},
};

/// Common interface implemented by every chat transport adapter.
///
/// Implementations must be `Send + Sync` so a connected adapter can be shared
/// with the per-command tasks that deliver replies.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier (e.g. `"twitch"`).
    fn name(&self) -> &str;

    /// Log in and join the configured rooms.
    ///
    /// On success the adapter reports [`ChannelStatus::Connected`].
    async fn connect(&mut self) -> Result<(), ChannelError>;

    async fn disconnect(&mut self) -> Result<(), ChannelError>;

    /// Deliver one outbound message, splitting it if the platform requires.
    ///
    /// Takes `&self` so replies can be sent concurrently.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;

    fn status(&self) -> ChannelStatus;
}
