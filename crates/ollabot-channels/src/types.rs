use serde::{Deserialize, Serialize};

/// A reply to be delivered to a chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Logical channel name (e.g. "twitch").
    pub channel: String,

    /// Platform-native target (for Twitch: the channel login).
    pub recipient: String,

    pub content: String,
}

impl OutboundMessage {
    pub fn new(
        channel: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            recipient: recipient.into(),
            content: content.into(),
        }
    }
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}
