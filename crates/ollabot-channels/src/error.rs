use thiserror::Error;

/// Errors raised by a chat transport adapter.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The connection to the chat server could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The server rejected the bot's credentials.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// A message could not be delivered.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The adapter was asked to send before `connect` succeeded.
    #[error("Channel `{0}` is not connected")]
    NotConnected(String),

    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl ChannelError {
    /// Errors that mean the bot can never come up with the current settings.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChannelError::AuthFailed(_))
    }
}
