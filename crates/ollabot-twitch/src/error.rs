use ollabot_channels::ChannelError;

/// Errors produced by the Twitch adapter.
#[derive(Debug, thiserror::Error)]
pub enum TwitchError {
    #[error("invalid channel login `{channel}`: {reason}")]
    InvalidChannel { channel: String, reason: String },

    /// `run` was called before `connect`, or twice.
    #[error("adapter is not connected")]
    NotConnected,
}

impl From<TwitchError> for ChannelError {
    fn from(e: TwitchError) -> Self {
        match e {
            TwitchError::NotConnected => ChannelError::NotConnected("twitch".to_string()),
            other => ChannelError::ConnectionFailed(other.to_string()),
        }
    }
}
