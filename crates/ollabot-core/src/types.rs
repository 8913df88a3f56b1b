use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Granularity at which conversation history is retained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ContextMode {
    /// Every request is stateless.
    #[default]
    None,
    /// One history shared by every user in every channel.
    General,
    /// One history per user identity.
    User,
}

impl ContextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMode::None => "none",
            ContextMode::General => "general",
            ContextMode::User => "user",
        }
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // An empty env var means "not set".
            "" | "none" => Ok(ContextMode::None),
            "general" => Ok(ContextMode::General),
            "user" => Ok(ContextMode::User),
            other => Err(format!(
                "invalid context mode `{other}` (expected none, general or user)"
            )),
        }
    }
}

impl TryFrom<String> for ContextMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A chat message received from the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel the message was posted in (Twitch channel login).
    pub channel: String,

    /// Stable platform identifier of the sender.
    pub user_id: String,

    /// Login / display name of the sender.
    pub user_name: String,

    /// Plain text content.
    pub text: String,

    /// Raw IRCv3 tags attached to the message.
    #[serde(default)]
    pub tags: HashMap<String, String>,

    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            text: text.into(),
            tags: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}
