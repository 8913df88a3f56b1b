use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required setting `{key}` (env {env})")]
    MissingSetting { key: &'static str, env: &'static str },
}

impl BotError {
    /// Short error code string used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            BotError::Config(_) => "CONFIG_ERROR",
            BotError::MissingSetting { .. } => "MISSING_SETTING",
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
