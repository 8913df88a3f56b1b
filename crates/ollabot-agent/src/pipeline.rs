//! Inbound chat message → optional reply text.

use std::sync::Arc;

use tracing::{info, warn};

use ollabot_core::config::BotConfig;
use ollabot_core::{ContextMode, InboundMessage};

use crate::context::ContextManager;
use crate::router::{Command, CommandRouter};

/// Longest slice of user input copied into failure logs.
const LOG_INPUT_MAX: usize = 80;

/// Glue between the transport and the context manager. Transport-agnostic:
/// it never sends anything itself, it only decides what (if anything) to say.
pub struct Bridge {
    router: CommandRouter,
    context: Arc<ContextManager>,
    mode: ContextMode,
    error_reply: Option<String>,
}

impl Bridge {
    pub fn new(
        router: CommandRouter,
        context: Arc<ContextManager>,
        mode: ContextMode,
        error_reply: Option<String>,
    ) -> Self {
        Self {
            router,
            context,
            mode,
            error_reply,
        }
    }

    pub fn from_config(context: Arc<ContextManager>, config: &BotConfig) -> Self {
        Self::new(
            CommandRouter::new(&config.twitch.trigger, &config.twitch.bot_name),
            context,
            config.ollama.context,
            config.ollama.error_reply.clone(),
        )
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    /// The reply to post for `msg`, or `None` to stay quiet.
    ///
    /// LLM failures are logged and swallowed unless an error reply is
    /// configured.
    pub async fn handle(&self, msg: &InboundMessage) -> Option<String> {
        let command = match self.router.route(&msg.text) {
            Ok(Some(command)) => command,
            Ok(None) => return None,
            Err(usage) => {
                info!(channel = %msg.channel, user = %msg.user_name, command = %self.router.bot_name(), "command without query");
                return Some(usage.to_string());
            }
        };

        match command {
            Command::Unknown { name } => {
                info!(channel = %msg.channel, user = %msg.user_name, command = %name, "unknown command");
                Some(format!("Unknown command: {}{}", self.router.trigger(), name))
            }
            Command::Ask { input } => {
                info!(
                    channel = %msg.channel,
                    user = %msg.user_name,
                    user_id = %msg.user_id,
                    command = %self.router.bot_name(),
                    mode = %self.mode,
                    "command received"
                );
                match self
                    .context
                    .handle_query(self.mode, &msg.channel, &msg.user_id, &input)
                    .await
                {
                    Ok(reply) => Some(reply),
                    Err(e) => {
                        warn!(
                            channel = %msg.channel,
                            user = %msg.user_name,
                            input = %preview(&input),
                            kind = e.kind(),
                            error = %e,
                            "query failed"
                        );
                        self.error_reply.clone()
                    }
                }
            }
        }
    }
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(LOG_INPUT_MAX) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}
