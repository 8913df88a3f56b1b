//! Chat command parsing: `<trigger><command> <args...>`.

use thiserror::Error;

/// A recognized chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// The LLM command with its query text.
    Ask { input: String },
    /// Something after the trigger that is not a known command.
    Unknown { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The LLM command was given without a query.
    #[error("Not enough arguments provided. Usage: {trigger}{command} <query>")]
    NotEnoughArguments { trigger: String, command: String },
}

/// Splits chat messages into commands. Independent of trigger and command
/// name lengths.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    trigger: String,
    bot_name: String,
}

impl CommandRouter {
    pub fn new(trigger: impl Into<String>, bot_name: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            bot_name: bot_name.into().to_lowercase(),
        }
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// `Ok(None)` when `text` is not a command at all.
    ///
    /// The command token runs from the end of the trigger to the first
    /// whitespace and is matched case-insensitively. For the LLM command the
    /// query is everything after exactly one separating space.
    pub fn route(&self, text: &str) -> Result<Option<Command>, CommandError> {
        if self.trigger.is_empty() {
            return Ok(None);
        }
        let Some(rest) = text.strip_prefix(self.trigger.as_str()) else {
            return Ok(None);
        };

        let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let name = rest[..token_end].to_lowercase();
        let after = &rest[token_end..];

        if name != self.bot_name {
            return Ok(Some(Command::Unknown { name }));
        }

        // Drop exactly one separator; the query keeps the rest verbatim.
        let input = after
            .chars()
            .next()
            .map(|sep| &after[sep.len_utf8()..])
            .unwrap_or("");

        if input.trim().is_empty() {
            return Err(CommandError::NotEnoughArguments {
                trigger: self.trigger.clone(),
                command: self.bot_name.clone(),
            });
        }

        Ok(Some(Command::Ask {
            input: input.to_string(),
        }))
    }
}
