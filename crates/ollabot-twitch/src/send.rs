//! Outbound text shaping for Twitch chat.
//!
//! IRC has no multi-line messages and Twitch caps a PRIVMSG at 500
//! characters, so replies are flattened to one line and split.

use ollabot_channels::split_chunks;

/// Maximum characters per Twitch chat message.
pub const CHUNK_MAX: usize = 500;

/// Collapse line breaks into single spaces.
pub fn flatten_lines(text: &str) -> String {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The chat messages that carry `text`, in order. Empty for blank text.
pub fn prepare(text: &str) -> Vec<String> {
    split_chunks(&flatten_lines(text), CHUNK_MAX)
}
