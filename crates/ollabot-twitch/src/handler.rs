//! PRIVMSG handling: conversion and per-command dispatch.

use std::sync::Arc;

use tracing::{debug, warn};
use twitch_irc::message::PrivmsgMessage;

use ollabot_agent::Bridge;
use ollabot_channels::{Channel, OutboundMessage};
use ollabot_core::InboundMessage;

/// Convert a Twitch PRIVMSG into the transport-neutral form.
///
/// Returns `None` for messages without a room id (not tied to a real
/// channel) and for the bot's own messages.
pub fn to_inbound(msg: &PrivmsgMessage, bot_login: &str) -> Option<InboundMessage> {
    if msg.channel_id.trim().is_empty() {
        return None;
    }
    if msg.sender.login.eq_ignore_ascii_case(bot_login) {
        return None;
    }

    let mut inbound = InboundMessage::new(
        msg.channel_login.clone(),
        msg.sender.id.clone(),
        msg.sender.login.clone(),
        msg.message_text.clone(),
    );
    inbound.tags = msg
        .source
        .tags
        .0
        .iter()
        .map(|(k, v)| (k.clone(), v.clone().unwrap_or_default()))
        .collect();
    inbound.timestamp = msg.server_timestamp;
    Some(inbound)
}

/// Handle one inbound message on its own task. The receive loop never waits
/// for the LLM.
pub fn dispatch<C>(channel: Arc<C>, bridge: Arc<Bridge>, inbound: InboundMessage)
where
    C: Channel + 'static,
{
    tokio::spawn(async move {
        let Some(reply) = bridge.handle(&inbound).await else {
            return;
        };
        let out = OutboundMessage::new(channel.name(), inbound.channel.clone(), reply);
        match channel.send(&out).await {
            Ok(()) => debug!(channel = %inbound.channel, user = %inbound.user_name, "reply sent"),
            Err(e) => warn!(channel = %inbound.channel, error = %e, "failed to send reply"),
        }
    });
}
