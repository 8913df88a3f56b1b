//! Twitch channel adapter.
//!
//! Wraps a `twitch-irc` client over TLS. `connect` logs in and joins the
//! configured channels; `run` drives the receive loop until the connection
//! is dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use twitch_irc::login::StaticLoginCredentials;
use twitch_irc::message::ServerMessage;
use twitch_irc::{ClientConfig, SecureTCPTransport, TwitchIRCClient};

use ollabot_agent::Bridge;
use ollabot_channels::{Channel, ChannelError, ChannelStatus, OutboundMessage};
use ollabot_core::config::TwitchConfig;

use crate::error::TwitchError;
use crate::handler;
use crate::send;

type IrcClient = TwitchIRCClient<SecureTCPTransport, StaticLoginCredentials>;

/// How long to wait for Twitch to confirm the login.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

pub struct TwitchAdapter {
    config: TwitchConfig,
    client: Option<IrcClient>,
    incoming: Option<UnboundedReceiver<ServerMessage>>,
    status: ChannelStatus,
}

impl TwitchAdapter {
    pub fn new(config: &TwitchConfig) -> Self {
        Self {
            config: config.clone(),
            client: None,
            incoming: None,
            status: ChannelStatus::Disconnected,
        }
    }

    /// Receive loop. Every PRIVMSG is handed to `bridge` on its own task.
    ///
    /// Returns once the IRC client shuts down. Requires a prior `connect`.
    pub async fn run(mut self, bridge: Arc<Bridge>) -> Result<(), TwitchError> {
        let mut incoming = self.incoming.take().ok_or(TwitchError::NotConnected)?;
        let bot_login = self.config.username.to_lowercase();
        let adapter = Arc::new(self);

        info!(channels = ?adapter.config.channels, "Twitch: listening for commands");

        while let Some(message) = incoming.recv().await {
            match message {
                ServerMessage::Privmsg(msg) => {
                    if let Some(inbound) = handler::to_inbound(&msg, &bot_login) {
                        handler::dispatch(Arc::clone(&adapter), Arc::clone(&bridge), inbound);
                    }
                }
                ServerMessage::Notice(notice) => {
                    warn!(channel = ?notice.channel_login, notice = %notice.message_text, "Twitch notice");
                }
                ServerMessage::Reconnect(_) => {
                    info!("Twitch requested a reconnect");
                }
                ServerMessage::Join(join) => {
                    debug!(channel = %join.channel_login, "joined channel");
                }
                _ => {}
            }
        }

        warn!("Twitch: incoming message stream closed");
        Ok(())
    }

    fn join_all(&self, client: &IrcClient) -> Result<(), TwitchError> {
        for channel in &self.config.channels {
            client
                .join(channel.clone())
                .map_err(|e| TwitchError::InvalidChannel {
                    channel: channel.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    async fn greet(&self, client: &IrcClient) {
        let Some(greeting) = self.config.greeting.as_deref() else {
            return;
        };
        for channel in &self.config.channels {
            if let Err(e) = client.say(channel.clone(), greeting.to_string()).await {
                warn!(channel = %channel, error = %e, "failed to send greeting");
            }
        }
    }
}

#[async_trait]
impl Channel for TwitchAdapter {
    fn name(&self) -> &str {
        "twitch"
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        self.status = ChannelStatus::Connecting;

        let credentials = StaticLoginCredentials::new(
            self.config.username.to_lowercase(),
            Some(self.config.token().to_string()),
        );
        let (mut incoming, client) = IrcClient::new(ClientConfig::new_simple(credentials));
        client.connect().await;

        let login = match tokio::time::timeout(LOGIN_TIMEOUT, await_login(&mut incoming)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                ms: LOGIN_TIMEOUT.as_millis() as u64,
            }),
        };
        if let Err(e) = login {
            self.status = ChannelStatus::Error(e.to_string());
            return Err(e);
        }

        if let Err(e) = self.join_all(&client) {
            self.status = ChannelStatus::Error(e.to_string());
            return Err(e.into());
        }
        self.greet(&client).await;

        info!(
            username = %self.config.username,
            channels = ?self.config.channels,
            "Twitch: connected"
        );
        self.client = Some(client);
        self.incoming = Some(incoming);
        self.status = ChannelStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        // Dropping the client closes its connections.
        self.client = None;
        self.incoming = None;
        self.status = ChannelStatus::Disconnected;
        info!("Twitch: disconnected");
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ChannelError::NotConnected(self.name().to_string()))?;

        for chunk in send::prepare(&msg.content) {
            client
                .say(msg.recipient.clone(), chunk)
                .await
                .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.clone()
    }
}

/// Wait for the global user state that Twitch sends after a successful login.
async fn await_login(incoming: &mut UnboundedReceiver<ServerMessage>) -> Result<(), ChannelError> {
    while let Some(message) = incoming.recv().await {
        match message {
            ServerMessage::GlobalUserState(state) => {
                debug!(user_id = %state.user_id, "Twitch login confirmed");
                return Ok(());
            }
            ServerMessage::Notice(notice) if is_auth_failure(&notice.message_text) => {
                return Err(ChannelError::AuthFailed(notice.message_text));
            }
            _ => {}
        }
    }
    Err(ChannelError::ConnectionFailed(
        "connection closed before login completed".to_string(),
    ))
}

fn is_auth_failure(notice: &str) -> bool {
    notice.contains("Login authentication failed") || notice.contains("Improperly formatted auth")
}
