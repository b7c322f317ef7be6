// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification channel transports.
//!
//! The notifier formats messages; transports only deliver them. Each
//! channel family gets one transport implementation, selected through
//! [`ChannelSet`] by the typed channel kind from configuration.

use async_trait::async_trait;
use claw_core::config::ChannelKind;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("no transport registered for channel {0}")]
    UnknownChannel(ChannelKind),
}

/// Rich embed for channels that support structured cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    /// 24-bit RGB severity color.
    pub color: u32,
}

/// A formatted notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    /// Plain text, always present.
    pub text: String,
    /// Structured embed (discord family), present in rich mode.
    pub embed: Option<Embed>,
    /// HTML rendering (telegram family), present in rich mode.
    pub html: Option<String>,
}

impl ChannelMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), embed: None, html: None }
    }
}

/// One notification backend.
#[async_trait]
pub trait ChannelTransport: Send + Sync + 'static {
    async fn send(&self, target: &str, message: &ChannelMessage) -> Result<(), ChannelError>;
}

/// Kind → transport registry handed to the notifier.
#[derive(Clone, Default)]
pub struct ChannelSet {
    transports: HashMap<ChannelKind, Arc<dyn ChannelTransport>>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All production transports.
    pub fn production() -> Self {
        let client = reqwest::Client::new();
        Self::new()
            .with(ChannelKind::Desktop, Arc::new(DesktopTransport::new()))
            .with(ChannelKind::Discord, Arc::new(DiscordTransport::new(client.clone())))
            .with(ChannelKind::Telegram, Arc::new(TelegramTransport::new(client)))
    }

    pub fn with(mut self, kind: ChannelKind, transport: Arc<dyn ChannelTransport>) -> Self {
        self.transports.insert(kind, transport);
        self
    }

    pub async fn send(
        &self,
        kind: ChannelKind,
        target: &str,
        message: &ChannelMessage,
    ) -> Result<(), ChannelError> {
        let transport = self
            .transports
            .get(&kind)
            .ok_or(ChannelError::UnknownChannel(kind))?;
        transport.send(target, message).await
    }
}

/// Desktop notifications via the OS notification center.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopTransport;

impl DesktopTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelTransport for DesktopTransport {
    async fn send(&self, _target: &str, message: &ChannelMessage) -> Result<(), ChannelError> {
        let (summary, body) = match message.text.split_once('\n') {
            Some((first, rest)) => (first.to_string(), rest.to_string()),
            None => ("claw".to_string(), message.text.clone()),
        };
        // Notification::show() is synchronous on some platforms; run it on
        // the blocking pool so the async runtime is never stalled.
        tokio::task::spawn_blocking(move || {
            match notify_rust::Notification::new().summary(&summary).body(&body).show() {
                Ok(_) => tracing::debug!(%summary, "desktop notification sent"),
                Err(e) => tracing::warn!(%summary, error = %e, "desktop notification failed"),
            }
        });
        Ok(())
    }
}

/// Discord webhook transport. `target` is the webhook URL.
#[derive(Clone)]
pub struct DiscordTransport {
    client: reqwest::Client,
}

impl DiscordTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelTransport for DiscordTransport {
    async fn send(&self, target: &str, message: &ChannelMessage) -> Result<(), ChannelError> {
        let payload = match &message.embed {
            Some(embed) => json!({
                "embeds": [{
                    "title": embed.title,
                    "description": embed.description,
                    "color": embed.color,
                }]
            }),
            None => json!({ "content": message.text }),
        };
        let response = self
            .client
            .post(target)
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        response
            .error_for_status()
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

/// Telegram bot transport. `target` is the chat id; the bot token comes
/// from the environment so it never lives in config files.
#[derive(Clone)]
pub struct TelegramTransport {
    client: reqwest::Client,
}

impl TelegramTransport {
    pub const TOKEN_ENV: &'static str = "CLAW_TELEGRAM_TOKEN";

    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelTransport for TelegramTransport {
    async fn send(&self, target: &str, message: &ChannelMessage) -> Result<(), ChannelError> {
        let token = std::env::var(Self::TOKEN_ENV)
            .map_err(|_| ChannelError::SendFailed(format!("{} not set", Self::TOKEN_ENV)))?;
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let payload = match &message.html {
            Some(html) => json!({ "chat_id": target, "text": html, "parse_mode": "HTML" }),
            None => json!({ "chat_id": target, "text": message.text }),
        };
        let response = self
            .client
            .post(&url)
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        response
            .error_for_status()
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;

    /// One delivery recorded by the fake.
    #[derive(Debug, Clone)]
    pub struct SentMessage {
        pub target: String,
        pub message: ChannelMessage,
    }

    #[derive(Default)]
    struct FakeTransportState {
        sent: Vec<SentMessage>,
        fail_targets: Vec<String>,
    }

    /// Recording transport; can be told to fail for specific targets.
    #[derive(Clone, Default)]
    pub struct FakeTransport {
        state: Arc<Mutex<FakeTransportState>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_for(self, target: &str) -> Self {
            self.state.lock().fail_targets.push(target.to_string());
            self
        }

        pub fn sent(&self) -> Vec<SentMessage> {
            self.state.lock().sent.clone()
        }
    }

    #[async_trait]
    impl ChannelTransport for FakeTransport {
        async fn send(&self, target: &str, message: &ChannelMessage) -> Result<(), ChannelError> {
            let mut state = self.state.lock();
            if state.fail_targets.iter().any(|t| t == target) {
                return Err(ChannelError::SendFailed(format!(
                    "scripted failure for {target} at https://hooks.example/secret \
                     token=sk-live-abcdefghijklmnopqrstuvwxyz012345"
                )));
            }
            state.sent.push(SentMessage {
                target: target.to_string(),
                message: message.clone(),
            });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTransport, SentMessage};

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
