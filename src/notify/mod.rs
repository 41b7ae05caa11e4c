// src/notify/mod.rs
//! Outbound notifications: channel trait, per-recipient addresses and the
//! fan-out multiplexer used by the batch jobs.

pub mod email;
pub mod telegram;

use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::config::NotificationSettings;

pub use email::EmailNotifier;
pub use telegram::TelegramNotifier;

/// Channel addresses of one named recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Recipient {
    #[serde(default)]
    pub telegram: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

pub type Recipients = BTreeMap<String, Recipient>;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver `text` to every recipient this channel has an address for.
    async fn send(&self, text: &str, recipients: &Recipients) -> Result<()>;
}

/// Sends one message through every configured channel. Failures are logged,
/// never returned.
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
    recipients: Recipients,
}

impl NotifierMux {
    pub fn new(channels: Vec<Box<dyn Notifier>>, recipients: Recipients) -> Self {
        Self {
            channels,
            recipients,
        }
    }

    pub fn from_settings(cfg: &NotificationSettings) -> Result<Self> {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
        if let Some(token) = cfg.telegram_bot_token.as_deref() {
            let mut tg = TelegramNotifier::new(token.to_string());
            if let Some(api) = cfg.telegram_api.as_deref() {
                tg = tg.with_api_base(api);
            }
            channels.push(Box::new(tg));
        }
        if let Some(smtp) = cfg.smtp.as_ref() {
            channels.push(Box::new(EmailNotifier::new(smtp)?));
        }
        if channels.is_empty() {
            tracing::warn!("no notification channel configured, messages will only be logged");
        }
        Ok(Self::new(channels, cfg.receivers.clone()))
    }

    pub async fn notify(&self, text: &str) {
        tracing::info!(target: "notify", channels = self.channels.len(), "{text}");
        for ch in &self.channels {
            if let Err(e) = ch.send(text, &self.recipients).await {
                tracing::warn!(channel = ch.name(), error = %format!("{e:#}"), "notification failed");
            }
        }
    }
}
