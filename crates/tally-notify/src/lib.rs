// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fire-and-forget push notifications over the Telegram bot API shape.
//!
//! Notification failures are logged and swallowed; nothing here may ever
//! block or fail the credit/AI flow. Message formatting is deliberately
//! plain text -- rich formatting belongs to the receiving bot.

use std::sync::Arc;

use tally_config::model::NotifyConfig;
use tracing::{debug, warn};

/// Push-notification sender. Construct once and share via `Arc`.
pub struct Notifier {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    /// Build a notifier when both token and chat id are configured;
    /// `None` disables notifications entirely.
    pub fn from_config(config: &NotifyConfig) -> Option<Self> {
        let bot_token = config.bot_token.clone().filter(|t| !t.is_empty())?;
        let chat_id = config.chat_id.clone().filter(|c| !c.is_empty())?;
        Some(Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }

    /// Send a message and report the outcome. Used directly in tests;
    /// production callers go through [`Notifier::notify`].
    pub async fn send(&self, text: &str) -> Result<(), String> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("notification request failed: {e}"))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("notification returned {}", response.status()))
        }
    }

    /// Fire-and-forget send: spawns the request and logs the outcome.
    pub fn notify(self: &Arc<Self>, text: String) {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            match notifier.send(&text).await {
                Ok(()) => debug!("notification delivered"),
                Err(reason) => warn!(reason, "notification failed (ignored)"),
            }
        });
    }
}
