//! Discord bot notifier.
//!
//! Posts plain-text messages through the Discord REST API
//! `POST /channels/{channel_id}/messages` endpoint, authenticated as a bot.

use std::time::Duration;

use radar_core::config::DiscordConfig;

use crate::traits::{Notification, Notifier, NotifyError};

/// Discord rejects message content longer than this many characters.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Sends notifications to Discord text channels.
#[derive(Debug)]
pub struct DiscordNotifier {
    api_base: String,
    bot_token: String,
    client: reqwest::Client,
}

impl DiscordNotifier {
    /// Creates a notifier for the given API base URL and bot token.
    ///
    /// Returns [`NotifyError::Config`] if the token is empty.
    pub fn new(api_base: impl Into<String>, bot_token: impl Into<String>) -> Result<Self, NotifyError> {
        let bot_token = bot_token.into();
        if bot_token.trim().is_empty() {
            return Err(NotifyError::Config(
                "Discord bot token must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token,
            client,
        })
    }

    pub fn from_config(config: &DiscordConfig) -> Result<Self, NotifyError> {
        let token = config
            .bot_token
            .clone()
            .ok_or_else(|| NotifyError::Config("DISCORD_BOT_TOKEN is not set".to_string()))?;
        Self::new(config.api_base.clone(), token)
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/messages", self.api_base, channel_id)
    }
}

/// Cut `text` to at most [`MAX_CONTENT_CHARS`] characters.
fn truncate_content(text: &str) -> &str {
    match text.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, destination: &str, notification: &Notification) -> Result<(), NotifyError> {
        let channel_id = destination.trim();
        if channel_id.is_empty() {
            return Err(NotifyError::Config("Discord channel id must not be empty".to_string()));
        }

        let body = serde_json::json!({
            "content": truncate_content(&notification.body),
        });

        tracing::debug!(channel_id, "Sending Discord notification");

        let response = self
            .client
            .post(self.messages_url(channel_id))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.bot_token))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(channel_id, "Discord notification sent");
            return Ok(());
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let header_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok());
            let body_secs = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|b| b.get("retry_after").and_then(|v| v.as_f64()));
            let retry_after = body_secs.or(header_secs).unwrap_or(1.0);
            return Err(NotifyError::RateLimited {
                retry_after_secs: retry_after.max(0.0).ceil() as u64,
            });
        }

        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        tracing::warn!(channel_id, %status, body = %body_text, "Discord rejected message");
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body: body_text,
        })
    }

    fn channel_name(&self) -> &str {
        "discord"
    }
}
