//! Discord REST: posting channel messages.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::chat::ChatSink;
use crate::models::ChannelId;

use super::API_BASE;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Discord rejects longer message bodies.
const MAX_MESSAGE_CHARS: usize = 2000;
const MAX_ATTEMPTS: u32 = 3;

/// Body of a 429 response.
#[derive(Debug, Deserialize)]
struct RateLimited {
    /// Seconds to wait
    retry_after: f64,
}

/// Sends messages as the bot user.
pub struct DiscordRest {
    client: Client,
    token: String,
    base_url: String,
}

impl DiscordRest {
    pub fn new(token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            token: token.to_string(),
            base_url: API_BASE.to_string(),
        })
    }

    pub async fn create_message(&self, channel: ChannelId, text: &str) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel);
        let body = serde_json::json!({ "content": truncate(text, MAX_MESSAGE_CHARS) });

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self
                .client
                .post(&url)
                .header(header::AUTHORIZATION, format!("Bot {}", self.token))
                .json(&body)
                .send()
                .await
                .context("Failed to post Discord message")?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = response
                    .json::<RateLimited>()
                    .await
                    .map(|r| r.retry_after)
                    .unwrap_or(1.0);
                warn!(channel = %channel, attempt, retry_after = wait, "Discord rate limited");
                tokio::time::sleep(Duration::from_secs_f64(wait.clamp(0.0, 60.0))).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("Discord message failed: {} - {}", status, body);
            }

            debug!(channel = %channel, "Discord message sent");
            return Ok(());
        }

        anyhow::bail!("Discord message to {} still rate limited after {} attempts", channel, MAX_ATTEMPTS)
    }
}

#[async_trait]
impl ChatSink for DiscordRest {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<()> {
        self.create_message(channel, text).await
    }
}

/// Cut `text` to at most `max` characters, marking the cut.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 2000), "short");

        let long = "🟠".repeat(2500);
        let cut = truncate(&long, MAX_MESSAGE_CHARS);
        assert_eq!(cut.chars().count(), MAX_MESSAGE_CHARS);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_rate_limit_body() {
        let body: RateLimited =
            serde_json::from_str(r#"{"message":"You are being rate limited.","retry_after":0.64,"global":false}"#).unwrap();
        assert_eq!(body.retry_after, 0.64);
    }
}
