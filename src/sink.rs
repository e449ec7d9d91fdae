//! Outbound notification delivery.
//!
//! The poller only knows the [`MessagingSink`] trait; the shipped
//! implementation posts embeds to the Discord REST API. Discord throttles
//! like any other upstream, so the sink shares the rate-limited client.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::{ApiClient, ApiError};
use crate::game::Notification;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to deliver notification: {0}")]
    Delivery(#[from] ApiError),
}

/// Sends one notification to one delivery target.
#[async_trait]
pub trait MessagingSink: Send + Sync {
    async fn send_notification(
        &self,
        channel_id: &str,
        notification: &Notification,
    ) -> Result<(), SinkError>;
}

/// Discord REST delivery: `POST /channels/{channel_id}/messages`.
pub struct DiscordSink {
    api: ApiClient,
    auth_header: String,
    base_url: String,
}

impl DiscordSink {
    pub fn new(bot_token: &str, request_spacing: Duration, throttle_backoff: Duration) -> Self {
        Self {
            api: ApiClient::new(request_spacing, throttle_backoff, decode_discord_error),
            auth_header: format!("Bot {bot_token}"),
            base_url: DISCORD_API_BASE.to_string(),
        }
    }
}

#[async_trait]
impl MessagingSink for DiscordSink {
    async fn send_notification(
        &self,
        channel_id: &str,
        notification: &Notification,
    ) -> Result<(), SinkError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let body = serde_json::json!({ "embeds": [embed_json(notification)] });
        self.api
            .post_json(&url, &[("Authorization", self.auth_header.as_str())], &body)
            .await?;
        Ok(())
    }
}

/// Discord error bodies look like `{"message":"Missing Access","code":50001}`.
fn decode_discord_error(_status: u16, body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(|s| s.to_string())
}

/// Translate the platform-neutral embed into Discord's wire shape.
fn embed_json(notification: &Notification) -> serde_json::Value {
    let fields: Vec<serde_json::Value> = notification
        .fields
        .iter()
        .map(|f| {
            serde_json::json!({
                "name": f.name,
                "value": f.value,
                "inline": f.inline,
            })
        })
        .collect();

    let mut embed = serde_json::json!({
        "title": notification.title,
        "description": notification.description,
        "color": notification.color,
        "author": { "name": notification.author_name },
        "fields": fields,
        "footer": { "text": notification.footer },
    });
    if let Some(ts) = notification.timestamp {
        embed["timestamp"] = serde_json::Value::String(ts.to_rfc3339());
    }
    embed
}
