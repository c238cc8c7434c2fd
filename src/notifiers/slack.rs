//! Slack adapter built on the Web API (`chat.postMessage` and `chat.update`).
//!
//! Messages are sent as a single colored attachment holding Block Kit blocks.
//! The effective channel config must provide `token` and `channel`;
//! `api_url` may override the API base URL.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{ChannelAdapter, DeliveryReceipt, NotifierError};
use crate::models::{ChannelConfig, EventType, Notification, NotificationState};

const DEFAULT_API_URL: &str = "https://slack.com/api";

const DRIFT_COLOR: &str = "#FFA500";
const ERROR_COLOR: &str = "#FF0000";
const RESOLVED_COLOR: &str = "#36A64F";

/// Metadata key under which the posting channel's id is kept.
pub const CHANNEL_ID: &str = "channel_id";

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    channel: Option<String>,
}

/// Posts drift alerts to Slack and resolves them in place.
pub struct SlackAdapter {
    client: Arc<ClientWithMiddleware>,
    post_client: Arc<ClientWithMiddleware>,
    app_url: String,
}

impl SlackAdapter {
    /// Channel kind served by this adapter.
    pub const KIND: &'static str = "slack";

    /// Creates an adapter. `app_url` is the base of the deep links rendered
    /// into messages.
    pub fn new(client: Arc<ClientWithMiddleware>, app_url: &str) -> Self {
        Self {
            post_client: Arc::clone(&client),
            client,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    /// Uses `client` for `chat.postMessage` only.
    ///
    /// Posting is not idempotent: a post retried after Slack accepted it
    /// shows the alert twice, so this client should not retry.
    pub fn with_post_client(mut self, client: Arc<ClientWithMiddleware>) -> Self {
        self.post_client = client;
        self
    }

    async fn call(
        &self,
        client: &ClientWithMiddleware,
        config: &ChannelConfig,
        method: &str,
        payload: &Value,
    ) -> Result<SlackResponse, NotifierError> {
        let token = required(config, "token")?;
        let api_url = optional(config, "api_url")?.unwrap_or(DEFAULT_API_URL);
        let url = format!("{}/{method}", api_url.trim_end_matches('/'));

        let response = client.post(&url).bearer_auth(token).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifierError::ApiError(format!(
                "{method} failed with status: {status}"
            )));
        }

        let body: SlackResponse = response.json().await?;
        if !body.ok {
            return Err(NotifierError::ApiError(format!(
                "{method} returned error: {}",
                body.error.as_deref().unwrap_or("unknown_error")
            )));
        }
        Ok(body)
    }

    fn link(&self, notification: &Notification) -> String {
        format!("{}{}", self.app_url, notification.details.url)
    }
}

#[async_trait]
impl ChannelAdapter for SlackAdapter {
    #[tracing::instrument(skip_all, fields(environment_id = notification.environment_id, event_type = %notification.event_type))]
    async fn deliver(
        &self,
        notification: &Notification,
        config: &ChannelConfig,
        _state: &NotificationState,
    ) -> Result<DeliveryReceipt, NotifierError> {
        let channel = required(config, "channel")?;
        let payload = json!({
            "channel": channel,
            "attachments": [{
                "color": alert_color(notification.event_type),
                "blocks": alert_blocks(notification, &self.link(notification)),
                "fallback": notification.headline(),
            }],
        });

        let response = self.call(&self.post_client, config, "chat.postMessage", &payload).await?;
        let ts = response.ts.ok_or_else(|| {
            NotifierError::ApiError("chat.postMessage response has no message ts".to_string())
        })?;

        let mut metadata = Map::new();
        if let Some(channel_id) = response.channel {
            metadata.insert(CHANNEL_ID.to_string(), Value::String(channel_id));
        }
        tracing::debug!(ts = %ts, "Slack message posted.");
        Ok(DeliveryReceipt { external_id: ts, metadata })
    }

    #[tracing::instrument(skip_all, fields(environment_id = notification.environment_id, event_type = %notification.event_type))]
    async fn update(
        &self,
        state: &NotificationState,
        notification: &Notification,
        config: &ChannelConfig,
    ) -> Result<(), NotifierError> {
        let ts = state.external_message_id.as_deref().ok_or(NotifierError::MissingMessageId)?;
        // chat.update needs the channel id, not the name the message was
        // posted with.
        let channel = match state.metadata.get(CHANNEL_ID).and_then(Value::as_str) {
            Some(id) => id,
            None => required(config, "channel")?,
        };
        let payload = json!({
            "channel": channel,
            "ts": ts,
            "attachments": [{
                "color": RESOLVED_COLOR,
                "blocks": resolved_blocks(notification, state, &self.link(notification), Utc::now()),
                "fallback": notification.headline(),
            }],
        });

        self.call(&self.client, config, "chat.update", &payload).await?;
        tracing::debug!(ts = %ts, "Slack message resolved.");
        Ok(())
    }
}

fn required<'a>(config: &'a ChannelConfig, key: &str) -> Result<&'a str, NotifierError> {
    optional(config, key)?
        .filter(|value| !value.is_empty())
        .ok_or_else(|| NotifierError::ConfigError(format!("Slack channel config requires '{key}'")))
}

fn optional<'a>(config: &'a ChannelConfig, key: &str) -> Result<Option<&'a str>, NotifierError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.as_str())),
        Some(other) => Err(NotifierError::ConfigError(format!(
            "Slack channel config '{key}' must be a string, got {other}"
        ))),
    }
}

fn alert_color(event_type: EventType) -> &'static str {
    match event_type {
        EventType::DriftDetected => DRIFT_COLOR,
        EventType::ErrorDetected => ERROR_COLOR,
        _ => RESOLVED_COLOR,
    }
}

fn header_blocks(notification: &Notification) -> Vec<Value> {
    vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": notification.headline(), "emoji": true },
        }),
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!(
                    "*Project:* {}   *Environment:* {}",
                    notification.details.project, notification.details.environment
                ),
            },
        }),
    ]
}

fn link_block(link: &str) -> Value {
    json!({
        "type": "actions",
        "elements": [{
            "type": "button",
            "text": { "type": "plain_text", "text": "View in DriftHound" },
            "url": link,
        }],
    })
}

fn alert_blocks(notification: &Notification, link: &str) -> Vec<Value> {
    let mut blocks = header_blocks(notification);
    if let Some(changes) = notification.details.changes.as_deref().filter(|c| !c.is_empty()) {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Summary:* {changes}") },
        }));
    }
    blocks.push(link_block(link));
    blocks
}

fn resolved_blocks(
    notification: &Notification,
    state: &NotificationState,
    link: &str,
    now: DateTime<Utc>,
) -> Vec<Value> {
    let mut blocks = header_blocks(notification);
    blocks.push(json!({
        "type": "section",
        "text": {
            "type": "mrkdwn",
            "text": format!(
                "*Resolved:* {} (after {})",
                now.format("%Y-%m-%d %H:%M UTC"),
                elapsed_since(state.last_sent_at(), now)
            ),
        },
    }));
    blocks.push(link_block(link));
    blocks
}

/// `"3h 25m"` between the original alert and `now`, or `"unknown"`.
fn elapsed_since(sent_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match sent_at {
        Some(sent_at) => {
            let minutes = (now - sent_at).num_minutes().max(0);
            format!("{}h {}m", minutes / 60, minutes % 60)
        }
        None => "unknown".to_string(),
    }
}
