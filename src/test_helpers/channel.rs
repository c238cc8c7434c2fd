//! A builder for creating `NotificationChannel` instances in tests.

use chrono::Utc;
use serde_json::Value;

use crate::models::{ChannelConfig, ChannelOwner, NotificationChannel};

/// A builder for creating `NotificationChannel` instances in tests.
#[derive(Debug, Clone)]
pub struct ChannelBuilder {
    id: i64,
    owner: ChannelOwner,
    kind: String,
    enabled: bool,
    config: ChannelConfig,
}

impl ChannelBuilder {
    /// Creates an enabled Slack channel builder for `owner`.
    pub fn new(owner: ChannelOwner) -> Self {
        Self { id: 1, owner, kind: "slack".to_string(), enabled: true, config: ChannelConfig::new() }
    }

    /// Sets the channel id.
    pub fn id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Sets the channel kind.
    pub fn kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    /// Sets the target Slack channel.
    pub fn channel(self, channel: &str) -> Self {
        self.config_value("channel", Value::String(channel.to_string()))
    }

    /// Sets an arbitrary configuration value.
    pub fn config_value(mut self, key: &str, value: Value) -> Self {
        self.config.insert(key.to_string(), value);
        self
    }

    /// Sets the enabled flag.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builds the `NotificationChannel`.
    pub fn build(self) -> NotificationChannel {
        let now = Utc::now();
        NotificationChannel {
            id: self.id,
            owner: self.owner,
            channel_kind: self.kind,
            enabled: self.enabled,
            config: self.config,
            created_at: now,
            updated_at: now,
        }
    }
}
