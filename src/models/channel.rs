//! Notification channel configuration owned by projects or environments.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque key-value configuration of a channel (e.g. `{"channel": "#ops"}`).
pub type ChannelConfig = serde_json::Map<String, serde_json::Value>;

/// The owner of a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "owner_kind", content = "owner_id", rename_all = "lowercase")]
pub enum ChannelOwner {
    /// A channel shared by every environment of a project.
    Project(i64),
    /// A channel that applies to a single environment.
    Environment(i64),
}

impl ChannelOwner {
    /// The discriminant stored alongside the owner id.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelOwner::Project(_) => "project",
            ChannelOwner::Environment(_) => "environment",
        }
    }

    /// The owner's database id.
    pub fn id(&self) -> i64 {
        match self {
            ChannelOwner::Project(id) | ChannelOwner::Environment(id) => *id,
        }
    }
}

impl fmt::Display for ChannelOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// A configured delivery channel. At most one per (owner, kind).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannel {
    /// Database identifier.
    pub id: i64,
    /// Project or environment owning this channel.
    pub owner: ChannelOwner,
    /// Adapter kind, e.g. `slack`.
    pub channel_kind: String,
    /// Disabled channels are never resolved for delivery.
    pub enabled: bool,
    /// Channel specific settings.
    pub config: ChannelConfig,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A channel change requested alongside a check report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Adapter kind to create or update.
    pub channel_kind: String,
    /// New enabled flag, left unchanged when absent.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Settings to store on the channel.
    #[serde(default)]
    pub config: Option<ChannelConfig>,
}
