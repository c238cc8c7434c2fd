//! Process-wide default settings per channel kind.

use std::collections::HashMap;

use serde::Deserialize;

use crate::models::ChannelConfig;

/// Default channel configuration keyed by channel kind, e.g. a shared Slack
/// bot token. Defaults only fill keys a channel leaves unset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct NotificationDefaults(HashMap<String, ChannelConfig>);

impl NotificationDefaults {
    /// Defaults for `channel_kind`, if any are configured.
    pub fn for_kind(&self, channel_kind: &str) -> Option<&ChannelConfig> {
        self.0.get(channel_kind)
    }

    /// Registers defaults for a channel kind, replacing previous ones.
    pub fn insert(&mut self, channel_kind: impl Into<String>, config: ChannelConfig) {
        self.0.insert(channel_kind.into(), config);
    }

    /// Returns `config` with every absent key filled from the defaults of
    /// `channel_kind`. Keys set on the channel always win.
    pub fn apply(&self, channel_kind: &str, config: &ChannelConfig) -> ChannelConfig {
        let mut effective = config.clone();
        if let Some(defaults) = self.for_kind(channel_kind) {
            for (key, value) in defaults {
                effective.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        effective
    }
}
