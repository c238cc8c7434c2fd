//! # Channel adapters
//!
//! A channel adapter turns a [`Notification`] into a message on an external
//! system. Every adapter supports two operations:
//!
//! - **deliver** posts a new message and returns its external id, which the
//!   dispatcher stores in the [`NotificationState`] of the pair.
//! - **update** edits the message referenced by the state in place, used
//!   when an alert is resolved.
//!
//! Adapters never write notification state themselves. The
//! [`AdapterRegistry`] maps channel kind strings to adapters; kinds without
//! an adapter resolve to `None`.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::{Map, Value};

use crate::{
    config::{AppConfig, HttpRetryConfig},
    http_client::HttpClientPool,
    models::{ChannelConfig, Notification, NotificationState},
};

pub mod error;
pub mod slack;

pub use error::NotifierError;
pub use slack::SlackAdapter;

/// What an adapter reports back after posting a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReceipt {
    /// Identifier of the posted message, used for later updates.
    pub external_id: String,
    /// Extra values merged into the state's metadata.
    pub metadata: Map<String, Value>,
}

impl DeliveryReceipt {
    /// A receipt without extra metadata.
    pub fn new(external_id: impl Into<String>) -> Self {
        Self { external_id: external_id.into(), metadata: Map::new() }
    }
}

/// A concrete delivery channel such as Slack.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Posts a new message for `notification`.
    async fn deliver(
        &self,
        notification: &Notification,
        config: &ChannelConfig,
        state: &NotificationState,
    ) -> Result<DeliveryReceipt, NotifierError>;

    /// Edits the message referenced by `state.external_message_id`.
    async fn update(
        &self,
        state: &NotificationState,
        notification: &Notification,
        config: &ChannelConfig,
    ) -> Result<(), NotifierError>;
}

/// Closed map from channel kind to adapter.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ChannelAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the built-in adapters, sharing clients from `client_pool`.
    pub async fn from_config(
        config: &AppConfig,
        client_pool: &HttpClientPool,
    ) -> Result<Self, NotifierError> {
        let client = client_pool.get_or_create(&config.http_retry_config).await?;
        let no_retry = HttpRetryConfig { max_retries: 0, ..config.http_retry_config.clone() };
        let post_client = client_pool.get_or_create(&no_retry).await?;

        let mut registry = Self::new();
        let slack = SlackAdapter::new(client, &config.app_url).with_post_client(post_client);
        registry.register(SlackAdapter::KIND, Arc::new(slack));
        tracing::debug!(kinds = ?registry.kinds(), "Channel adapters registered.");
        Ok(registry)
    }

    /// Registers `adapter` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(kind.into(), adapter);
    }

    /// The adapter for `kind`, if one is registered.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(kind).cloned()
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
