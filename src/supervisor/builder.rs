//! This module provides the `SupervisorBuilder` for constructing a `Supervisor`.

use std::sync::Arc;

use super::{Supervisor, SupervisorError};
use crate::{
    config::AppConfig,
    engine::{
        dispatcher::DeliveryDispatcher, ingestion::IngestionService, ledger::RetentionPolicy,
        notification_service::NotificationService, notification_worker::NotificationQueue,
    },
    http_client::HttpClientPool,
    notifiers::AdapterRegistry,
    persistence::traits::{ChannelRepository, LedgerRepository, NotificationStateRepository},
};

struct Repositories {
    ledger: Arc<dyn LedgerRepository>,
    channels: Arc<dyn ChannelRepository>,
    states: Arc<dyn NotificationStateRepository>,
}

/// A builder for creating a `Supervisor` instance.
pub struct SupervisorBuilder {
    config: Option<AppConfig>,
    repositories: Option<Repositories>,
    adapters: Option<AdapterRegistry>,
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorBuilder {
    /// Creates a new, empty `SupervisorBuilder`.
    pub fn new() -> Self {
        Self { config: None, repositories: None, adapters: None }
    }

    /// Sets the application configuration.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the repository holding checks, channels and notification state.
    pub fn repository<T>(mut self, repository: Arc<T>) -> Self
    where
        T: LedgerRepository + ChannelRepository + NotificationStateRepository + 'static,
    {
        self.repositories = Some(Repositories {
            ledger: repository.clone(),
            channels: repository.clone(),
            states: repository,
        });
        self
    }

    /// Replaces the adapters built from the configuration.
    pub fn adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Wires the ingestion path, the notification queue and the delivery path
    /// together.
    pub async fn build(self) -> Result<Supervisor, SupervisorError> {
        let config = self.config.ok_or(SupervisorError::MissingConfig)?;
        let repositories = self.repositories.ok_or(SupervisorError::MissingRepository)?;

        let adapters = match self.adapters {
            Some(adapters) => adapters,
            None => {
                let client_pool = HttpClientPool::new(config.http_base_config.clone());
                AdapterRegistry::from_config(&config, &client_pool).await?
            }
        };
        tracing::info!(kinds = ?adapters.kinds(), "Channel adapters ready.");

        let dispatcher = DeliveryDispatcher::new(
            adapters,
            Arc::clone(&repositories.states),
            config.notifications.clone(),
            config.delivery_timeout,
        );
        let notification_service = Arc::new(NotificationService::new(
            Arc::clone(&repositories.ledger),
            Arc::clone(&repositories.channels),
            repositories.states,
            dispatcher,
        ));

        let (queue, notification_rx) =
            NotificationQueue::bounded(config.notification_queue_capacity as usize);
        let ingestion = Arc::new(
            IngestionService::new(
                repositories.ledger,
                repositories.channels,
                RetentionPolicy::new(config.retention_days),
                config.notifications.clone(),
            )
            .with_queue(queue),
        );
        tracing::debug!(
            queue_capacity = config.notification_queue_capacity,
            retention_days = config.retention_days,
            "Ingestion and notification services wired."
        );

        Ok(Supervisor::new(config, ingestion, notification_service, notification_rx))
    }
}
