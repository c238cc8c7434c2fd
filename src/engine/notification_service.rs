//! Turns a [`StatusChange`] into deliveries.
//!
//! The service runs the detector, resolves channels, builds the
//! [`Notification`] and hands it to the dispatcher for every channel that
//! should hear about it.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use super::{
    channel_resolver::ChannelResolver,
    detector::{self, Transition},
    dispatcher::{DeliveryDispatcher, DispatchOutcome},
};
use crate::{
    config::AppConfig,
    models::{DriftCheck, Notification, NotificationChannel, NotificationState, StatusChange},
    notifiers::AdapterRegistry,
    persistence::{
        error::PersistenceError,
        traits::{ChannelRepository, LedgerRepository, NotificationStateRepository},
    },
};

/// Errors raised while preparing deliveries. Delivery failures themselves
/// are reported per channel in [`DispatchOutcome`].
#[derive(Debug, Error)]
pub enum NotificationServiceError {
    /// Reading environments, channels or states failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Processes status changes end to end.
pub struct NotificationService {
    ledger: Arc<dyn LedgerRepository>,
    states: Arc<dyn NotificationStateRepository>,
    resolver: ChannelResolver<dyn ChannelRepository>,
    dispatcher: DeliveryDispatcher<dyn NotificationStateRepository>,
}

impl NotificationService {
    /// Creates a service. `states` must be the store the dispatcher writes
    /// to.
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        channels: Arc<dyn ChannelRepository>,
        states: Arc<dyn NotificationStateRepository>,
        dispatcher: DeliveryDispatcher<dyn NotificationStateRepository>,
    ) -> Self {
        Self { ledger, states, resolver: ChannelResolver::new(channels), dispatcher }
    }

    /// Wires a service over one repository that stores everything, using
    /// the configured defaults and delivery timeout.
    pub fn from_config<T>(config: &AppConfig, repository: Arc<T>, adapters: AdapterRegistry) -> Self
    where
        T: LedgerRepository + ChannelRepository + NotificationStateRepository + 'static,
    {
        let states: Arc<dyn NotificationStateRepository> = repository.clone();
        let dispatcher = DeliveryDispatcher::new(
            adapters,
            Arc::clone(&states),
            config.notifications.clone(),
            config.delivery_timeout,
        );
        Self::new(repository.clone(), repository, states, dispatcher)
    }

    /// Notifies the channels of `change.environment_id` if the change calls
    /// for it, returning one outcome per channel notified.
    ///
    /// A vanished environment is logged and yields no deliveries.
    #[tracing::instrument(
        skip(self),
        fields(
            environment_id = change.environment_id,
            old_status = %change.old_status,
            new_status = %change.new_status,
        )
    )]
    pub async fn process(
        &self,
        change: StatusChange,
    ) -> Result<Vec<DispatchOutcome>, NotificationServiceError> {
        let transition = detector::classify(change.old_status, change.new_status);
        if transition == Transition::Ignore {
            tracing::debug!("Transition is not notification-worthy.");
            return Ok(Vec::new());
        }

        let Some(environment) = self.ledger.get_environment(change.environment_id).await? else {
            tracing::warn!("Environment no longer exists, dropping notification.");
            return Ok(Vec::new());
        };
        let Some(project) = self.ledger.get_project(environment.project_id).await? else {
            tracing::warn!(
                project_id = environment.project_id,
                "Project no longer exists, dropping notification."
            );
            return Ok(Vec::new());
        };

        let channels = self.resolver.resolve_enabled_channels(&environment).await?;
        if channels.is_empty() {
            tracing::debug!("No enabled channels for environment.");
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let lateral = matches!(transition, Transition::Lateral(_));
        let states = if lateral {
            self.channel_states(environment.id, &channels).await?
        } else {
            Vec::new()
        };
        let Some(event_type) =
            detector::should_notify(change.old_status, change.new_status, &states, now)
        else {
            tracing::debug!("Every channel was notified recently, skipping reminder.");
            return Ok(Vec::new());
        };
        // The dispatcher checks again under the pair lock; this pass only
        // avoids building a notification nobody is due.
        let channels: Vec<NotificationChannel> = if lateral {
            channels
                .into_iter()
                .zip(&states)
                .filter(|(_, state)| detector::is_due(state.as_ref(), now))
                .map(|(channel, _)| channel)
                .collect()
        } else {
            channels
        };

        let drift_check = self.triggering_check(&change).await?;
        let notification = Notification::new(
            &project,
            &environment,
            event_type,
            change.old_status,
            change.new_status,
            drift_check,
        );
        tracing::info!(
            event_type = %event_type,
            channels = channels.len(),
            "Dispatching notification."
        );
        Ok(self.dispatcher.dispatch_all(&notification, &channels, transition).await)
    }

    /// The stored state of each channel, in the same order.
    async fn channel_states(
        &self,
        environment_id: i64,
        channels: &[NotificationChannel],
    ) -> Result<Vec<Option<NotificationState>>, PersistenceError> {
        let mut states = Vec::with_capacity(channels.len());
        for channel in channels {
            states.push(self.states.find_state(environment_id, &channel.channel_kind).await?);
        }
        Ok(states)
    }

    /// The check named by the change, or the environment's latest one.
    async fn triggering_check(
        &self,
        change: &StatusChange,
    ) -> Result<Option<DriftCheck>, PersistenceError> {
        if let Some(check_id) = change.check_id {
            if let Some(check) = self.ledger.get_check(check_id).await? {
                return Ok(Some(check));
            }
        }
        self.ledger.latest_check(change.environment_id).await
    }
}
