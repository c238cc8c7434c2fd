//! # Delivery dispatcher
//!
//! Sends one notification to one channel and keeps the channel's
//! [`NotificationState`] consistent with what was posted.
//!
//! For every channel the dispatcher:
//!
//! 1. looks up or creates the state of the (environment, channel kind) pair,
//!    and drops lateral reminders the channel is no longer due,
//! 2. fills gaps in the channel config from the process-wide defaults,
//! 3. updates the open alert for resolution events, or posts a new one
//!    otherwise,
//! 4. records the outcome in the state.
//!
//! Failures are logged and reported as [`DispatchOutcome::Failed`]; they are
//! never returned as errors, so one broken channel cannot affect the others.
//! Dispatches for the same pair run one at a time.

use std::{fmt, sync::Arc, time::Duration};

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use super::detector::{self, Transition};
use crate::{
    config::NotificationDefaults,
    models::{Notification, NotificationChannel, NotificationState},
    notifiers::{AdapterRegistry, ChannelAdapter, NotifierError},
    persistence::{error::PersistenceError, traits::NotificationStateRepository},
};

/// What happened to a single channel delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No adapter is registered for the channel kind.
    Skipped,
    /// A new message was posted.
    Delivered {
        /// Identifier of the posted message.
        external_id: String,
    },
    /// The open alert was updated in place and closed.
    Resolved,
    /// A lateral reminder the channel was no longer due; nothing was sent.
    NotDue,
    /// The delivery failed; the error was logged.
    Failed(String),
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error("notification state error: {0}")]
    State(#[from] PersistenceError),

    #[error("adapter error: {0}")]
    Adapter(#[from] NotifierError),

    #[error("adapter call timed out after {0:?}")]
    Timeout(Duration),
}

/// Dispatches notifications to channel adapters.
pub struct DeliveryDispatcher<S: NotificationStateRepository + ?Sized> {
    adapters: AdapterRegistry,
    states: Arc<S>,
    defaults: NotificationDefaults,
    timeout: Duration,
    /// Serializes deliveries per (environment, channel kind). Entries live
    /// only while a dispatch for the pair holds or awaits them.
    locks: DashMap<(i64, String), Arc<Mutex<()>>>,
}

impl<S: NotificationStateRepository + ?Sized> fmt::Debug for DeliveryDispatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryDispatcher")
            .field("adapters", &self.adapters.kinds())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<S: NotificationStateRepository + ?Sized> DeliveryDispatcher<S> {
    /// Creates a dispatcher. `timeout` bounds every adapter call.
    pub fn new(
        adapters: AdapterRegistry,
        states: Arc<S>,
        defaults: NotificationDefaults,
        timeout: Duration,
    ) -> Self {
        Self { adapters, states, defaults, timeout, locks: DashMap::new() }
    }

    /// Delivers `notification` to `channel`. Never fails.
    ///
    /// For a [`Transition::Lateral`] the channel must still be due a
    /// reminder once the pair's state is loaded; a reminder sent meanwhile by
    /// a concurrent dispatch turns this one into [`DispatchOutcome::NotDue`].
    #[tracing::instrument(
        skip_all,
        fields(
            environment_id = notification.environment_id,
            environment = %notification.environment_key,
            channel_kind = %channel.channel_kind,
            event_type = %notification.event_type,
        )
    )]
    pub async fn dispatch(
        &self,
        notification: &Notification,
        channel: &NotificationChannel,
        transition: Transition,
    ) -> DispatchOutcome {
        match self.try_dispatch(notification, channel, transition).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    details = ?e,
                    channel_id = channel.id,
                    "Failed to deliver notification."
                );
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    /// Delivers `notification` to each channel in turn.
    pub async fn dispatch_all(
        &self,
        notification: &Notification,
        channels: &[NotificationChannel],
        transition: Transition,
    ) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(channels.len());
        for channel in channels {
            outcomes.push(self.dispatch(notification, channel, transition).await);
        }
        outcomes
    }

    async fn try_dispatch(
        &self,
        notification: &Notification,
        channel: &NotificationChannel,
        transition: Transition,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(adapter) = self.adapters.get(&channel.channel_kind) else {
            tracing::debug!("No adapter registered for channel kind, skipping.");
            return Ok(DispatchOutcome::Skipped);
        };

        let key = (notification.environment_id, channel.channel_kind.clone());
        let lock = Arc::clone(
            self.locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).value(),
        );
        let result = {
            let _guard = lock.lock().await;
            self.dispatch_locked(adapter.as_ref(), notification, channel, transition).await
        };
        drop(lock);
        self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn dispatch_locked(
        &self,
        adapter: &dyn ChannelAdapter,
        notification: &Notification,
        channel: &NotificationChannel,
        transition: Transition,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut state: NotificationState = self
            .states
            .find_or_create_state(notification.environment_id, &channel.channel_kind)
            .await?;
        if matches!(transition, Transition::Lateral(_))
            && !detector::is_due(Some(&state), Utc::now())
        {
            tracing::debug!("Channel was reminded recently, skipping.");
            return Ok(DispatchOutcome::NotDue);
        }
        let config = self.defaults.apply(&channel.channel_kind, &channel.config);

        if notification.event_type.is_resolution() && state.is_open() {
            tokio::time::timeout(self.timeout, adapter.update(&state, notification, &config))
                .await
                .map_err(|_| DispatchError::Timeout(self.timeout))??;

            state.mark_resolved(Utc::now());
            self.states.save_state(&state).await?;
            tracing::info!("Resolved open alert.");
            return Ok(DispatchOutcome::Resolved);
        }

        let receipt =
            tokio::time::timeout(self.timeout, adapter.deliver(notification, &config, &state))
                .await
                .map_err(|_| DispatchError::Timeout(self.timeout))??;

        state.mark_sent(
            receipt.external_id.clone(),
            notification.new_status,
            receipt.metadata,
            Utc::now(),
        );
        self.states.save_state(&state).await?;
        tracing::info!(external_id = %receipt.external_id, "Delivered notification.");
        Ok(DispatchOutcome::Delivered { external_id: receipt.external_id })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::{
        models::{ChannelConfig, ChannelOwner, EnvironmentStatus, EventType},
        notifiers::{DeliveryReceipt, MockChannelAdapter},
        persistence::traits::MockNotificationStateRepository,
        test_helpers::{ChannelBuilder, NotificationBuilder},
    };

    const CHANGED: Transition = Transition::Changed(EventType::DriftDetected);
    const REMINDER: Transition = Transition::Lateral(EventType::DriftDetected);

    fn registry(adapter: MockChannelAdapter) -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry.register("slack", Arc::new(adapter));
        registry
    }

    fn slack_channel() -> NotificationChannel {
        ChannelBuilder::new(ChannelOwner::Project(1)).channel("#team").build()
    }

    fn defaults() -> NotificationDefaults {
        let mut defaults = NotificationDefaults::default();
        let mut slack = ChannelConfig::new();
        slack.insert("token".to_string(), json!("xoxb-default"));
        slack.insert("channel".to_string(), json!("#default"));
        defaults.insert("slack", slack);
        defaults
    }

    fn open_state() -> NotificationState {
        let mut state = NotificationState::new(1, "slack");
        state.mark_sent(
            "111.222".to_string(),
            EnvironmentStatus::Drift,
            Map::new(),
            Utc::now() - chrono::Duration::hours(1),
        );
        state
    }

    #[tokio::test]
    async fn test_deliver_records_receipt_with_merged_config() {
        let mut adapter = MockChannelAdapter::new();
        adapter
            .expect_deliver()
            .withf(|_, config, _| config["channel"] == "#team" && config["token"] == "xoxb-default")
            .times(1)
            .returning(|_, _, _| Ok(DeliveryReceipt::new("999.000")));

        let mut states = MockNotificationStateRepository::new();
        states
            .expect_find_or_create_state()
            .returning(|env, kind| Ok(NotificationState::new(env, kind)));
        states
            .expect_save_state()
            .withf(|state| {
                state.external_message_id.as_deref() == Some("999.000")
                    && state.last_notified_status == Some(EnvironmentStatus::Drift)
                    && state.last_sent_at().is_some()
            })
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = DeliveryDispatcher::new(
            registry(adapter),
            Arc::new(states),
            defaults(),
            Duration::from_secs(5),
        );
        let outcome =
            dispatcher.dispatch(&NotificationBuilder::new().build(), &slack_channel(), CHANGED).await;

        assert_eq!(outcome, DispatchOutcome::Delivered { external_id: "999.000".to_string() });
    }

    #[tokio::test]
    async fn test_resolution_updates_open_alert() {
        let mut adapter = MockChannelAdapter::new();
        adapter
            .expect_update()
            .withf(|state, _, _| state.external_message_id.as_deref() == Some("111.222"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        adapter.expect_deliver().never();

        let mut states = MockNotificationStateRepository::new();
        states.expect_find_or_create_state().returning(|_, _| Ok(open_state()));
        states
            .expect_save_state()
            .withf(|state| {
                !state.is_open()
                    && state.last_notified_status.is_none()
                    && state.last_sent_at().is_some()
                    && state.resolved_at().is_some()
            })
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = DeliveryDispatcher::new(
            registry(adapter),
            Arc::new(states),
            NotificationDefaults::default(),
            Duration::from_secs(5),
        );
        let notification = NotificationBuilder::new()
            .event(EventType::DriftResolved, EnvironmentStatus::Drift, EnvironmentStatus::Ok)
            .build();

        assert_eq!(
            dispatcher.dispatch(&notification, &slack_channel(), CHANGED).await,
            DispatchOutcome::Resolved
        );
    }

    #[tokio::test]
    async fn test_reminder_skipped_when_recently_sent() {
        let mut adapter = MockChannelAdapter::new();
        adapter.expect_deliver().never();

        let mut states = MockNotificationStateRepository::new();
        states.expect_find_or_create_state().returning(|_, _| Ok(open_state()));
        states.expect_save_state().never();

        let dispatcher = DeliveryDispatcher::new(
            registry(adapter),
            Arc::new(states),
            NotificationDefaults::default(),
            Duration::from_secs(5),
        );
        let outcome =
            dispatcher.dispatch(&NotificationBuilder::new().build(), &slack_channel(), REMINDER).await;

        assert_eq!(outcome, DispatchOutcome::NotDue);
        assert!(dispatcher.locks.is_empty());
    }

    #[tokio::test]
    async fn test_reminder_sent_after_threshold() {
        let mut adapter = MockChannelAdapter::new();
        adapter.expect_deliver().times(1).returning(|_, _, _| Ok(DeliveryReceipt::new("2.0")));

        let mut states = MockNotificationStateRepository::new();
        states.expect_find_or_create_state().returning(|_, _| {
            let mut state = NotificationState::new(1, "slack");
            state.mark_sent(
                "1.0".to_string(),
                EnvironmentStatus::Drift,
                Map::new(),
                Utc::now() - chrono::Duration::hours(25),
            );
            Ok(state)
        });
        states
            .expect_save_state()
            .withf(|state| state.external_message_id.as_deref() == Some("2.0"))
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = DeliveryDispatcher::new(
            registry(adapter),
            Arc::new(states),
            NotificationDefaults::default(),
            Duration::from_secs(5),
        );
        let outcome =
            dispatcher.dispatch(&NotificationBuilder::new().build(), &slack_channel(), REMINDER).await;

        assert_eq!(outcome, DispatchOutcome::Delivered { external_id: "2.0".to_string() });
    }

    #[tokio::test]
    async fn test_pair_locks_are_released() {
        let mut adapter = MockChannelAdapter::new();
        adapter.expect_deliver().returning(|_, _, _| Ok(DeliveryReceipt::new("1.0")));

        let mut states = MockNotificationStateRepository::new();
        states
            .expect_find_or_create_state()
            .returning(|env, kind| Ok(NotificationState::new(env, kind)));
        states.expect_save_state().returning(|_| Ok(()));

        let dispatcher = DeliveryDispatcher::new(
            registry(adapter),
            Arc::new(states),
            NotificationDefaults::default(),
            Duration::from_secs(5),
        );
        for environment_id in 1..=3 {
            let notification = NotificationBuilder::new().environment_id(environment_id).build();
            dispatcher.dispatch(&notification, &slack_channel(), CHANGED).await;
        }

        assert!(dispatcher.locks.is_empty());
    }

    #[tokio::test]
    async fn test_resolution_without_open_alert_posts_new_message() {
        let mut adapter = MockChannelAdapter::new();
        adapter.expect_update().never();
        adapter.expect_deliver().times(1).returning(|_, _, _| Ok(DeliveryReceipt::new("1.2")));

        let mut states = MockNotificationStateRepository::new();
        states
            .expect_find_or_create_state()
            .returning(|env, kind| Ok(NotificationState::new(env, kind)));
        states.expect_save_state().times(1).returning(|_| Ok(()));

        let dispatcher = DeliveryDispatcher::new(
            registry(adapter),
            Arc::new(states),
            NotificationDefaults::default(),
            Duration::from_secs(5),
        );
        let notification = NotificationBuilder::new()
            .event(EventType::ErrorResolved, EnvironmentStatus::Error, EnvironmentStatus::Ok)
            .build();

        assert!(matches!(
            dispatcher.dispatch(&notification, &slack_channel(), CHANGED).await,
            DispatchOutcome::Delivered { .. }
        ));
    }

    #[tokio::test]
    async fn test_adapter_failure_is_contained() {
        let mut adapter = MockChannelAdapter::new();
        adapter
            .expect_deliver()
            .returning(|_, _, _| Err(NotifierError::ApiError("rate_limited".to_string())));

        let mut states = MockNotificationStateRepository::new();
        states
            .expect_find_or_create_state()
            .returning(|env, kind| Ok(NotificationState::new(env, kind)));
        states.expect_save_state().never();

        let dispatcher = DeliveryDispatcher::new(
            registry(adapter),
            Arc::new(states),
            NotificationDefaults::default(),
            Duration::from_secs(5),
        );
        let outcome =
            dispatcher.dispatch(&NotificationBuilder::new().build(), &slack_channel(), CHANGED).await;

        match outcome {
            DispatchOutcome::Failed(msg) => assert!(msg.contains("rate_limited")),
            other => panic!("Expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_state_failure_is_contained() {
        let adapter = MockChannelAdapter::new();
        let mut states = MockNotificationStateRepository::new();
        states
            .expect_find_or_create_state()
            .returning(|_, _| Err(PersistenceError::OperationFailed("locked".to_string())));

        let dispatcher = DeliveryDispatcher::new(
            registry(adapter),
            Arc::new(states),
            NotificationDefaults::default(),
            Duration::from_secs(5),
        );
        let outcome =
            dispatcher.dispatch(&NotificationBuilder::new().build(), &slack_channel(), CHANGED).await;

        assert!(matches!(outcome, DispatchOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_skipped() {
        let mut states = MockNotificationStateRepository::new();
        states.expect_find_or_create_state().never();

        let dispatcher = DeliveryDispatcher::new(
            AdapterRegistry::new(),
            Arc::new(states),
            NotificationDefaults::default(),
            Duration::from_secs(5),
        );
        let channel = ChannelBuilder::new(ChannelOwner::Project(1)).kind("pagerduty").build();

        assert_eq!(
            dispatcher.dispatch(&NotificationBuilder::new().build(), &channel, CHANGED).await,
            DispatchOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn test_one_failing_channel_does_not_block_others() {
        let mut failing = MockChannelAdapter::new();
        failing
            .expect_deliver()
            .returning(|_, _, _| Err(NotifierError::ConfigError("no token".to_string())));
        let mut working = MockChannelAdapter::new();
        working.expect_deliver().times(1).returning(|_, _, _| Ok(DeliveryReceipt::new("ok")));

        let mut registry = AdapterRegistry::new();
        registry.register("broken", Arc::new(failing));
        registry.register("slack", Arc::new(working));

        let mut states = MockNotificationStateRepository::new();
        states
            .expect_find_or_create_state()
            .returning(|env, kind| Ok(NotificationState::new(env, kind)));
        states.expect_save_state().times(1).returning(|_| Ok(()));

        let dispatcher = DeliveryDispatcher::new(
            registry,
            Arc::new(states),
            NotificationDefaults::default(),
            Duration::from_secs(5),
        );
        let channels = vec![
            ChannelBuilder::new(ChannelOwner::Project(1)).kind("broken").build(),
            slack_channel(),
        ];
        let outcomes = dispatcher
            .dispatch_all(&NotificationBuilder::new().build(), &channels, CHANGED)
            .await;

        assert!(matches!(outcomes[0], DispatchOutcome::Failed(_)));
        assert!(matches!(outcomes[1], DispatchOutcome::Delivered { .. }));
    }
}
