//! An in-memory channel adapter for exercising the delivery path without a
//! real external system.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    models::{ChannelConfig, EventType, Notification, NotificationState},
    notifiers::{ChannelAdapter, DeliveryReceipt, NotifierError},
};

/// A call observed by a [`RecordingAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// A new message was posted.
    Deliver {
        /// Environment of the notification.
        environment_id: i64,
        /// Event that was delivered.
        event_type: EventType,
        /// Configuration the adapter received, after defaults were merged.
        config: ChannelConfig,
    },
    /// An existing message was edited.
    Update {
        /// Environment of the notification.
        environment_id: i64,
        /// Event that was delivered.
        event_type: EventType,
        /// Id of the message that was edited.
        external_id: Option<String>,
    },
}

/// Records every call and answers with sequential message ids.
#[derive(Debug, Clone, Default)]
pub struct RecordingAdapter {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    next_id: Arc<AtomicUsize>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingAdapter {
    /// An adapter that succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// An adapter whose calls all fail with an API error.
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// Sleeps for `delay` before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls observed so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Number of `deliver` calls observed so far.
    pub fn deliveries(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, RecordedCall::Deliver { .. })).count()
    }

    /// Number of `update` calls observed so far.
    pub fn updates(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, RecordedCall::Update { .. })).count()
    }

    async fn record(&self, call: RecordedCall) -> Result<(), NotifierError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.fail {
            return Err(NotifierError::ApiError("recording adapter set to fail".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for RecordingAdapter {
    async fn deliver(
        &self,
        notification: &Notification,
        config: &ChannelConfig,
        _state: &NotificationState,
    ) -> Result<DeliveryReceipt, NotifierError> {
        self.record(RecordedCall::Deliver {
            environment_id: notification.environment_id,
            event_type: notification.event_type,
            config: config.clone(),
        })
        .await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(DeliveryReceipt::new(format!("msg-{id}")))
    }

    async fn update(
        &self,
        state: &NotificationState,
        notification: &Notification,
        _config: &ChannelConfig,
    ) -> Result<(), NotifierError> {
        self.record(RecordedCall::Update {
            environment_id: notification.environment_id,
            event_type: notification.event_type,
            external_id: state.external_message_id.clone(),
        })
        .await
    }
}
