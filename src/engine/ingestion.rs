//! The ingestion boundary: accepts a check report for a project and
//! environment key, records it, and queues the resulting status change.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::{
    ledger::{LedgerError, RecordedCheck, RetentionPolicy, StatusLedger},
    notification_worker::NotificationQueue,
};
use crate::{
    config::{AppConfig, NotificationDefaults},
    models::{
        ChannelOwner, ChannelSettings, CheckReport, Environment, NotificationChannel, Project,
        StatusChange,
        project::{KeyError, titleize, validate_key},
    },
    notifiers::SlackAdapter,
    persistence::{
        error::PersistenceError,
        traits::{ChannelRepository, LedgerRepository},
    },
};

/// Errors returned to the caller submitting a check.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// A project or environment key was rejected.
    #[error("Invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    /// The channel settings sent with the check were rejected.
    #[error("Invalid notification channel: {0}")]
    InvalidChannel(String),

    /// Recording the check failed; nothing was written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Provisioning the project, environment or channel failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedCheck {
    /// The check's project.
    pub project: Project,
    /// What the ledger recorded.
    pub recorded: RecordedCheck,
    /// The change handed to the notification worker, if any.
    pub status_change: Option<StatusChange>,
}

/// Accepts check reports.
pub struct IngestionService {
    repository: Arc<dyn LedgerRepository>,
    channels: Arc<dyn ChannelRepository>,
    ledger: StatusLedger<dyn LedgerRepository>,
    defaults: NotificationDefaults,
    queue: Option<NotificationQueue>,
}

impl IngestionService {
    /// Creates a service that records checks but queues nothing.
    pub fn new(
        repository: Arc<dyn LedgerRepository>,
        channels: Arc<dyn ChannelRepository>,
        retention: RetentionPolicy,
        defaults: NotificationDefaults,
    ) -> Self {
        Self {
            ledger: StatusLedger::new(Arc::clone(&repository), retention),
            repository,
            channels,
            defaults,
            queue: None,
        }
    }

    /// Wires a service over one repository with the configured retention
    /// and channel defaults.
    pub fn from_config<T>(config: &AppConfig, repository: Arc<T>) -> Self
    where
        T: LedgerRepository + ChannelRepository + 'static,
    {
        Self::new(
            repository.clone(),
            repository,
            RetentionPolicy::new(config.retention_days),
            config.notifications.clone(),
        )
    }

    /// Queues status changes onto `queue`.
    pub fn with_queue(mut self, queue: NotificationQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Records `report` for `environment_key` of `project_key`, creating
    /// both on first sight, then applies `channel` to the environment when
    /// given.
    ///
    /// The returned status change is set when the status changed or an
    /// unhealthy status repeated; it was already queued if a queue is
    /// attached. Queueing failures are logged and do not fail the call.
    ///
    /// A failed ledger write leaves the channel untouched. A failed channel
    /// write is returned as an error, but the check stays recorded and its
    /// status change is still queued.
    #[tracing::instrument(skip(self, report, channel), fields(status = %report.status))]
    pub async fn submit(
        &self,
        project_key: &str,
        environment_key: &str,
        report: &CheckReport,
        channel: Option<&ChannelSettings>,
    ) -> Result<IngestedCheck, IngestionError> {
        validate_key(project_key)?;
        validate_key(environment_key)?;
        if let Some(settings) = channel {
            validate_channel_settings(settings)?;
        }

        let project =
            self.repository.find_or_create_project(project_key, &titleize(project_key)).await?;
        let environment = self
            .repository
            .find_or_create_environment(project.id, environment_key, &titleize(environment_key))
            .await?;

        let recorded = self.ledger.record_check(environment.id, report).await?;

        let saved_channel = match channel {
            Some(settings) => Some(self.apply_channel_settings(&environment, settings).await),
            None => None,
        };

        let status_change =
            (recorded.status_changed() || recorded.is_lateral()).then(|| recorded.status_change());
        if let (Some(change), Some(queue)) = (status_change, &self.queue) {
            if let Err(e) = queue.enqueue(change) {
                tracing::error!(
                    error = %e,
                    environment_id = change.environment_id,
                    "Failed to queue status change."
                );
            }
        }

        if let Some(saved) = saved_channel.transpose()? {
            tracing::info!(
                channel_kind = %saved.channel_kind,
                enabled = saved.enabled,
                "Environment channel updated."
            );
        }

        Ok(IngestedCheck { project, recorded, status_change })
    }

    /// Creates or updates the environment's channel of `settings.channel_kind`.
    ///
    /// Slack channels keep their target channel unless a new one is given,
    /// falling back to the default channel. Tokens are never stored; they
    /// come from the defaults at delivery time.
    async fn apply_channel_settings(
        &self,
        environment: &Environment,
        settings: &ChannelSettings,
    ) -> Result<NotificationChannel, IngestionError> {
        let kind = settings.channel_kind.trim();
        let owner = ChannelOwner::Environment(environment.id);
        let existing = self.channels.find_channel(owner, kind).await?;
        let enabled =
            settings.enabled.or(existing.as_ref().map(|c| c.enabled)).unwrap_or(true);
        let mut config = existing.map(|c| c.config).unwrap_or_default();

        if kind == SlackAdapter::KIND {
            let requested = settings
                .config
                .as_ref()
                .and_then(|c| c.get("channel"))
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty());
            match requested {
                Some(target) => {
                    config.insert("channel".to_string(), Value::String(target.to_string()));
                }
                None if !config.contains_key("channel") => {
                    if let Some(default) =
                        self.defaults.for_kind(kind).and_then(|d| d.get("channel"))
                    {
                        config.insert("channel".to_string(), default.clone());
                    }
                }
                None => {}
            }
            config.remove("token");
        } else if let Some(extra) = &settings.config {
            config.extend(extra.clone());
        }

        Ok(self.channels.upsert_channel(owner, kind, enabled, &config).await?)
    }
}

fn validate_channel_settings(settings: &ChannelSettings) -> Result<(), IngestionError> {
    if settings.channel_kind.trim().is_empty() {
        return Err(IngestionError::InvalidChannel("channel_kind is required".to_string()));
    }
    Ok(())
}
