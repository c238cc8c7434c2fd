//! Storage interfaces used by the notification engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use crate::{
    models::{
        ChannelConfig, ChannelOwner, CheckReport, DriftCheck, Environment, EnvironmentStatus,
        NotificationChannel, NotificationState, Project,
    },
    persistence::error::PersistenceError,
};

/// Outcome of atomically appending a check to an environment's history.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRecord {
    /// The persisted check.
    pub check: DriftCheck,
    /// The environment after its status cache was updated.
    pub environment: Environment,
    /// The environment status before this check.
    pub previous_status: EnvironmentStatus,
    /// Checks removed by retention in the same write.
    pub pruned: u64,
}

/// Projects, environments and their drift check history.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Returns the project with `key`, creating it with `name` if missing.
    async fn find_or_create_project(&self, key: &str, name: &str)
    -> Result<Project, PersistenceError>;

    /// Returns the environment `key` of a project, creating it with `name`
    /// if missing.
    async fn find_or_create_environment(
        &self,
        project_id: i64,
        key: &str,
        name: &str,
    ) -> Result<Environment, PersistenceError>;

    /// Looks up a project by id.
    async fn get_project(&self, project_id: i64) -> Result<Option<Project>, PersistenceError>;

    /// Looks up an environment by id.
    async fn get_environment(
        &self,
        environment_id: i64,
    ) -> Result<Option<Environment>, PersistenceError>;

    /// In one transaction: appends a check with the next execution number,
    /// updates the environment's status cache, and, when `retention_cutoff`
    /// is set, deletes that environment's checks created before it.
    async fn record_check(
        &self,
        environment_id: i64,
        report: &CheckReport,
        recorded_at: DateTime<Utc>,
        retention_cutoff: Option<DateTime<Utc>>,
    ) -> Result<CheckRecord, PersistenceError>;

    /// Looks up a check by id.
    async fn get_check(&self, check_id: i64) -> Result<Option<DriftCheck>, PersistenceError>;

    /// The most recently created check of an environment.
    async fn latest_check(
        &self,
        environment_id: i64,
    ) -> Result<Option<DriftCheck>, PersistenceError>;

    /// All checks of an environment in execution order.
    async fn list_checks(&self, environment_id: i64) -> Result<Vec<DriftCheck>, PersistenceError>;
}

/// Notification channel configuration.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Enabled channels directly owned by `owner`.
    async fn enabled_channels(
        &self,
        owner: ChannelOwner,
    ) -> Result<Vec<NotificationChannel>, PersistenceError>;

    /// The channel of `channel_kind` owned by `owner`, enabled or not.
    async fn find_channel(
        &self,
        owner: ChannelOwner,
        channel_kind: &str,
    ) -> Result<Option<NotificationChannel>, PersistenceError>;

    /// Creates or replaces the channel of `channel_kind` owned by `owner`.
    async fn upsert_channel(
        &self,
        owner: ChannelOwner,
        channel_kind: &str,
        enabled: bool,
        config: &ChannelConfig,
    ) -> Result<NotificationChannel, PersistenceError>;
}

/// Per (environment, channel kind) delivery state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationStateRepository: Send + Sync {
    /// Looks up the state of a pair without creating it.
    async fn find_state(
        &self,
        environment_id: i64,
        channel_kind: &str,
    ) -> Result<Option<NotificationState>, PersistenceError>;

    /// Returns the state of a pair, atomically creating an empty one if
    /// missing.
    async fn find_or_create_state(
        &self,
        environment_id: i64,
        channel_kind: &str,
    ) -> Result<NotificationState, PersistenceError>;

    /// Persists the mutable fields of `state`.
    async fn save_state(&self, state: &NotificationState) -> Result<(), PersistenceError>;
}
