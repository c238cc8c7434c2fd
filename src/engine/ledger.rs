//! The status ledger: appends checks and keeps each environment's status in
//! step with its most recent check.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{
    models::{CheckReport, DriftCheck, Environment, EnvironmentStatus, StatusChange},
    persistence::{
        error::PersistenceError,
        traits::{CheckRecord, LedgerRepository},
    },
};

/// Errors returned by the status ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The environment does not exist.
    #[error("Environment {0} not found")]
    EnvironmentNotFound(i64),

    /// The write failed. Nothing was recorded.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// How long drift check history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    days: u32,
}

impl RetentionPolicy {
    /// Keeps `days` of history; `0` keeps everything.
    pub fn new(days: u32) -> Self {
        Self { days }
    }

    /// Keeps everything.
    pub fn disabled() -> Self {
        Self { days: 0 }
    }

    /// Whether old checks are deleted at all.
    pub fn is_enabled(&self) -> bool {
        self.days > 0
    }

    /// Checks created strictly before the returned instant are deleted.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.is_enabled().then(|| now - Duration::days(i64::from(self.days)))
    }
}

/// A check as seen by the ledger after it was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCheck {
    /// The new check.
    pub check: DriftCheck,
    /// The environment with its refreshed status.
    pub environment: Environment,
    /// Status before this check.
    pub previous_status: EnvironmentStatus,
    /// Old checks deleted by retention.
    pub pruned: u64,
}

impl RecordedCheck {
    /// Whether the environment's status changed.
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.check.status
    }

    /// The environment stayed drifting or erroring across this check.
    pub fn is_lateral(&self) -> bool {
        self.previous_status == self.check.status && self.check.status.is_unhealthy()
    }

    /// The plain event handed to the notification worker.
    pub fn status_change(&self) -> StatusChange {
        StatusChange {
            environment_id: self.environment.id,
            old_status: self.previous_status,
            new_status: self.check.status,
            check_id: Some(self.check.id),
        }
    }
}

impl From<CheckRecord> for RecordedCheck {
    fn from(record: CheckRecord) -> Self {
        Self {
            check: record.check,
            environment: record.environment,
            previous_status: record.previous_status,
            pruned: record.pruned,
        }
    }
}

/// Owns all writes to drift check history.
pub struct StatusLedger<R: LedgerRepository + ?Sized> {
    repository: Arc<R>,
    retention: RetentionPolicy,
}

impl<R: LedgerRepository + ?Sized> StatusLedger<R> {
    /// Creates a ledger over `repository`.
    pub fn new(repository: Arc<R>, retention: RetentionPolicy) -> Self {
        Self { repository, retention }
    }

    /// The active retention policy.
    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Records a check for `environment_id`.
    ///
    /// The check, the environment's status and retention are written
    /// together; on error nothing changed.
    #[tracing::instrument(skip(self, report), fields(status = %report.status), level = "debug")]
    pub async fn record_check(
        &self,
        environment_id: i64,
        report: &CheckReport,
    ) -> Result<RecordedCheck, LedgerError> {
        let now = Utc::now();
        let record = self
            .repository
            .record_check(environment_id, report, now, self.retention.cutoff(now))
            .await
            .map_err(|e| match e {
                PersistenceError::NotFound(_) => LedgerError::EnvironmentNotFound(environment_id),
                other => LedgerError::Persistence(other),
            })?;

        let recorded = RecordedCheck::from(record);
        if recorded.pruned > 0 {
            tracing::info!(
                environment_id,
                pruned = recorded.pruned,
                retention_days = self.retention.days,
                "Deleted drift checks past retention."
            );
        }
        tracing::debug!(
            environment_id,
            execution_number = recorded.check.execution_number,
            previous_status = %recorded.previous_status,
            "Check recorded."
        );
        Ok(recorded)
    }
}
