//! A builder for creating `DriftCheck` instances in tests.

use chrono::{DateTime, Utc};

use crate::models::{DriftCheck, EnvironmentStatus};

/// A builder for creating `DriftCheck` instances in tests.
#[derive(Debug, Clone)]
pub struct DriftCheckBuilder {
    id: i64,
    environment_id: i64,
    execution_number: i64,
    status: EnvironmentStatus,
    counts: Option<(i64, i64, i64)>,
    created_at: Option<DateTime<Utc>>,
}

impl Default for DriftCheckBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DriftCheckBuilder {
    /// Creates a builder for a clean first check of environment 10.
    pub fn new() -> Self {
        Self {
            id: 100,
            environment_id: 10,
            execution_number: 1,
            status: EnvironmentStatus::Ok,
            counts: None,
            created_at: None,
        }
    }

    /// Sets the check id.
    pub fn id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Sets the environment the check belongs to.
    pub fn environment_id(mut self, environment_id: i64) -> Self {
        self.environment_id = environment_id;
        self
    }

    /// Sets the execution number.
    pub fn execution_number(mut self, execution_number: i64) -> Self {
        self.execution_number = execution_number;
        self
    }

    /// Sets the reported status.
    pub fn status(mut self, status: EnvironmentStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the add, change and destroy counts.
    pub fn counts(mut self, add: i64, change: i64, destroy: i64) -> Self {
        self.counts = Some((add, change, destroy));
        self
    }

    /// Sets the creation time.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Builds the `DriftCheck`.
    pub fn build(self) -> DriftCheck {
        DriftCheck {
            id: self.id,
            environment_id: self.environment_id,
            execution_number: self.execution_number,
            status: self.status,
            add_count: self.counts.map(|c| c.0),
            change_count: self.counts.map(|c| c.1),
            destroy_count: self.counts.map(|c| c.2),
            duration: None,
            raw_output: None,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}
