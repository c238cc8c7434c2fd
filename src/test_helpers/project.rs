//! Builders for `Project` and `Environment` instances in tests.

use chrono::Utc;

use crate::models::{Environment, EnvironmentStatus, Project};

/// A builder for creating `Project` instances in tests.
#[derive(Debug, Clone)]
pub struct ProjectBuilder {
    id: i64,
    name: String,
    key: String,
}

impl Default for ProjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectBuilder {
    /// Creates a builder for project 1, "Acme".
    pub fn new() -> Self {
        Self { id: 1, name: "Acme".to_string(), key: "acme".to_string() }
    }

    /// Sets the project id.
    pub fn id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Sets the key and display name.
    pub fn key(mut self, key: &str, name: &str) -> Self {
        self.key = key.to_string();
        self.name = name.to_string();
        self
    }

    /// Builds the `Project`.
    pub fn build(self) -> Project {
        Project { id: self.id, name: self.name, key: self.key, created_at: Utc::now() }
    }
}

/// A builder for creating `Environment` instances in tests.
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    id: i64,
    project_id: i64,
    name: String,
    key: String,
    status: EnvironmentStatus,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentBuilder {
    /// Creates a builder for environment 10, "Production", of project 1.
    pub fn new() -> Self {
        Self {
            id: 10,
            project_id: 1,
            name: "Production".to_string(),
            key: "production".to_string(),
            status: EnvironmentStatus::Unknown,
        }
    }

    /// Sets the environment id.
    pub fn id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Sets the owning project.
    pub fn project_id(mut self, project_id: i64) -> Self {
        self.project_id = project_id;
        self
    }

    /// Sets the key and display name.
    pub fn key(mut self, key: &str, name: &str) -> Self {
        self.key = key.to_string();
        self.name = name.to_string();
        self
    }

    /// Sets the current status.
    pub fn status(mut self, status: EnvironmentStatus) -> Self {
        self.status = status;
        self
    }

    /// Builds the `Environment`.
    pub fn build(self) -> Environment {
        Environment {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            key: self.key,
            status: self.status,
            last_checked_at: None,
            created_at: Utc::now(),
        }
    }
}
