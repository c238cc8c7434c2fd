//! Transient notification events produced by status transitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DriftCheck, Environment, EnvironmentStatus, Project};

/// The semantic meaning of a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The environment started drifting.
    DriftDetected,
    /// The environment stopped drifting.
    DriftResolved,
    /// Checks started failing.
    ErrorDetected,
    /// Checks stopped failing.
    ErrorResolved,
    /// Any other transition.
    Unknown,
}

/// How urgent a notification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Needs immediate attention.
    Critical,
    /// Needs attention.
    Warning,
    /// Informational.
    Info,
    /// Could not be classified.
    Unknown,
}

impl EventType {
    /// Resolution events update an open alert instead of posting a new one.
    pub fn is_resolution(&self) -> bool {
        matches!(self, EventType::DriftResolved | EventType::ErrorResolved)
    }

    /// Short title used as a message header.
    pub fn title(&self) -> &'static str {
        match self {
            EventType::DriftDetected => "Drift Detected",
            EventType::DriftResolved => "Drift Resolved",
            EventType::ErrorDetected => "Error Detected",
            EventType::ErrorResolved => "Error Resolved",
            EventType::Unknown => "Unknown Event",
        }
    }

    /// Emoji shown next to the title.
    pub fn icon(&self) -> &'static str {
        match self {
            EventType::DriftDetected => "🟡",
            EventType::ErrorDetected => "🔴",
            EventType::DriftResolved | EventType::ErrorResolved => "✅",
            EventType::Unknown => "ℹ️",
        }
    }

    /// Severity of the event.
    pub fn severity(&self) -> Severity {
        match self {
            EventType::ErrorDetected => Severity::Critical,
            EventType::DriftDetected => Severity::Warning,
            EventType::DriftResolved | EventType::ErrorResolved => Severity::Info,
            EventType::Unknown => Severity::Unknown,
        }
    }

    /// The snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DriftDetected => "drift_detected",
            EventType::DriftResolved => "drift_resolved",
            EventType::ErrorDetected => "error_detected",
            EventType::ErrorResolved => "error_resolved",
            EventType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The renderable projection of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDetails {
    /// Project display name.
    pub project: String,
    /// Environment display name.
    pub environment: String,
    /// The new status.
    pub status: EnvironmentStatus,
    /// Summary of planned changes, for drift.
    pub changes: Option<String>,
    /// Path of the environment page, relative to the application URL.
    pub url: String,
}

/// A status change worth telling someone about. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Environment the event is about.
    pub environment_id: i64,
    /// Environment key, for logging.
    pub environment_key: String,
    /// Meaning of the transition.
    pub event_type: EventType,
    /// Status before the triggering check.
    pub old_status: EnvironmentStatus,
    /// Status after the triggering check.
    pub new_status: EnvironmentStatus,
    /// The check that caused the transition, or the latest one.
    pub drift_check: Option<DriftCheck>,
    /// Renderable details.
    pub details: NotificationDetails,
}

impl Notification {
    /// Builds a notification for `environment`. `drift_check` should be the
    /// triggering check, or the environment's latest check when unknown.
    pub fn new(
        project: &Project,
        environment: &Environment,
        event_type: EventType,
        old_status: EnvironmentStatus,
        new_status: EnvironmentStatus,
        drift_check: Option<DriftCheck>,
    ) -> Self {
        let details = NotificationDetails {
            project: project.name.clone(),
            environment: environment.name.clone(),
            status: new_status,
            changes: drift_check.as_ref().and_then(DriftCheck::change_summary),
            url: format!("/projects/{}/environments/{}", project.key, environment.key),
        };
        Self {
            environment_id: environment.id,
            environment_key: environment.key.clone(),
            event_type,
            old_status,
            new_status,
            drift_check,
            details,
        }
    }

    /// Title with icon, also used as the fallback text of rich messages.
    pub fn headline(&self) -> String {
        format!("{} {}", self.event_type.icon(), self.event_type.title())
    }

    /// Plain-text rendering for channels without rich formatting.
    pub fn text_message(&self, app_url: &str) -> String {
        let mut lines = vec![
            self.headline(),
            String::new(),
            format!("Project: {}", self.details.project),
            format!("Environment: {}", self.details.environment),
            format!("Status: {}", self.details.status),
        ];
        if let Some(changes) = &self.details.changes {
            lines.push(format!("Changes: {changes}"));
        }
        lines.push(String::new());
        lines.push(format!("View details: {}{}", app_url.trim_end_matches('/'), self.details.url));
        lines.join("\n")
    }
}

/// The plain data handed to the background notification worker when a check
/// may have changed an environment's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Environment whose status was recomputed.
    pub environment_id: i64,
    /// Status before the check.
    pub old_status: EnvironmentStatus,
    /// Status after the check.
    pub new_status: EnvironmentStatus,
    /// The check that was recorded, when known.
    pub check_id: Option<i64>,
}
