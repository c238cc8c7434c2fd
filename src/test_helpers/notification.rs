//! A builder for creating `Notification` instances in tests.

use crate::models::{EnvironmentStatus, EventType, Notification};

use super::{DriftCheckBuilder, EnvironmentBuilder, ProjectBuilder};

/// A builder for creating `Notification` instances in tests.
///
/// Defaults to a drift alert for "Acme" / "Production".
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    environment_id: i64,
    event_type: EventType,
    old_status: EnvironmentStatus,
    new_status: EnvironmentStatus,
    changes: Option<String>,
}

impl Default for NotificationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBuilder {
    /// Creates a new `NotificationBuilder`.
    pub fn new() -> Self {
        Self {
            environment_id: 10,
            event_type: EventType::DriftDetected,
            old_status: EnvironmentStatus::Ok,
            new_status: EnvironmentStatus::Drift,
            changes: None,
        }
    }

    /// Sets the environment the notification is about.
    pub fn environment_id(mut self, environment_id: i64) -> Self {
        self.environment_id = environment_id;
        self
    }

    /// Sets the event and the transition behind it.
    pub fn event(
        mut self,
        event_type: EventType,
        old_status: EnvironmentStatus,
        new_status: EnvironmentStatus,
    ) -> Self {
        self.event_type = event_type;
        self.old_status = old_status;
        self.new_status = new_status;
        self
    }

    /// Sets the change summary shown in the message.
    pub fn changes(mut self, changes: &str) -> Self {
        self.changes = Some(changes.to_string());
        self
    }

    /// Builds the `Notification`.
    pub fn build(self) -> Notification {
        let project = ProjectBuilder::new().build();
        let environment = EnvironmentBuilder::new()
            .id(self.environment_id)
            .project_id(project.id)
            .status(self.new_status)
            .build();
        let check = DriftCheckBuilder::new()
            .environment_id(self.environment_id)
            .status(self.new_status)
            .build();
        let mut notification = Notification::new(
            &project,
            &environment,
            self.event_type,
            self.old_status,
            self.new_status,
            Some(check),
        );
        notification.details.changes = self.changes;
        notification
    }
}
