//! This module contains the data models for the DriftHound application.

pub mod channel;
pub mod drift_check;
pub mod notification;
pub mod notification_state;
pub mod project;
pub mod status;

pub use channel::{ChannelConfig, ChannelOwner, ChannelSettings, NotificationChannel};
pub use drift_check::{CheckReport, DriftCheck};
pub use notification::{EventType, Notification, NotificationDetails, Severity, StatusChange};
pub use notification_state::NotificationState;
pub use project::{Environment, Project};
pub use status::EnvironmentStatus;
