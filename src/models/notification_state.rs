//! Per (environment, channel kind) delivery bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EnvironmentStatus;

/// Metadata key holding the RFC 3339 time of the last posted alert.
pub const LAST_SENT_AT: &str = "last_sent_at";

/// Metadata key holding the RFC 3339 time the last alert was resolved.
pub const RESOLVED_AT: &str = "resolved_at";

/// Tracks whether an alert is currently open on a channel for an environment,
/// and when one was last sent.
///
/// `external_message_id` is set only while an alert is open: from a successful
/// delivery until the matching resolution update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationState {
    /// Database identifier.
    pub id: i64,
    /// Environment the alert is about.
    pub environment_id: i64,
    /// Adapter kind the alert was sent through.
    pub channel_kind: String,
    /// Identifier of the external message, present while the alert is open.
    pub external_message_id: Option<String>,
    /// Status reported by the open alert.
    pub last_notified_status: Option<EnvironmentStatus>,
    /// Free-form history, always JSON object shaped.
    pub metadata: serde_json::Map<String, Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl NotificationState {
    /// A fresh, closed state for the given pair.
    pub fn new(environment_id: i64, channel_kind: &str) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            environment_id,
            channel_kind: channel_kind.to_string(),
            external_message_id: None,
            last_notified_status: None,
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether an external alert message currently exists.
    pub fn is_open(&self) -> bool {
        self.external_message_id.is_some()
    }

    /// When an alert was last posted on this channel, if ever.
    pub fn last_sent_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(LAST_SENT_AT)
    }

    /// When the last alert was resolved, if ever.
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(RESOLVED_AT)
    }

    fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Records a newly posted alert. Extra metadata returned by the adapter is
    /// merged in before `last_sent_at` is refreshed.
    pub fn mark_sent(
        &mut self,
        external_id: String,
        status: EnvironmentStatus,
        extra: serde_json::Map<String, Value>,
        now: DateTime<Utc>,
    ) {
        self.external_message_id = Some(external_id);
        self.last_notified_status = Some(status);
        self.metadata.extend(extra);
        self.metadata.insert(LAST_SENT_AT.to_string(), Value::String(now.to_rfc3339()));
        self.updated_at = now;
    }

    /// Closes the open alert. `last_sent_at` is kept as history.
    pub fn mark_resolved(&mut self, now: DateTime<Utc>) {
        self.external_message_id = None;
        self.last_notified_status = None;
        self.metadata.insert(RESOLVED_AT.to_string(), Value::String(now.to_rfc3339()));
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_new_state_is_closed() {
        let state = NotificationState::new(1, "slack");
        assert!(!state.is_open());
        assert!(state.last_sent_at().is_none());
        assert!(state.metadata.is_empty());
    }

    #[test]
    fn test_mark_sent_then_resolved_keeps_history() {
        let mut state = NotificationState::new(1, "slack");
        let sent = Utc::now() - Duration::hours(2);
        let mut extra = serde_json::Map::new();
        extra.insert("channel_id".to_string(), json!("C123"));

        state.mark_sent("1700000000.0001".to_string(), EnvironmentStatus::Drift, extra, sent);
        assert!(state.is_open());
        assert_eq!(state.last_notified_status, Some(EnvironmentStatus::Drift));
        assert_eq!(state.metadata["channel_id"], "C123");
        let recorded = state.last_sent_at().unwrap();
        assert_eq!(recorded.timestamp(), sent.timestamp());

        let resolved = Utc::now();
        state.mark_resolved(resolved);
        assert!(!state.is_open());
        assert!(state.last_notified_status.is_none());
        assert_eq!(state.last_sent_at().unwrap().timestamp(), sent.timestamp());
        assert_eq!(state.resolved_at().unwrap().timestamp(), resolved.timestamp());
    }

    #[test]
    fn test_unparseable_timestamp_is_ignored() {
        let mut state = NotificationState::new(1, "slack");
        state.metadata.insert(LAST_SENT_AT.to_string(), json!("yesterday"));
        assert!(state.last_sent_at().is_none());
    }
}
