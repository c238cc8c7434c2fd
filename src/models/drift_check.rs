//! Drift check records and the report submitted by check runners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EnvironmentStatus;

/// The result of one drift check run, as submitted at ingestion time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    /// Overall outcome of the check.
    pub status: EnvironmentStatus,
    /// Resources the plan would add.
    #[serde(default)]
    pub add_count: Option<i64>,
    /// Resources the plan would change in place.
    #[serde(default)]
    pub change_count: Option<i64>,
    /// Resources the plan would destroy.
    #[serde(default)]
    pub destroy_count: Option<i64>,
    /// Run time of the check, in seconds.
    #[serde(default)]
    pub duration: Option<i64>,
    /// Raw tool output.
    #[serde(default)]
    pub raw_output: Option<String>,
}

/// A persisted drift check. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftCheck {
    /// Database identifier.
    pub id: i64,
    /// Environment this check belongs to.
    pub environment_id: i64,
    /// Per-environment sequence number, starting at 1.
    pub execution_number: i64,
    /// Outcome of the check.
    pub status: EnvironmentStatus,
    /// Resources to add.
    pub add_count: Option<i64>,
    /// Resources to change.
    pub change_count: Option<i64>,
    /// Resources to destroy.
    pub destroy_count: Option<i64>,
    /// Run time in seconds.
    pub duration: Option<i64>,
    /// Raw tool output.
    pub raw_output: Option<String>,
    /// When the check was recorded.
    pub created_at: DateTime<Utc>,
}

impl DriftCheck {
    /// A short human summary of planned changes. Only drift checks have one.
    pub fn change_summary(&self) -> Option<String> {
        if self.status != EnvironmentStatus::Drift {
            return None;
        }
        if self.add_count.is_none() && self.change_count.is_none() && self.destroy_count.is_none()
        {
            return Some("No changes specified".to_string());
        }

        let parts: Vec<String> = [
            (self.add_count, "to add"),
            (self.change_count, "to change"),
            (self.destroy_count, "to destroy"),
        ]
        .into_iter()
        .filter_map(|(count, label)| match count {
            Some(n) if n > 0 => Some(format!("{n} {label}")),
            _ => None,
        })
        .collect();

        if parts.is_empty() { Some("No changes".to_string()) } else { Some(parts.join(", ")) }
    }
}
