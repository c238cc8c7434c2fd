//! Health status shared by drift checks and environments.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The outcome of a single drift check, and the cached health of an
/// environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    /// No check has been recorded yet.
    #[default]
    Unknown,
    /// Infrastructure matches its declared state.
    Ok,
    /// Infrastructure differs from its declared state.
    Drift,
    /// The check itself failed to run.
    Error,
}

/// Returned when a status string is not one of the known values.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid status '{0}', expected one of: unknown, ok, drift, error")]
pub struct ParseStatusError(pub String);

impl EnvironmentStatus {
    /// The lowercase name used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentStatus::Unknown => "unknown",
            EnvironmentStatus::Ok => "ok",
            EnvironmentStatus::Drift => "drift",
            EnvironmentStatus::Error => "error",
        }
    }

    /// `drift` and `error` are the unhealthy states that can repeat laterally.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, EnvironmentStatus::Drift | EnvironmentStatus::Error)
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Ok(EnvironmentStatus::Unknown),
            "ok" => Ok(EnvironmentStatus::Ok),
            "drift" => Ok(EnvironmentStatus::Drift),
            "error" => Ok(EnvironmentStatus::Error),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}
