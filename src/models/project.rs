//! Projects and environments, the owners of drift history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::EnvironmentStatus;

/// A project groups environments under a unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Database identifier.
    pub id: i64,
    /// Human readable name.
    pub name: String,
    /// Unique, URL-safe key.
    pub key: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A deployment target (e.g. `production`) within a project.
///
/// `status` and `last_checked_at` are a cache of the most recent drift check
/// and are only ever written by the status ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Database identifier.
    pub id: i64,
    /// Owning project.
    pub project_id: i64,
    /// Human readable name.
    pub name: String,
    /// Key, unique within the project.
    pub key: String,
    /// Status of the most recent check, or `unknown` if none exists.
    pub status: EnvironmentStatus,
    /// When the most recent check was recorded.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Rejected project or environment keys.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The key was empty.
    #[error("Key cannot be empty")]
    Empty,
    /// The key contained something other than alphanumerics, dashes and
    /// underscores.
    #[error("Key '{0}' only allows alphanumeric characters, dashes, and underscores")]
    InvalidCharacters(String),
}

/// Validates a project or environment key.
pub fn validate_key(key: &str) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(KeyError::InvalidCharacters(key.to_string()));
    }
    Ok(())
}

/// Derives a display name from a key: `my-app_prod` becomes `My App Prod`.
pub fn titleize(key: &str) -> String {
    key.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) =>
                    first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
