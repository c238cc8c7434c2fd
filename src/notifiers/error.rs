//! Error types for channel adapters.

use thiserror::Error;

use crate::http_client::HttpClientPoolError;

/// Failures of a single adapter call.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// The effective channel configuration lacks a required key or holds a
    /// value of the wrong type.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An update was requested for a state without an open message.
    #[error("No external message to update")]
    MissingMessageId,

    /// The remote API answered, but rejected the call.
    #[error("API error: {0}")]
    ApiError(String),

    /// The request could not be sent, even after retries.
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest_middleware::Error),

    /// The response body could not be read or decoded.
    #[error("Response error: {0}")]
    ResponseError(#[from] reqwest::Error),

    /// An error originating from the HTTP client pool.
    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] HttpClientPoolError),
}
