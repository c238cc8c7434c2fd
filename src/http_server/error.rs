//! Defines the custom `ApiError` type for the HTTP server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::{
    engine::{ingestion::IngestionError, ledger::LedgerError},
    persistence::error::PersistenceError,
};

/// A custom error type for the API that can be converted into an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    /// Represents an unauthorized request.
    Unauthorized,

    /// Represents a resource that could not be found.
    NotFound(String),

    /// Represents a validation error for an unprocessable entity.
    UnprocessableEntity(String),

    /// Represents a generic internal server error.
    InternalServerError(String),
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(what) => ApiError::NotFound(what),
            PersistenceError::InvalidInput(message) => ApiError::UnprocessableEntity(message),
            _ => ApiError::InternalServerError(err.to_string()),
        }
    }
}

impl From<IngestionError> for ApiError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::InvalidKey(e) => ApiError::UnprocessableEntity(e.to_string()),
            IngestionError::InvalidChannel(message) => ApiError::UnprocessableEntity(message),
            IngestionError::Ledger(LedgerError::EnvironmentNotFound(id)) =>
                ApiError::NotFound(format!("Environment {id} not found")),
            IngestionError::Ledger(LedgerError::Persistence(e)) | IngestionError::Persistence(e) =>
                e.into(),
        }
    }
}

/// Maps application errors to user-facing HTTP responses.
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::Unauthorized =>
                (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" })),
            ApiError::InternalServerError(err) => {
                tracing::error!(error = %err, "Internal server error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An internal server error occurred" }),
                )
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::UnprocessableEntity(message) =>
                (StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": message })),
        };

        (status, Json(body)).into_response()
    }
}
