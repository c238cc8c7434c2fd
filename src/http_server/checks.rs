//! Handler for check submissions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiState};
use crate::models::{ChannelSettings, CheckReport};

/// Body of `POST .../checks`: the report plus an optional channel change.
#[derive(Debug, Deserialize)]
pub struct CreateCheckRequest {
    /// The check result.
    #[serde(flatten)]
    pub report: CheckReport,
    /// Creates or updates the environment's channel of that kind.
    #[serde(default)]
    pub notification_channel: Option<ChannelSettings>,
}

/// Records a check for an environment, provisioning the project and
/// environment on first use.
pub async fn create_check(
    State(state): State<ApiState>,
    Path((project_key, environment_key)): Path<(String, String)>,
    Json(payload): Json<CreateCheckRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ingested = state
        .ingestion
        .submit(
            &project_key,
            &environment_key,
            &payload.report,
            payload.notification_channel.as_ref(),
        )
        .await?;

    let check = &ingested.recorded.check;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": check.id,
            "project_key": ingested.project.key,
            "environment_key": ingested.recorded.environment.key,
            "status": check.status,
            "execution_number": check.execution_number,
            "created_at": check.created_at,
            "status_changed": ingested.recorded.status_changed(),
        })),
    ))
}
