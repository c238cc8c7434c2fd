//! HTTP server module

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{config::AppConfig, engine::ingestion::IngestionService};

mod auth;
mod checks;
mod error;

pub use error::ApiError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Records submitted checks.
    pub ingestion: Arc<IngestionService>,
}

/// Errors that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `server.listen_address` is not a socket address.
    #[error("Invalid listen address '{0}': {1}")]
    InvalidAddress(String, std::net::AddrParseError),

    /// Binding or serving failed.
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Builds the router. Everything under `/api` requires the bearer token.
pub fn router(state: ApiState) -> Router {
    let api = Router::new()
        .route(
            "/api/v1/projects/{project_key}/environments/{environment_key}/checks",
            post(checks::create_check),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::auth));

    Router::new().route("/health", get(health)).merge(api).with_state(state)
}

/// Serves the API on `server.listen_address` until `cancellation_token`
/// fires, then finishes in-flight requests and returns.
pub async fn run_server_from_config(
    config: Arc<AppConfig>,
    ingestion: Arc<IngestionService>,
    cancellation_token: CancellationToken,
) -> Result<(), ServerError> {
    let listen_address = config.server.listen_address.clone();
    let addr: SocketAddr = listen_address
        .parse()
        .map_err(|e| ServerError::InvalidAddress(listen_address.clone(), e))?;

    if config.server.api_key.is_none() {
        tracing::warn!("No API key configured, check submissions will be rejected.");
    }

    let app = router(ApiState { config, ingestion });
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "HTTP server listening.");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await?;

    tracing::info!("HTTP server stopped.");
    Ok(())
}
