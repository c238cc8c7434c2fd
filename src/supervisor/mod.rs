//! The Supervisor manages the lifecycle of the DriftHound service.
//!
//! It owns the long-running parts of the application and runs them as
//! supervised tasks:
//!
//! - the HTTP server accepting check submissions,
//! - the notification worker delivering status changes off the write path,
//! - a signal handler listening for Ctrl+C and SIGTERM.
//!
//! When a signal arrives or any task fails, the shared cancellation token is
//! cancelled. The server stops accepting requests, the worker drains its
//! queue, and the supervisor waits for both up to `shutdown_timeout`.

mod builder;

use std::sync::Arc;

pub use builder::SupervisorBuilder;
use thiserror::Error;
use tokio::{signal, sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    engine::{
        ingestion::IngestionService, notification_service::NotificationService,
        notification_worker::NotificationWorker,
    },
    http_server::{self, ServerError},
    models::StatusChange,
    notifiers::NotifierError,
    persistence::error::PersistenceError,
};

/// Represents the set of errors that can occur during the supervisor's
/// operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the `SupervisorBuilder`.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// A repository was not provided to the `SupervisorBuilder`.
    #[error("Missing repository for Supervisor")]
    MissingRepository,

    /// The database could not be prepared.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The channel adapters could not be created.
    #[error("Notifier setup failed: {0}")]
    Notifier(#[from] NotifierError),

    /// The HTTP server failed.
    #[error("HTTP server error: {0}")]
    Server(#[from] ServerError),
}

/// The primary runtime manager for the application.
pub struct Supervisor {
    config: Arc<AppConfig>,
    ingestion: Arc<IngestionService>,
    notification_service: Arc<NotificationService>,
    notification_rx: mpsc::Receiver<StatusChange>,
    cancellation_token: CancellationToken,
    join_set: JoinSet<()>,
}

impl Supervisor {
    /// Returns a new `SupervisorBuilder` instance.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    fn new(
        config: AppConfig,
        ingestion: Arc<IngestionService>,
        notification_service: Arc<NotificationService>,
        notification_rx: mpsc::Receiver<StatusChange>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            ingestion,
            notification_service,
            notification_rx,
            cancellation_token: CancellationToken::new(),
            join_set: JoinSet::new(),
        }
    }

    /// A handle that stops the supervisor when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Starts every service and runs until shutdown completes.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let signal_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            let ctrl_c = signal::ctrl_c();
            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to register SIGTERM handler.");
                        std::future::pending::<()>().await;
                    }
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
                _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
                _ = signal_token.cancelled() => return,
            }

            signal_token.cancel();
        });

        let server_config = Arc::clone(&self.config);
        let server_ingestion = Arc::clone(&self.ingestion);
        let server_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            if let Err(e) = http_server::run_server_from_config(
                server_config,
                server_ingestion,
                server_token.clone(),
            )
            .await
            {
                tracing::error!(error = %e, "HTTP server failed. Initiating shutdown.");
                server_token.cancel();
            }
        });

        let worker = NotificationWorker::new(
            Arc::clone(&self.notification_service),
            self.notification_rx,
            self.cancellation_token.clone(),
            self.config.shutdown_timeout,
        );
        self.join_set.spawn(worker.run());

        loop {
            tokio::select! {
                maybe_result = self.join_set.join_next() => match maybe_result {
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = ?e, "A critical task failed. Initiating shutdown.");
                        self.cancellation_token.cancel();
                    }
                    None => break,
                },
                _ = self.cancellation_token.cancelled() => break,
            }
        }

        tracing::info!("Waiting for supervised tasks to finish...");
        let shutdown_timeout = self.config.shutdown_timeout;
        let join_set = &mut self.join_set;
        let drain = async {
            while let Some(result) = join_set.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = ?e, "A task failed during shutdown.");
                }
            }
        };
        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            tracing::warn!(
                timeout = ?shutdown_timeout,
                "Tasks did not finish within the shutdown timeout, aborting them."
            );
            self.join_set.shutdown().await;
        }

        tracing::info!("Supervisor shutdown complete.");
        Ok(())
    }
}
