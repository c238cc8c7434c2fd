//! SQLite implementation of the repository traits.

use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

mod channels;
mod ledger;
mod notification_states;

use crate::{models::EnvironmentStatus, persistence::error::PersistenceError};

/// Repository backed by a SQLite connection pool. Implements every
/// repository trait of the persistence layer.
pub struct SqliteRepository {
    /// The SQLite connection pool used for database operations.
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connects to `database_url`, creating the database file if it does not
    /// exist. In-memory databases are served by a single connection so every
    /// caller sees the same data.
    #[tracing::instrument(level = "info")]
    pub async fn new(database_url: &str) -> Result<Self, PersistenceError> {
        tracing::debug!(database_url, "Attempting to connect to SQLite database.");
        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| PersistenceError::InvalidInput(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await
            .map_err(|e| {
                PersistenceError::OperationFailed(format!("Failed to connect to database: {e}"))
            })?;
        tracing::info!(database_url, "Successfully connected to SQLite database.");
        Ok(Self { pool })
    }

    /// Runs database migrations.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn run_migrations(&self) -> Result<(), PersistenceError> {
        tracing::debug!("Running database migrations.");
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run database migrations.");
            PersistenceError::MigrationError(e.to_string())
        })?;
        tracing::info!("Database migrations completed successfully.");
        Ok(())
    }

    /// Gets access to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the connection pool gracefully.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn close(&self) {
        tracing::debug!("Closing SQLite connection pool.");
        self.pool.close().await;
        tracing::info!("SQLite connection pool closed successfully.");
    }

    /// Awaits a query future, logging and converting its error.
    async fn execute_query_with_error_handling<F, T>(
        &self,
        operation: &str,
        query_fn: F,
    ) -> Result<T, PersistenceError>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        query_fn.await.map_err(|e| {
            tracing::error!(error = %e, operation = %operation, "Database operation failed.");
            PersistenceError::from(e)
        })
    }
}

/// Decodes a status column.
fn parse_status(value: &str) -> Result<EnvironmentStatus, PersistenceError> {
    value.parse().map_err(|e: crate::models::status::ParseStatusError| {
        PersistenceError::SerializationError(e.to_string())
    })
}

/// Decodes a JSON object column.
fn parse_json_object(
    value: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, PersistenceError> {
    Ok(serde_json::from_str(value)?)
}
