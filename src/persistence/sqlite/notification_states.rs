use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{SqliteRepository, parse_json_object, parse_status};
use crate::{
    models::NotificationState,
    persistence::{error::PersistenceError, traits::NotificationStateRepository},
};

const STATE_COLUMNS: &str = "state_id, environment_id, channel_kind, external_message_id, \
                             last_notified_status, metadata, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct StateRow {
    state_id: i64,
    environment_id: i64,
    channel_kind: String,
    external_message_id: Option<String>,
    last_notified_status: Option<String>,
    metadata: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StateRow> for NotificationState {
    type Error = PersistenceError;

    fn try_from(row: StateRow) -> Result<Self, Self::Error> {
        Ok(NotificationState {
            id: row.state_id,
            environment_id: row.environment_id,
            channel_kind: row.channel_kind,
            external_message_id: row.external_message_id,
            last_notified_status: row.last_notified_status.as_deref().map(parse_status).transpose()?,
            metadata: parse_json_object(&row.metadata)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl NotificationStateRepository for SqliteRepository {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn find_state(
        &self,
        environment_id: i64,
        channel_kind: &str,
    ) -> Result<Option<NotificationState>, PersistenceError> {
        let row: Option<StateRow> = self
            .execute_query_with_error_handling(
                "select notification state",
                sqlx::query_as(&format!(
                    "SELECT {STATE_COLUMNS} FROM notification_states WHERE environment_id = ? AND \
                     channel_kind = ?"
                ))
                .bind(environment_id)
                .bind(channel_kind)
                .fetch_optional(&self.pool),
            )
            .await?;
        row.map(NotificationState::try_from).transpose()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn find_or_create_state(
        &self,
        environment_id: i64,
        channel_kind: &str,
    ) -> Result<NotificationState, PersistenceError> {
        let now = Utc::now();
        self.execute_query_with_error_handling(
            "insert notification state",
            sqlx::query(
                "INSERT INTO notification_states (environment_id, channel_kind, metadata, \
                 created_at, updated_at) VALUES (?, ?, '{}', ?, ?) ON CONFLICT(environment_id, \
                 channel_kind) DO NOTHING",
            )
            .bind(environment_id)
            .bind(channel_kind)
            .bind(now)
            .bind(now)
            .execute(&self.pool),
        )
        .await?;

        self.find_state(environment_id, channel_kind).await?.ok_or_else(|| {
            PersistenceError::NotFound(format!(
                "notification state for environment {environment_id} and channel {channel_kind}"
            ))
        })
    }

    #[tracing::instrument(skip(self, state), fields(environment_id = state.environment_id, channel_kind = %state.channel_kind), level = "debug")]
    async fn save_state(&self, state: &NotificationState) -> Result<(), PersistenceError> {
        let metadata = serde_json::to_string(&state.metadata)?;
        let result = self
            .execute_query_with_error_handling(
                "update notification state",
                sqlx::query(
                    "UPDATE notification_states SET external_message_id = ?, \
                     last_notified_status = ?, metadata = ?, updated_at = ? WHERE environment_id \
                     = ? AND channel_kind = ?",
                )
                .bind(state.external_message_id.as_deref())
                .bind(state.last_notified_status.map(|s| s.as_str()))
                .bind(metadata)
                .bind(state.updated_at)
                .bind(state.environment_id)
                .bind(&state.channel_kind)
                .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!(
                "notification state for environment {} and channel {}",
                state.environment_id, state.channel_kind
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{models::EnvironmentStatus, persistence::traits::LedgerRepository};

    async fn setup() -> (SqliteRepository, i64) {
        let repo = SqliteRepository::new("sqlite::memory:").await.unwrap();
        repo.run_migrations().await.unwrap();
        let project = repo.find_or_create_project("acme", "Acme").await.unwrap();
        let env = repo.find_or_create_environment(project.id, "prod", "Prod").await.unwrap();
        (repo, env.id)
    }

    #[tokio::test]
    async fn test_find_or_create_state_creates_once() {
        let (repo, env_id) = setup().await;
        assert!(repo.find_state(env_id, "slack").await.unwrap().is_none());

        let first = repo.find_or_create_state(env_id, "slack").await.unwrap();
        let second = repo.find_or_create_state(env_id, "slack").await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(!first.is_open());
        assert!(first.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_save_state_round_trips_fields() {
        let (repo, env_id) = setup().await;
        let mut state = repo.find_or_create_state(env_id, "slack").await.unwrap();
        let mut extra = serde_json::Map::new();
        extra.insert("channel_id".to_string(), json!("C1"));
        state.mark_sent("123.456".to_string(), EnvironmentStatus::Error, extra, Utc::now());

        repo.save_state(&state).await.unwrap();

        let loaded = repo.find_state(env_id, "slack").await.unwrap().unwrap();
        assert_eq!(loaded.external_message_id.as_deref(), Some("123.456"));
        assert_eq!(loaded.last_notified_status, Some(EnvironmentStatus::Error));
        assert_eq!(loaded.metadata["channel_id"], "C1");
        assert!(loaded.last_sent_at().is_some());

        let mut resolved = loaded.clone();
        resolved.mark_resolved(Utc::now());
        repo.save_state(&resolved).await.unwrap();
        let loaded = repo.find_state(env_id, "slack").await.unwrap().unwrap();
        assert!(!loaded.is_open());
        assert!(loaded.last_notified_status.is_none());
        assert!(loaded.resolved_at().is_some());
    }

    #[tokio::test]
    async fn test_save_state_without_row_fails() {
        let (repo, env_id) = setup().await;
        let state = NotificationState::new(env_id, "slack");
        assert!(matches!(repo.save_state(&state).await, Err(PersistenceError::NotFound(_))));
    }
}
