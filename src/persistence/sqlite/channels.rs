use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{SqliteRepository, parse_json_object};
use crate::{
    models::{ChannelConfig, ChannelOwner, NotificationChannel},
    persistence::{error::PersistenceError, traits::ChannelRepository},
};

const CHANNEL_COLUMNS: &str =
    "channel_id, owner_kind, owner_id, channel_kind, enabled, config, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ChannelRow {
    channel_id: i64,
    owner_kind: String,
    owner_id: i64,
    channel_kind: String,
    enabled: bool,
    config: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ChannelRow> for NotificationChannel {
    type Error = PersistenceError;

    fn try_from(row: ChannelRow) -> Result<Self, Self::Error> {
        let owner = match row.owner_kind.as_str() {
            "project" => ChannelOwner::Project(row.owner_id),
            "environment" => ChannelOwner::Environment(row.owner_id),
            other =>
                return Err(PersistenceError::SerializationError(format!(
                    "unknown channel owner kind '{other}'"
                ))),
        };
        Ok(NotificationChannel {
            id: row.channel_id,
            owner,
            channel_kind: row.channel_kind,
            enabled: row.enabled,
            config: parse_json_object(&row.config)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ChannelRepository for SqliteRepository {
    #[tracing::instrument(skip(self), fields(owner = %owner), level = "debug")]
    async fn enabled_channels(
        &self,
        owner: ChannelOwner,
    ) -> Result<Vec<NotificationChannel>, PersistenceError> {
        let rows: Vec<ChannelRow> = self
            .execute_query_with_error_handling(
                "select enabled channels",
                sqlx::query_as(&format!(
                    "SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE owner_kind = ? AND \
                     owner_id = ? AND enabled = 1 ORDER BY channel_kind"
                ))
                .bind(owner.kind())
                .bind(owner.id())
                .fetch_all(&self.pool),
            )
            .await?;
        rows.into_iter().map(NotificationChannel::try_from).collect()
    }

    #[tracing::instrument(skip(self), fields(owner = %owner), level = "debug")]
    async fn find_channel(
        &self,
        owner: ChannelOwner,
        channel_kind: &str,
    ) -> Result<Option<NotificationChannel>, PersistenceError> {
        let row: Option<ChannelRow> = self
            .execute_query_with_error_handling(
                "select channel",
                sqlx::query_as(&format!(
                    "SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE owner_kind = ? AND \
                     owner_id = ? AND channel_kind = ?"
                ))
                .bind(owner.kind())
                .bind(owner.id())
                .bind(channel_kind)
                .fetch_optional(&self.pool),
            )
            .await?;
        row.map(NotificationChannel::try_from).transpose()
    }

    #[tracing::instrument(skip(self, config), fields(owner = %owner), level = "debug")]
    async fn upsert_channel(
        &self,
        owner: ChannelOwner,
        channel_kind: &str,
        enabled: bool,
        config: &ChannelConfig,
    ) -> Result<NotificationChannel, PersistenceError> {
        let config_json = serde_json::to_string(config)?;
        let now = Utc::now();
        let row: ChannelRow = self
            .execute_query_with_error_handling(
                "upsert channel",
                sqlx::query_as(&format!(
                    "INSERT INTO notification_channels (owner_kind, owner_id, channel_kind, \
                     enabled, config, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?) ON \
                     CONFLICT(owner_kind, owner_id, channel_kind) DO UPDATE SET enabled = \
                     excluded.enabled, config = excluded.config, updated_at = excluded.updated_at \
                     RETURNING {CHANNEL_COLUMNS}"
                ))
                .bind(owner.kind())
                .bind(owner.id())
                .bind(channel_kind)
                .bind(enabled)
                .bind(config_json)
                .bind(now)
                .bind(now)
                .fetch_one(&self.pool),
            )
            .await?;
        row.try_into()
    }
}
