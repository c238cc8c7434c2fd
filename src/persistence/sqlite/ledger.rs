use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{SqliteRepository, parse_status};
use crate::{
    models::{CheckReport, DriftCheck, Environment, Project},
    persistence::{
        error::PersistenceError,
        traits::{CheckRecord, LedgerRepository},
    },
};

const ENVIRONMENT_COLUMNS: &str =
    "environment_id, project_id, name, key, status, last_checked_at, created_at";

const CHECK_COLUMNS: &str = "check_id, environment_id, execution_number, status, add_count, \
                             change_count, destroy_count, duration, raw_output, created_at";

#[derive(sqlx::FromRow)]
struct ProjectRow {
    project_id: i64,
    name: String,
    key: String,
    created_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project { id: row.project_id, name: row.name, key: row.key, created_at: row.created_at }
    }
}

#[derive(sqlx::FromRow)]
struct EnvironmentRow {
    environment_id: i64,
    project_id: i64,
    name: String,
    key: String,
    status: String,
    last_checked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EnvironmentRow> for Environment {
    type Error = PersistenceError;

    fn try_from(row: EnvironmentRow) -> Result<Self, Self::Error> {
        Ok(Environment {
            id: row.environment_id,
            project_id: row.project_id,
            name: row.name,
            key: row.key,
            status: parse_status(&row.status)?,
            last_checked_at: row.last_checked_at,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DriftCheckRow {
    check_id: i64,
    environment_id: i64,
    execution_number: i64,
    status: String,
    add_count: Option<i64>,
    change_count: Option<i64>,
    destroy_count: Option<i64>,
    duration: Option<i64>,
    raw_output: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DriftCheckRow> for DriftCheck {
    type Error = PersistenceError;

    fn try_from(row: DriftCheckRow) -> Result<Self, Self::Error> {
        Ok(DriftCheck {
            id: row.check_id,
            environment_id: row.environment_id,
            execution_number: row.execution_number,
            status: parse_status(&row.status)?,
            add_count: row.add_count,
            change_count: row.change_count,
            destroy_count: row.destroy_count,
            duration: row.duration,
            raw_output: row.raw_output,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl LedgerRepository for SqliteRepository {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn find_or_create_project(
        &self,
        key: &str,
        name: &str,
    ) -> Result<Project, PersistenceError> {
        self.execute_query_with_error_handling(
            "insert project",
            sqlx::query(
                "INSERT INTO projects (name, key, created_at) VALUES (?, ?, ?) ON CONFLICT(key) \
                 DO NOTHING",
            )
            .bind(name)
            .bind(key)
            .bind(Utc::now())
            .execute(&self.pool),
        )
        .await?;

        let row: ProjectRow = self
            .execute_query_with_error_handling(
                "select project by key",
                sqlx::query_as(
                    "SELECT project_id, name, key, created_at FROM projects WHERE key = ?",
                )
                .bind(key)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(row.into())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn find_or_create_environment(
        &self,
        project_id: i64,
        key: &str,
        name: &str,
    ) -> Result<Environment, PersistenceError> {
        self.execute_query_with_error_handling(
            "insert environment",
            sqlx::query(
                "INSERT INTO environments (project_id, name, key, created_at) VALUES (?, ?, ?, ?) \
                 ON CONFLICT(project_id, key) DO NOTHING",
            )
            .bind(project_id)
            .bind(name)
            .bind(key)
            .bind(Utc::now())
            .execute(&self.pool),
        )
        .await?;

        let row: EnvironmentRow = self
            .execute_query_with_error_handling(
                "select environment by key",
                sqlx::query_as(&format!(
                    "SELECT {ENVIRONMENT_COLUMNS} FROM environments WHERE project_id = ? AND key = ?"
                ))
                .bind(project_id)
                .bind(key)
                .fetch_one(&self.pool),
            )
            .await?;
        row.try_into()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_project(&self, project_id: i64) -> Result<Option<Project>, PersistenceError> {
        let row: Option<ProjectRow> = self
            .execute_query_with_error_handling(
                "select project",
                sqlx::query_as(
                    "SELECT project_id, name, key, created_at FROM projects WHERE project_id = ?",
                )
                .bind(project_id)
                .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.map(Project::from))
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_environment(
        &self,
        environment_id: i64,
    ) -> Result<Option<Environment>, PersistenceError> {
        let row: Option<EnvironmentRow> = self
            .execute_query_with_error_handling(
                "select environment",
                sqlx::query_as(&format!(
                    "SELECT {ENVIRONMENT_COLUMNS} FROM environments WHERE environment_id = ?"
                ))
                .bind(environment_id)
                .fetch_optional(&self.pool),
            )
            .await?;
        row.map(Environment::try_from).transpose()
    }

    #[tracing::instrument(skip(self, report), fields(status = %report.status), level = "debug")]
    async fn record_check(
        &self,
        environment_id: i64,
        report: &CheckReport,
        recorded_at: DateTime<Utc>,
        retention_cutoff: Option<DateTime<Utc>>,
    ) -> Result<CheckRecord, PersistenceError> {
        if self.get_environment(environment_id).await?.is_none() {
            return Err(PersistenceError::NotFound(format!("environment {environment_id}")));
        }

        let mut tx = self.pool.begin().await?;

        // The insert comes first so the transaction takes the write lock
        // before anything is read.
        let check_row: DriftCheckRow = sqlx::query_as(&format!(
            "INSERT INTO drift_checks (environment_id, execution_number, status, add_count, \
             change_count, destroy_count, duration, raw_output, created_at) VALUES (?, (SELECT \
             COALESCE(MAX(execution_number), 0) + 1 FROM drift_checks WHERE environment_id = ?), \
             ?, ?, ?, ?, ?, ?, ?) RETURNING {CHECK_COLUMNS}"
        ))
        .bind(environment_id)
        .bind(environment_id)
        .bind(report.status.as_str())
        .bind(report.add_count)
        .bind(report.change_count)
        .bind(report.destroy_count)
        .bind(report.duration)
        .bind(report.raw_output.as_deref())
        .bind(recorded_at)
        .fetch_one(&mut *tx)
        .await?;

        let (previous,): (String,) =
            sqlx::query_as("SELECT status FROM environments WHERE environment_id = ?")
                .bind(environment_id)
                .fetch_one(&mut *tx)
                .await?;

        let environment_row: EnvironmentRow = sqlx::query_as(&format!(
            "UPDATE environments SET status = ?, last_checked_at = ? WHERE environment_id = ? \
             RETURNING {ENVIRONMENT_COLUMNS}"
        ))
        .bind(report.status.as_str())
        .bind(recorded_at)
        .bind(environment_id)
        .fetch_one(&mut *tx)
        .await?;

        let pruned = match retention_cutoff {
            Some(cutoff) =>
                sqlx::query("DELETE FROM drift_checks WHERE environment_id = ? AND created_at < ?")
                    .bind(environment_id)
                    .bind(cutoff)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected(),
            None => 0,
        };

        tx.commit().await?;

        let record = CheckRecord {
            check: check_row.try_into()?,
            environment: environment_row.try_into()?,
            previous_status: parse_status(&previous)?,
            pruned,
        };
        tracing::debug!(
            check_id = record.check.id,
            execution_number = record.check.execution_number,
            previous_status = %record.previous_status,
            pruned,
            "Recorded drift check."
        );
        Ok(record)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_check(&self, check_id: i64) -> Result<Option<DriftCheck>, PersistenceError> {
        let row: Option<DriftCheckRow> = self
            .execute_query_with_error_handling(
                "select check",
                sqlx::query_as(&format!("SELECT {CHECK_COLUMNS} FROM drift_checks WHERE check_id = ?"))
                    .bind(check_id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        row.map(DriftCheck::try_from).transpose()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn latest_check(
        &self,
        environment_id: i64,
    ) -> Result<Option<DriftCheck>, PersistenceError> {
        let row: Option<DriftCheckRow> = self
            .execute_query_with_error_handling(
                "select latest check",
                sqlx::query_as(&format!(
                    "SELECT {CHECK_COLUMNS} FROM drift_checks WHERE environment_id = ? ORDER BY \
                     execution_number DESC LIMIT 1"
                ))
                .bind(environment_id)
                .fetch_optional(&self.pool),
            )
            .await?;
        row.map(DriftCheck::try_from).transpose()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn list_checks(&self, environment_id: i64) -> Result<Vec<DriftCheck>, PersistenceError> {
        let rows: Vec<DriftCheckRow> = self
            .execute_query_with_error_handling(
                "list checks",
                sqlx::query_as(&format!(
                    "SELECT {CHECK_COLUMNS} FROM drift_checks WHERE environment_id = ? ORDER BY \
                     execution_number"
                ))
                .bind(environment_id)
                .fetch_all(&self.pool),
            )
            .await?;
        rows.into_iter().map(DriftCheck::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::EnvironmentStatus;

    async fn setup_repo() -> SqliteRepository {
        let repo = SqliteRepository::new("sqlite::memory:").await.unwrap();
        repo.run_migrations().await.unwrap();
        repo
    }

    async fn setup_environment(repo: &SqliteRepository) -> Environment {
        let project = repo.find_or_create_project("acme", "Acme").await.unwrap();
        repo.find_or_create_environment(project.id, "production", "Production").await.unwrap()
    }

    fn report(status: EnvironmentStatus) -> CheckReport {
        CheckReport { status, ..Default::default() }
    }

    #[tokio::test]
    async fn test_find_or_create_project_is_idempotent() {
        let repo = setup_repo().await;
        let first = repo.find_or_create_project("acme", "Acme").await.unwrap();
        let second = repo.find_or_create_project("acme", "Other Name").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.name, "Acme");
        assert_eq!(repo.get_project(first.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_environment_keys_are_scoped_to_project() {
        let repo = setup_repo().await;
        let a = repo.find_or_create_project("a", "A").await.unwrap();
        let b = repo.find_or_create_project("b", "B").await.unwrap();
        let env_a = repo.find_or_create_environment(a.id, "prod", "Prod").await.unwrap();
        let env_b = repo.find_or_create_environment(b.id, "prod", "Prod").await.unwrap();
        assert_ne!(env_a.id, env_b.id);
        assert_eq!(env_a.status, EnvironmentStatus::Unknown);
        assert!(env_a.last_checked_at.is_none());
    }

    #[tokio::test]
    async fn test_record_check_updates_status_and_numbers() {
        let repo = setup_repo().await;
        let env = setup_environment(&repo).await;
        let now = Utc::now();

        let first = repo.record_check(env.id, &report(EnvironmentStatus::Ok), now, None).await.unwrap();
        assert_eq!(first.check.execution_number, 1);
        assert_eq!(first.previous_status, EnvironmentStatus::Unknown);
        assert_eq!(first.environment.status, EnvironmentStatus::Ok);
        assert_eq!(first.environment.last_checked_at.map(|t| t.timestamp()), Some(now.timestamp()));

        let drift = CheckReport {
            status: EnvironmentStatus::Drift,
            add_count: Some(1),
            change_count: Some(2),
            destroy_count: Some(0),
            duration: Some(12),
            raw_output: Some("Plan: 1 to add".to_string()),
        };
        let second = repo.record_check(env.id, &drift, now, None).await.unwrap();
        assert_eq!(second.check.execution_number, 2);
        assert_eq!(second.previous_status, EnvironmentStatus::Ok);
        assert_eq!(second.check.change_count, Some(2));
        assert_eq!(second.check.raw_output.as_deref(), Some("Plan: 1 to add"));

        let latest = repo.latest_check(env.id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.check.id);
        assert_eq!(repo.get_check(first.check.id).await.unwrap().unwrap().status, EnvironmentStatus::Ok);
        assert_eq!(repo.list_checks(env.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_check_prunes_before_cutoff() {
        let repo = setup_repo().await;
        let env = setup_environment(&repo).await;
        let now = Utc::now();

        repo.record_check(env.id, &report(EnvironmentStatus::Ok), now - Duration::days(10), None)
            .await
            .unwrap();
        repo.record_check(env.id, &report(EnvironmentStatus::Ok), now - Duration::days(2), None)
            .await
            .unwrap();
        let record = repo
            .record_check(
                env.id,
                &report(EnvironmentStatus::Drift),
                now,
                Some(now - Duration::days(5)),
            )
            .await
            .unwrap();

        assert_eq!(record.pruned, 1);
        assert_eq!(record.check.execution_number, 3);
        let numbers: Vec<i64> =
            repo.list_checks(env.id).await.unwrap().iter().map(|c| c.execution_number).collect();
        assert_eq!(numbers, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_record_check_unknown_environment() {
        let repo = setup_repo().await;
        let result = repo.record_check(42, &report(EnvironmentStatus::Ok), Utc::now(), None).await;
        assert!(matches!(result, Err(PersistenceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_rows_are_none() {
        let repo = setup_repo().await;
        assert!(repo.get_project(1).await.unwrap().is_none());
        assert!(repo.get_environment(1).await.unwrap().is_none());
        assert!(repo.get_check(1).await.unwrap().is_none());
        assert!(repo.latest_check(1).await.unwrap().is_none());
        assert!(repo.list_checks(1).await.unwrap().is_empty());
    }
}
