//! `drifthound record`: records a single check from the command line and
//! delivers its notification before exiting.

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use serde_json::json;
use thiserror::Error;

use crate::{
    config::AppConfig,
    engine::{
        dispatcher::DispatchOutcome,
        ingestion::{IngestionError, IngestionService},
        notification_service::{NotificationService, NotificationServiceError},
    },
    http_client::HttpClientPool,
    models::{ChannelConfig, ChannelSettings, CheckReport, EnvironmentStatus},
    notifiers::{AdapterRegistry, NotifierError, SlackAdapter},
    persistence::{SqliteRepository, error::PersistenceError},
};

/// Errors raised by the `record` subcommand.
#[derive(Error, Debug)]
pub enum Error {
    /// The raw output file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    /// The database could not be opened or migrated.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    /// The channel adapters could not be created.
    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),
    /// The check was rejected or could not be recorded.
    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),
    /// The notification could not be prepared.
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationServiceError),
}

/// Arguments of `drifthound record`.
#[derive(Parser, Debug, Clone)]
pub struct RecordArgs {
    /// Project key, created on first use.
    #[arg(short, long)]
    pub project: String,
    /// Environment key, created on first use.
    #[arg(short, long)]
    pub environment: String,
    /// Check outcome: ok, drift, error or unknown.
    #[arg(short, long)]
    pub status: EnvironmentStatus,
    /// Resources the plan would add.
    #[arg(long)]
    pub add: Option<i64>,
    /// Resources the plan would change.
    #[arg(long)]
    pub change: Option<i64>,
    /// Resources the plan would destroy.
    #[arg(long)]
    pub destroy: Option<i64>,
    /// Run time of the check in seconds.
    #[arg(long)]
    pub duration: Option<i64>,
    /// File holding the raw tool output.
    #[arg(long)]
    pub output_file: Option<PathBuf>,
    /// Slack channel to notify for this environment.
    #[arg(long)]
    pub slack_channel: Option<String>,
    /// Directory holding `app.yaml`. Defaults to `configs`.
    #[arg(long, env = "DRIFTHOUND_CONFIG_DIR")]
    pub config_dir: Option<String>,
}

/// What a `record` run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    /// Id of the recorded check.
    pub check_id: i64,
    /// Its execution number within the environment.
    pub execution_number: i64,
    /// Environment status before the check.
    pub previous_status: EnvironmentStatus,
    /// Environment status after the check.
    pub status: EnvironmentStatus,
    /// One outcome per channel notified.
    pub outcomes: Vec<DispatchOutcome>,
}

/// Loads the configuration, records the check and prints a JSON summary.
pub async fn execute(args: RecordArgs) -> Result<(), Error> {
    let config = AppConfig::new(args.config_dir.as_deref())?;

    let repository = Arc::new(SqliteRepository::new(&config.database_url).await?);
    repository.run_migrations().await?;

    let client_pool = HttpClientPool::new(config.http_base_config.clone());
    let adapters = AdapterRegistry::from_config(&config, &client_pool).await?;

    let summary = record(&config, Arc::clone(&repository), adapters, &args).await;
    repository.close().await;
    let summary = summary?;

    let outcomes: Vec<String> = summary.outcomes.iter().map(|o| format!("{o:?}")).collect();
    println!(
        "{}",
        json!({
            "check_id": summary.check_id,
            "execution_number": summary.execution_number,
            "previous_status": summary.previous_status,
            "status": summary.status,
            "notifications": outcomes,
        })
    );
    Ok(())
}

/// Records the check described by `args` and processes its status change
/// inline instead of through the background worker.
#[tracing::instrument(skip_all, fields(project = %args.project, environment = %args.environment))]
pub async fn record(
    config: &AppConfig,
    repository: Arc<SqliteRepository>,
    adapters: AdapterRegistry,
    args: &RecordArgs,
) -> Result<RecordSummary, Error> {
    let raw_output = match &args.output_file {
        Some(path) => Some(tokio::fs::read_to_string(path).await?),
        None => None,
    };
    let report = CheckReport {
        status: args.status,
        add_count: args.add,
        change_count: args.change,
        destroy_count: args.destroy,
        duration: args.duration,
        raw_output,
    };
    let channel = args.slack_channel.as_ref().map(|target| ChannelSettings {
        channel_kind: SlackAdapter::KIND.to_string(),
        enabled: Some(true),
        config: Some(ChannelConfig::from_iter([("channel".to_string(), json!(target))])),
    });

    let ingestion = IngestionService::from_config(config, Arc::clone(&repository));
    let ingested =
        ingestion.submit(&args.project, &args.environment, &report, channel.as_ref()).await?;

    let outcomes = match ingested.status_change {
        Some(change) => {
            let service = NotificationService::from_config(config, repository, adapters);
            service.process(change).await?
        }
        None => Vec::new(),
    };
    tracing::info!(notified = outcomes.len(), "Check recorded.");

    Ok(RecordSummary {
        check_id: ingested.recorded.check.id,
        execution_number: ingested.recorded.check.execution_number,
        previous_status: ingested.recorded.previous_status,
        status: ingested.recorded.environment.status,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::{
        config::NotificationDefaults,
        persistence::traits::LedgerRepository,
        test_helpers::{RecordedCall, RecordingAdapter},
    };

    async fn repository() -> Arc<SqliteRepository> {
        let repo = SqliteRepository::new("sqlite::memory:").await.unwrap();
        repo.run_migrations().await.unwrap();
        Arc::new(repo)
    }

    fn args(status: EnvironmentStatus) -> RecordArgs {
        RecordArgs {
            project: "acme".to_string(),
            environment: "production".to_string(),
            status,
            add: None,
            change: None,
            destroy: None,
            duration: None,
            output_file: None,
            slack_channel: Some("#ops".to_string()),
            config_dir: None,
        }
    }

    fn config() -> AppConfig {
        let mut defaults = NotificationDefaults::default();
        defaults.insert(
            "slack",
            ChannelConfig::from_iter([("token".to_string(), json!("xoxb-test"))]),
        );
        AppConfig::builder().notifications(defaults).build()
    }

    fn registry(adapter: &RecordingAdapter) -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry.register(SlackAdapter::KIND, Arc::new(adapter.clone()));
        registry
    }

    #[tokio::test]
    async fn test_record_delivers_drift_alert_inline() {
        let repo = repository().await;
        let adapter = RecordingAdapter::new();
        let config = config();

        record(&config, Arc::clone(&repo), registry(&adapter), &args(EnvironmentStatus::Ok))
            .await
            .unwrap();
        let mut drift = args(EnvironmentStatus::Drift);
        drift.add = Some(2);
        let summary = record(&config, repo, registry(&adapter), &drift).await.unwrap();

        assert_eq!(summary.execution_number, 2);
        assert_eq!(summary.previous_status, EnvironmentStatus::Ok);
        assert_eq!(summary.outcomes, vec![DispatchOutcome::Delivered {
            external_id: "msg-1".to_string()
        }]);
        match &adapter.calls()[0] {
            RecordedCall::Deliver { config, .. } => {
                assert_eq!(config["channel"], "#ops");
                assert_eq!(config["token"], "xoxb-test");
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_record_without_change_notifies_nobody() {
        let repo = repository().await;
        let adapter = RecordingAdapter::new();
        let config = config();

        record(&config, Arc::clone(&repo), registry(&adapter), &args(EnvironmentStatus::Ok))
            .await
            .unwrap();
        let summary =
            record(&config, repo, registry(&adapter), &args(EnvironmentStatus::Ok)).await.unwrap();

        assert_eq!(summary.execution_number, 2);
        assert!(summary.outcomes.is_empty());
        assert_eq!(adapter.deliveries(), 0);
    }

    #[tokio::test]
    async fn test_record_reads_output_file() {
        let repo = repository().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Plan: 1 to add").unwrap();
        let mut with_output = args(EnvironmentStatus::Ok);
        with_output.output_file = Some(file.path().to_path_buf());

        let summary = record(&config(), Arc::clone(&repo), AdapterRegistry::new(), &with_output)
            .await
            .unwrap();

        let check = repo.get_check(summary.check_id).await.unwrap().unwrap();
        assert_eq!(check.raw_output.as_deref(), Some("Plan: 1 to add"));
    }
}
