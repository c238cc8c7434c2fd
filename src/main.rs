use std::sync::Arc;

use clap::{Parser, Subcommand};
use drifthound::{
    cmd::{RecordArgs, record},
    config::AppConfig,
    persistence::SqliteRepository,
    supervisor::Supervisor,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the ingestion API and the notification worker.
    Run {
        /// Directory holding `app.yaml`. Defaults to `configs`.
        #[arg(long, env = "DRIFTHOUND_CONFIG_DIR")]
        config_dir: Option<String>,
    },
    /// Records a single check and delivers its notification.
    Record(RecordArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config_dir } => run_supervisor(config_dir.as_deref()).await?,
        Commands::Record(args) => record::execute(args).await?,
    }

    Ok(())
}

async fn run_supervisor(config_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!("Loading application configuration...");
    let config = AppConfig::new(config_dir)?;
    tracing::debug!(
        database_url = %config.database_url,
        listen_address = %config.server.listen_address,
        retention_days = config.retention_days,
        "Configuration loaded."
    );

    tracing::debug!("Initializing repository...");
    let repo = Arc::new(SqliteRepository::new(&config.database_url).await?);
    repo.run_migrations().await?;
    tracing::info!("Database migrations completed.");

    let supervisor =
        Supervisor::builder().config(config).repository(Arc::clone(&repo)).build().await?;

    tracing::info!("Supervisor initialized, accepting checks...");
    let result = supervisor.run().await;

    repo.close().await;
    tracing::info!("Database connections closed.");
    result?;

    Ok(())
}
