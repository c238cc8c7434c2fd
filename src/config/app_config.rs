use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::{
    BaseHttpClientConfig, HttpRetryConfig, NotificationDefaults, ServerConfig,
    deserialize_duration_from_seconds,
};

fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_retention_days() -> u32 {
    90
}

fn default_notification_queue_capacity() -> u32 {
    1024
}

fn default_delivery_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Application configuration for DriftHound.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// SQLite database URL.
    pub database_url: String,

    /// Public base URL of the web UI, used to build links in notifications.
    #[serde(default = "default_app_url")]
    pub app_url: String,

    /// Days of drift check history kept per environment. `0` keeps
    /// everything.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Capacity of the queue feeding the notification worker.
    #[serde(default = "default_notification_queue_capacity")]
    pub notification_queue_capacity: u32,

    /// Upper bound on a single adapter call.
    #[serde(
        rename = "delivery_timeout_secs",
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_delivery_timeout"
    )]
    pub delivery_timeout: Duration,

    /// Maximum time to wait for in-flight deliveries on shutdown.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_shutdown_timeout"
    )]
    pub shutdown_timeout: Duration,

    /// Retry policy of the adapters' HTTP clients.
    #[serde(default)]
    pub http_retry_config: HttpRetryConfig,

    /// Connection settings of the adapters' HTTP clients.
    #[serde(default)]
    pub http_base_config: BaseHttpClientConfig,

    /// Ingestion API server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Default channel settings per channel kind.
    #[serde(default)]
    pub notifications: NotificationDefaults,
}

impl AppConfig {
    /// Loads `<config_dir>/app.yaml` (default `configs`) and applies
    /// `DRIFTHOUND__*` environment overrides.
    pub fn new(config_dir: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = config_dir.unwrap_or("configs");
        Config::builder()
            .add_source(File::with_name(&format!("{config_dir}/app.yaml")))
            .add_source(Environment::with_prefix("DRIFTHOUND").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Creates a new `AppConfigBuilder`, mostly useful in tests.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }
}

/// A builder for `AppConfig` that starts from the documented defaults.
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl Default for AppConfigBuilder {
    fn default() -> Self {
        Self {
            config: AppConfig {
                database_url: "sqlite::memory:".to_string(),
                app_url: default_app_url(),
                retention_days: default_retention_days(),
                notification_queue_capacity: default_notification_queue_capacity(),
                delivery_timeout: default_delivery_timeout(),
                shutdown_timeout: default_shutdown_timeout(),
                http_retry_config: HttpRetryConfig::default(),
                http_base_config: BaseHttpClientConfig::default(),
                server: ServerConfig::default(),
                notifications: NotificationDefaults::default(),
            },
        }
    }
}

impl AppConfigBuilder {
    /// Sets the database URL.
    pub fn database_url(mut self, url: &str) -> Self {
        self.config.database_url = url.to_string();
        self
    }

    /// Sets the base URL used for deep links.
    pub fn app_url(mut self, url: &str) -> Self {
        self.config.app_url = url.to_string();
        self
    }

    /// Sets the retention window in days.
    pub fn retention_days(mut self, days: u32) -> Self {
        self.config.retention_days = days;
        self
    }

    /// Sets the adapter call timeout.
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.config.delivery_timeout = timeout;
        self
    }

    /// Sets the HTTP retry policy.
    pub fn http_retry_config(mut self, retry: HttpRetryConfig) -> Self {
        self.config.http_retry_config = retry;
        self
    }

    /// Sets the address the API server binds to.
    pub fn listen_address(mut self, address: &str) -> Self {
        self.config.server.listen_address = address.to_string();
        self
    }

    /// Sets how long shutdown waits for in-flight deliveries.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Sets the API key required by the ingestion endpoint.
    pub fn api_key(mut self, key: &str) -> Self {
        self.config.server.api_key = Some(key.to_string());
        self
    }

    /// Sets the default channel settings.
    pub fn notifications(mut self, defaults: NotificationDefaults) -> Self {
        self.config.notifications = defaults;
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> AppConfig {
        self.config
    }
}
