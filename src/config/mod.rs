//! Configuration module for DriftHound.

mod app_config;
mod helpers;
mod http;
mod notifications;
mod server;

pub use app_config::{AppConfig, AppConfigBuilder};
pub use helpers::{
    deserialize_duration_from_ms, deserialize_duration_from_seconds, serialize_duration_to_ms,
    serialize_duration_to_seconds,
};
pub use http::{BaseHttpClientConfig, HttpRetryConfig, JitterSetting};
pub use notifications::NotificationDefaults;
pub use server::ServerConfig;
