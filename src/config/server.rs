use serde::Deserialize;

/// Configuration of the ingestion API server.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Bearer token required on the ingestion endpoint. Falls back to the
    /// `DRIFTHOUND_API_KEY` environment variable.
    #[serde(default = "default_api_key_from_env")]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_address: default_listen_address(), api_key: None }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_api_key_from_env() -> Option<String> {
    std::env::var("DRIFTHOUND_API_KEY").ok().filter(|key| !key.is_empty())
}
