use std::{net::SocketAddr, sync::Arc, time::Duration};

use drifthound::{
    config::AppConfig,
    engine::{ingestion::IngestionService, notification_worker::NotificationQueue},
    http_server,
    models::StatusChange,
    persistence::SqliteRepository,
};
use reqwest::Client;
use serde_json::Value;
use tokio::{sync::mpsc, task};
use tokio_util::sync::CancellationToken;

pub const API_KEY: &str = "test-key";

pub async fn create_test_repo() -> Arc<SqliteRepository> {
    let repo = SqliteRepository::new("sqlite::memory:")
        .await
        .expect("Failed to create in-memory repo");
    repo.run_migrations().await.expect("Failed to run migrations");
    Arc::new(repo)
}

pub struct TestServer {
    pub address: SocketAddr,
    pub server_handle: task::JoinHandle<()>,
    pub client: Client,
    pub repo: Arc<SqliteRepository>,
    pub queued: mpsc::Receiver<StatusChange>,
    shutdown: CancellationToken,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_api_key(Some(API_KEY)).await
    }

    pub async fn with_api_key(api_key: Option<&str>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get address");
        drop(listener); // Release port for the app to use

        let mut builder = AppConfig::builder().listen_address(&addr.to_string());
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let config = Arc::new(builder.build());

        let repo = create_test_repo().await;
        let (queue, queued) = NotificationQueue::bounded(16);
        let ingestion =
            Arc::new(IngestionService::from_config(&config, Arc::clone(&repo)).with_queue(queue));

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let server_handle = task::spawn(async move {
            http_server::run_server_from_config(config, ingestion, server_shutdown)
                .await
                .expect("Server failed");
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(200)).await;

        Self { address: addr, server_handle, client: Client::new(), repo, queued, shutdown }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.expect("Failed to send request")
    }

    pub async fn post_check(
        &self,
        project: &str,
        environment: &str,
        body: Value,
    ) -> reqwest::Response {
        self.post_check_with_token(project, environment, body, Some(API_KEY)).await
    }

    pub async fn post_check_with_token(
        &self,
        project: &str,
        environment: &str,
        body: Value,
        token: Option<&str>,
    ) -> reqwest::Response {
        let path = format!("/api/v1/projects/{project}/environments/{environment}/checks");
        let mut request = self.client.post(self.url(&path)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to send request")
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.server_handle).await;
    }
}
