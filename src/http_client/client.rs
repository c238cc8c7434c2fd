//! Wraps a `reqwest::Client` with retry middleware for transient failures
//! such as connection resets, timeouts and 5xx/429 responses.

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{Jitter, RetryTransientMiddleware, policies::ExponentialBackoff};

use crate::config::{HttpRetryConfig, JitterSetting};

/// Builds a client that retries transient failures with exponential backoff
/// as described by `config`.
pub fn create_retryable_http_client(
    config: &HttpRetryConfig,
    base_client: reqwest::Client,
) -> ClientWithMiddleware {
    let jitter = match config.jitter {
        JitterSetting::None => Jitter::None,
        JitterSetting::Full => Jitter::Full,
    };

    let retry_policy = ExponentialBackoff::builder()
        .jitter(jitter)
        .base(config.base_for_backoff)
        .retry_bounds(config.initial_backoff_ms, config.max_backoff_secs)
        .build_with_max_retries(config.max_retries);

    ClientBuilder::new(base_client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/").with_status(503).expect(3).create_async().await;

        let config = HttpRetryConfig {
            max_retries: 2,
            initial_backoff_ms: Duration::from_millis(1),
            max_backoff_secs: Duration::from_millis(5),
            jitter: JitterSetting::None,
            ..Default::default()
        };
        let client = create_retryable_http_client(&config, reqwest::Client::new());

        let response = client.get(server.url()).send().await.unwrap();

        assert_eq!(response.status(), 503);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/").with_status(400).expect(1).create_async().await;

        let client =
            create_retryable_http_client(&HttpRetryConfig::default(), reqwest::Client::new());
        let response = client.get(server.url()).send().await.unwrap();

        assert_eq!(response.status(), 400);
        mock.assert_async().await;
    }
}
