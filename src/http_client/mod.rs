//! Outbound HTTP for channel adapters: retrying `reqwest` clients, pooled by
//! retry policy.

mod client;
mod pool;

pub use client::create_retryable_http_client;
pub use pool::{HttpClientPool, HttpClientPoolError};
