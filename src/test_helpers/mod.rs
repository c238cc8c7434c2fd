//! A set of helpers for testing

mod adapter;
mod channel;
mod drift_check;
mod http_client;
mod notification;
mod project;

pub use adapter::{RecordedCall, RecordingAdapter};
pub use channel::ChannelBuilder;
pub use drift_check::DriftCheckBuilder;
pub use http_client::create_test_http_client;
pub use notification::NotificationBuilder;
pub use project::{EnvironmentBuilder, ProjectBuilder};
