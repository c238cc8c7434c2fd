#![warn(missing_docs)]
//! DriftHound records infrastructure drift checks and notifies operators when
//! an environment's health changes.

pub mod cmd;
pub mod config;
pub mod engine;
pub mod http_client;
pub mod http_server;
pub mod models;
pub mod notifiers;
pub mod persistence;
pub mod supervisor;
pub mod test_helpers;
