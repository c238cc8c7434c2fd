//! The notification engine: records checks, detects transitions worth
//! telling someone about, and delivers them through channel adapters.

pub mod channel_resolver;
pub mod detector;
pub mod dispatcher;
pub mod ingestion;
pub mod ledger;
pub mod notification_service;
pub mod notification_worker;
