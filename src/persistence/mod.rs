//! Storage for the drift ledger, channel configuration and delivery state.

pub mod error;
pub mod sqlite;
pub use sqlite::SqliteRepository;
pub mod traits;
