//! Command-line subcommands other than the long-running service.

pub mod record;

pub use record::RecordArgs;
