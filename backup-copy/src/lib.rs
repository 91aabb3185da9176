//! Backup Copy Library
//!
//! Cron-scheduled secondary backup copies, written either to rclone remotes
//! or to a local directory, with size/age limits and retention of
//! timestamped instances.

pub mod config;
pub mod executor;
pub mod fs;
pub mod notify;
pub mod schedule;
pub mod shutdown;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupJob, Orchestrator, RunMode};
pub use utils::errors::{BackupError, PreflightError, Result};
