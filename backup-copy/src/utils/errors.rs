//! Custom error types for the backup copier.

use crate::schedule::ScheduleError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<::config::ConfigError> for BackupError {
    fn from(err: ::config::ConfigError) -> Self {
        BackupError::Config(err.to_string())
    }
}

/// A problem found before any job runs. Every variant aborts the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreflightError {
    #[error("rclone is not installed or not accessible")]
    ToolMissing,

    #[error("Backup '{job}' remote_path must include a remote name (e.g., 'remote:/path')")]
    MissingRemoteName { job: String },

    #[error("Remote '{remote}' has insufficient free space or is not accessible")]
    InsufficientSpace { remote: String },

    #[error("Local destination not accessible or writable: {}", path.display())]
    DestinationNotWritable { path: PathBuf },

    #[error("Source directory not accessible for backup '{job}': {}", path.display())]
    SourceInaccessible { job: String, path: PathBuf },

    #[error("Backup '{job}' size exceeds limit: {size} bytes (limit: {limit} bytes)")]
    SizeExceeded { job: String, size: u64, limit: u64 },

    #[error("Error calculating size for backup '{job}': {reason}")]
    SizeCalculation { job: String, reason: String },
}

impl PreflightError {
    /// Whether no further check is meaningful once this error is seen.
    pub fn halts_checks(&self) -> bool {
        matches!(self, PreflightError::ToolMissing)
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
