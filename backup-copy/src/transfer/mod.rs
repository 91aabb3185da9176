//! Transfer backends: where backup instances are written and pruned.
//!
//! A run uses exactly one backend, chosen from the run mode when the
//! orchestrator is built. Both backends lay instances out the same way:
//! `{parent}/{prefix}_{YYYY-MM-DD_HH-MM}`.

pub mod local;
pub mod remote;
pub mod stats;

pub use local::LocalBackend;
pub use remote::RcloneBackend;

use crate::config::Config;
use crate::executor::{BackupJob, RunMode};
use crate::utils::errors::{PreflightError, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Which kind of destination a backend writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Remote => write!(f, "rclone"),
        }
    }
}

/// Directory holding a job's instances, and the name prefix they share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLocation {
    pub parent: String,
    pub prefix: String,
}

/// Result of one copy operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub success: bool,
    pub bytes_transferred: u64,
    pub error_message: Option<String>,
}

impl CopyOutcome {
    pub fn succeeded(bytes_transferred: u64) -> Self {
        Self {
            success: true,
            bytes_transferred,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            bytes_transferred: 0,
            error_message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait TransferBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Where the instances of `job` live on this backend.
    fn instance_location(&self, job: &BackupJob) -> Result<InstanceLocation>;

    /// Join a child name onto a parent location.
    fn join(&self, parent: &str, name: &str) -> String;

    /// Full path of the instance stamped `timestamp`.
    fn destination_for(&self, location: &InstanceLocation, timestamp: &str) -> String {
        self.join(&location.parent, &format!("{}_{}", location.prefix, timestamp))
    }

    /// Backend-specific checks run before any job.
    async fn preflight(&self, jobs: &[BackupJob]) -> Vec<PreflightError>;

    /// Whether the destination root exists (or can be created) and is writable.
    async fn validate_destination(&self) -> bool;

    /// Copy files of `source_dir` modified within `max_age_days` (0 = all) to `destination`.
    async fn copy(&self, source_dir: &Path, destination: &str, max_age_days: u32) -> CopyOutcome;

    /// Names of the entries directly under `parent`.
    async fn list_prior_instances(&self, parent: &str) -> Result<Vec<String>>;

    /// Remove an instance and everything in it.
    async fn delete_instance(&self, path: &str) -> Result<()>;
}

/// Build the backend a run mode writes to.
pub fn backend_for(mode: &RunMode, config: &Config) -> Result<Box<dyn TransferBackend>> {
    let backend: Box<dyn TransferBackend> = match mode {
        RunMode::Local { destination }
        | RunMode::DryRun {
            destination: Some(destination),
        } => Box::new(LocalBackend::new(destination.clone())),
        RunMode::Scheduled | RunMode::DryRun { destination: None } => Box::new(
            RcloneBackend::new(&config.rclone, config.checks.min_free_space_bytes()?),
        ),
    };
    Ok(backend)
}
