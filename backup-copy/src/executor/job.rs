//! Validated backup job descriptor.

use std::path::PathBuf;

/// One configured backup unit, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupJob {
    /// Unique job name; also the instance prefix on local destinations
    pub name: String,

    /// Absolute path of the directory to copy
    pub source_dir: PathBuf,

    /// rclone destination root, `remote:path`
    pub remote_path: String,

    /// Size ceiling in bytes
    pub max_size_bytes: u64,

    /// Maximum file age in days (0 = unlimited)
    pub max_age_days: u32,

    /// Five-field cron expression
    pub schedule: String,

    /// Number of timestamped copies to keep (>= 1)
    pub retention: usize,

    /// Whether the job takes part in scheduled (rclone) runs
    pub remote_enabled: bool,
}

impl BackupJob {
    /// Name of the rclone remote, if `remote_path` has one.
    pub fn remote_name(&self) -> Option<&str> {
        self.remote_path
            .split_once(':')
            .map(|(remote, _)| remote)
            .filter(|remote| !remote.is_empty())
    }
}
