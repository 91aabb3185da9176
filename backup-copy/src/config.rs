//! Configuration management for the backup copier.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! (`BACKUP_COPY__LOG__LEVEL=debug`, `BACKUP_COPY__CHECKS__MIN_FREE_SPACE=50GB`).
//! Everything is validated up front so that a bad config aborts the run
//! before any job starts.

use crate::executor::BackupJob;
use crate::schedule::validate_schedule;
use crate::utils::errors::{BackupError, Result};
use crate::utils::format::parse_size;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "BACKUP_COPY";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub checks: ChecksConfig,

    #[serde(default)]
    pub rclone: RcloneConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    /// Directories to copy
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file, relative to the working directory
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksConfig {
    /// Minimum free space required on each remote
    #[serde(default = "default_min_free_space")]
    pub min_free_space: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcloneConfig {
    /// rclone executable name or path
    #[serde(default = "default_rclone_binary")]
    pub binary: String,

    /// Upper bound for a single `rclone copy`
    #[serde(default = "default_copy_timeout_secs")]
    pub copy_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Webhook receiving the run summary as JSON
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Short name/identifier for the backup
    pub name: String,

    /// Absolute path to the source directory
    pub source_dir: PathBuf,

    /// rclone destination, `remote:path`
    pub remote_path: String,

    /// Maximum size of the backup (B/KB/MB/GB/TB)
    #[serde(default = "default_max_size")]
    pub max_size: String,

    /// Maximum age in days of the files to copy (0 = no limit)
    #[serde(default)]
    pub max_age: u32,

    /// Cron schedule: 'minute hour day-of-month month day-of-week'
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Number of backup copies to keep
    #[serde(default = "default_retention")]
    pub retention: usize,

    /// Whether this job runs in scheduled rclone mode (local mode always runs it)
    #[serde(default = "default_remote_enabled")]
    pub remote_enabled: bool,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("log/backup-copy.log"))
}

fn default_min_free_space() -> String {
    "200GB".to_string()
}

fn default_rclone_binary() -> String {
    "rclone".to_string()
}

fn default_copy_timeout_secs() -> u64 {
    3600
}

fn default_max_size() -> String {
    "1GB".to_string()
}

fn default_schedule() -> String {
    "* * * * 1".to_string()
}

fn default_retention() -> usize {
    2
}

fn default_remote_enabled() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            min_free_space: default_min_free_space(),
        }
    }
}

impl Default for RcloneConfig {
    fn default() -> Self {
        Self {
            binary: default_rclone_binary(),
            copy_timeout_secs: default_copy_timeout_secs(),
        }
    }
}

impl ChecksConfig {
    pub fn min_free_space_bytes(&self) -> Result<u64> {
        parse_size(&self.min_free_space)
            .map_err(|e| BackupError::Config(format!("checks.min_free_space: {}", e)))
    }
}

impl JobConfig {
    /// Validate this entry and turn it into a [`BackupJob`].
    pub fn to_backup_job(&self) -> Result<BackupJob> {
        if self.name.trim().is_empty() {
            return Err(BackupError::Config("Backup name must not be empty".to_string()));
        }

        if !self.source_dir.is_absolute() {
            return Err(BackupError::Config(format!(
                "Backup '{}': source_dir must be an absolute path",
                self.name
            )));
        }

        let max_size_bytes = parse_size(&self.max_size).map_err(|e| {
            BackupError::Config(format!("Backup '{}': invalid max_size: {}", self.name, e))
        })?;
        if max_size_bytes == 0 {
            return Err(BackupError::Config(format!(
                "Backup '{}': max_size must be positive",
                self.name
            )));
        }

        validate_schedule(&self.schedule).map_err(|e| {
            BackupError::Config(format!("Backup '{}': {}", self.name, e))
        })?;

        if self.retention < 1 {
            return Err(BackupError::Config(format!(
                "Backup '{}': retention must be at least 1",
                self.name
            )));
        }

        Ok(BackupJob {
            name: self.name.clone(),
            source_dir: self.source_dir.clone(),
            remote_path: self.remote_path.clone(),
            max_size_bytes,
            max_age_days: self.max_age,
            schedule: self.schedule.trim().to_string(),
            retention: self.retention,
            remote_enabled: self.remote_enabled,
        })
    }
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BackupError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Toml))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text (no environment overrides).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(content, ::config::FileFormat::Toml))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting; the first problem found is returned.
    pub fn validate(&self) -> Result<()> {
        let level = self.log.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(BackupError::Config(format!(
                "log.level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        self.checks.min_free_space_bytes()?;

        if self.rclone.binary.trim().is_empty() {
            return Err(BackupError::Config("rclone.binary must not be empty".to_string()));
        }
        if self.rclone.copy_timeout_secs == 0 {
            return Err(BackupError::Config(
                "rclone.copy_timeout_secs must be positive".to_string(),
            ));
        }

        if let Some(url) = &self.notify.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(BackupError::Config(format!(
                    "notify.webhook_url must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }

        self.backup_jobs().map(|_| ())
    }

    /// Validated job descriptors, in configuration order.
    pub fn backup_jobs(&self) -> Result<Vec<BackupJob>> {
        let mut seen = HashSet::new();
        self.jobs
            .iter()
            .map(|job| {
                if !seen.insert(job.name.as_str()) {
                    return Err(BackupError::Config(format!(
                        "Backup names must be unique: '{}' appears more than once",
                        job.name
                    )));
                }
                job.to_backup_job()
            })
            .collect()
    }
}
