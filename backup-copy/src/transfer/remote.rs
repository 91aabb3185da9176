//! rclone backend.
//!
//! Every operation shells out to the `rclone` executable and is bounded by a
//! timeout; a child that outlives its timeout is killed when the future is
//! dropped.

use super::stats::parse_transferred_bytes;
use super::{BackendKind, CopyOutcome, InstanceLocation, TransferBackend};
use crate::config::RcloneConfig;
use crate::executor::BackupJob;
use crate::utils::errors::{BackupError, PreflightError, Result};
use crate::utils::format::format_bytes;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const VERSION_TIMEOUT: Duration = Duration::from_secs(30);
const ABOUT_TIMEOUT: Duration = Duration::from_secs(60);
const LIST_TIMEOUT: Duration = Duration::from_secs(60);
const PURGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Subset of `rclone about --json`
#[derive(Debug, Deserialize)]
struct AboutInfo {
    #[serde(default)]
    free: u64,
}

pub struct RcloneBackend {
    binary: String,
    copy_timeout: Duration,
    min_free_space: u64,
}

impl RcloneBackend {
    pub fn new(config: &RcloneConfig, min_free_space: u64) -> Self {
        Self {
            binary: config.binary.clone(),
            copy_timeout: Duration::from_secs(config.copy_timeout_secs),
            min_free_space,
        }
    }

    async fn run(&self, args: &[String], limit: Duration) -> Result<Output> {
        debug!("Running {} {}", self.binary, args.join(" "));

        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(limit, command.output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(BackupError::Timeout(format!(
                "{} {} exceeded {}s",
                self.binary,
                args.first().map(String::as_str).unwrap_or_default(),
                limit.as_secs()
            ))),
        }
    }

    /// Whether the rclone executable can be run at all.
    pub async fn is_available(&self) -> bool {
        match self.run(&["version".to_string()], VERSION_TIMEOUT).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!("rclone unavailable: {}", e);
                false
            }
        }
    }

    /// Free bytes reported for `remote`.
    pub async fn free_space(&self, remote: &str) -> Result<u64> {
        let args = vec!["about".to_string(), format!("{}:", remote), "--json".to_string()];
        let output = self.run(&args, ABOUT_TIMEOUT).await?;

        if !output.status.success() {
            return Err(BackupError::Transfer(format!(
                "rclone about {}: failed: {}",
                remote,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let about: AboutInfo = serde_json::from_slice(&output.stdout)?;
        Ok(about.free)
    }

    async fn has_free_space(&self, remote: &str) -> bool {
        match self.free_space(remote).await {
            Ok(free) if free >= self.min_free_space => {
                debug!("Remote {} has {} free", remote, format_bytes(free));
                true
            }
            Ok(free) => {
                warn!(
                    "Remote {} has {} free, {} required",
                    remote,
                    format_bytes(free),
                    format_bytes(self.min_free_space)
                );
                false
            }
            Err(e) => {
                warn!("Could not check free space on remote {}: {}", remote, e);
                false
            }
        }
    }
}

#[async_trait]
impl TransferBackend for RcloneBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    /// `gdrive:backups/db` keeps its instances in `gdrive:backups` as `db_{timestamp}`.
    fn instance_location(&self, job: &BackupJob) -> Result<InstanceLocation> {
        let (remote, path) = job.remote_path.split_once(':').ok_or_else(|| {
            BackupError::Config(format!(
                "Backup '{}' remote_path must include a remote name (e.g., 'remote:/path')",
                job.name
            ))
        })?;

        let trimmed = path.trim_end_matches('/');
        let (parent_path, segment) = match trimmed.rfind('/') {
            Some(0) => ("/", &trimmed[1..]),
            Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
            None => ("", trimmed),
        };

        if segment.is_empty() {
            return Ok(InstanceLocation {
                parent: job.remote_path.clone(),
                prefix: job.name.clone(),
            });
        }

        Ok(InstanceLocation {
            parent: format!("{}:{}", remote, parent_path),
            prefix: segment.to_string(),
        })
    }

    fn join(&self, parent: &str, name: &str) -> String {
        if parent.ends_with(':') || parent.ends_with('/') {
            format!("{}{}", parent, name)
        } else {
            format!("{}/{}", parent, name)
        }
    }

    async fn preflight(&self, jobs: &[BackupJob]) -> Vec<PreflightError> {
        if !self.is_available().await {
            return vec![PreflightError::ToolMissing];
        }

        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        let mut remotes = Vec::new();

        for job in jobs {
            match job.remote_name() {
                Some(remote) => {
                    if seen.insert(remote) {
                        remotes.push(remote);
                    }
                }
                None => errors.push(PreflightError::MissingRemoteName {
                    job: job.name.clone(),
                }),
            }
        }

        for remote in remotes {
            if !self.has_free_space(remote).await {
                errors.push(PreflightError::InsufficientSpace {
                    remote: remote.to_string(),
                });
            }
        }

        errors
    }

    async fn validate_destination(&self) -> bool {
        self.is_available().await
    }

    async fn copy(&self, source_dir: &Path, destination: &str, max_age_days: u32) -> CopyOutcome {
        let mut args: Vec<String> = vec![
            "copy".to_string(),
            source_dir.to_string_lossy().into_owned(),
            destination.to_string(),
            "--progress".to_string(),
            "--stats-one-line".to_string(),
            "--stats=1s".to_string(),
            "--create-empty-src-dirs".to_string(),
        ];
        if max_age_days > 0 {
            args.push("--max-age".to_string());
            args.push(format!("{}d", max_age_days));
        }

        info!("rclone copy {} -> {}", source_dir.display(), destination);

        match self.run(&args, self.copy_timeout).await {
            Ok(output) if output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let bytes = parse_transferred_bytes(&stderr)
                    .or_else(|| parse_transferred_bytes(&stdout))
                    .unwrap_or_else(|| {
                        debug!("No transfer statistics in rclone output");
                        0
                    });
                CopyOutcome::succeeded(bytes)
            }
            Ok(output) => CopyOutcome::failed(format!(
                "rclone copy failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            Err(BackupError::Timeout(_)) => {
                CopyOutcome::failed("rclone copy operation timed out")
            }
            Err(e) => CopyOutcome::failed(format!("rclone copy subprocess error: {}", e)),
        }
    }

    async fn list_prior_instances(&self, parent: &str) -> Result<Vec<String>> {
        let args = vec!["lsd".to_string(), parent.to_string()];
        let output = self.run(&args, LIST_TIMEOUT).await?;

        if !output.status.success() {
            return Err(BackupError::Transfer(format!(
                "rclone lsd {} failed: {}",
                parent,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.split_whitespace().last())
            .map(str::to_string)
            .collect())
    }

    async fn delete_instance(&self, path: &str) -> Result<()> {
        let args = vec!["purge".to_string(), path.to_string()];
        let output = self.run(&args, PURGE_TIMEOUT).await?;

        if !output.status.success() {
            return Err(BackupError::Transfer(format!(
                "rclone purge {} failed: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!("Deleted old backup: {}", path);
        Ok(())
    }
}
