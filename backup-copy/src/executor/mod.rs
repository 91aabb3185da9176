//! Backup orchestration: pre-flight checks, sequential job execution,
//! retention cleanup and dry-run analysis.
//!
//! The orchestrator is backend-agnostic; everything destination-specific
//! goes through [`TransferBackend`]. Jobs run one at a time in input order
//! and a failing job never stops the ones after it.

pub mod job;
pub mod report;
pub mod results;
pub mod retention;

pub use job::BackupJob;
pub use results::{DryRunResult, DryRunSummary, JobResult, RunSummary};

use crate::fs::selection::{analyze, files_within_age, latest_modified, total_size};
use crate::fs::is_directory_accessible;
use crate::transfer::{BackendKind, TransferBackend};
use crate::utils::errors::{PreflightError, Result};
use crate::utils::format::format_bytes;
use chrono::{DateTime, Local};
use retention::instance_timestamp;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How a run was invoked; fixed for the whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Cron-driven copy to rclone remotes; only jobs due today run
    Scheduled,
    /// Copy every job into a local directory
    Local { destination: PathBuf },
    /// Analysis only; labels use the local destination when given
    DryRun { destination: Option<PathBuf> },
}

impl RunMode {
    pub fn from_args(destination: Option<PathBuf>, dry_run: bool) -> Self {
        match (dry_run, destination) {
            (true, destination) => RunMode::DryRun { destination },
            (false, Some(destination)) => RunMode::Local { destination },
            (false, None) => RunMode::Scheduled,
        }
    }

    /// Whether the schedule and `remote_enabled` decide which jobs run
    pub fn uses_schedule(&self) -> bool {
        matches!(self, RunMode::Scheduled)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Scheduled => write!(f, "scheduled rclone"),
            RunMode::Local { destination } => {
                write!(f, "local filesystem ({})", destination.display())
            }
            RunMode::DryRun { .. } => write!(f, "dry run"),
        }
    }
}

pub struct Orchestrator {
    backend: Box<dyn TransferBackend>,
}

impl Orchestrator {
    pub fn new(backend: Box<dyn TransferBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Every problem that must stop the run before any job starts.
    pub async fn preflight_checks(&self, jobs: &[BackupJob]) -> Vec<PreflightError> {
        let mut errors = self.backend.preflight(jobs).await;
        if errors.iter().any(PreflightError::halts_checks) {
            return errors;
        }

        let accessible: Vec<&BackupJob> = jobs
            .iter()
            .filter(|job| {
                let ok = is_directory_accessible(&job.source_dir);
                if !ok {
                    errors.push(PreflightError::SourceInaccessible {
                        job: job.name.clone(),
                        path: job.source_dir.clone(),
                    });
                }
                ok
            })
            .collect();

        for job in accessible {
            let source = job.source_dir.clone();
            let max_age_days = job.max_age_days;
            let sized = tokio::task::spawn_blocking(move || {
                files_within_age(&source, max_age_days).map(|files| total_size(&files))
            })
            .await;

            match sized {
                Ok(Ok(size)) if size > job.max_size_bytes => {
                    errors.push(PreflightError::SizeExceeded {
                        job: job.name.clone(),
                        size,
                        limit: job.max_size_bytes,
                    });
                }
                Ok(Ok(size)) => {
                    info!(
                        "Backup '{}': {} within limit of {}",
                        job.name,
                        format_bytes(size),
                        format_bytes(job.max_size_bytes)
                    );
                }
                Ok(Err(e)) => errors.push(PreflightError::SizeCalculation {
                    job: job.name.clone(),
                    reason: e.to_string(),
                }),
                Err(e) => errors.push(PreflightError::SizeCalculation {
                    job: job.name.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        errors
    }

    /// Run one job to completion. Never fails: every error ends up in the result.
    pub async fn execute(&self, job: &BackupJob) -> JobResult {
        let started = Instant::now();
        info!("Starting backup: {}", job.name);

        match self.try_execute(job, Local::now(), started).await {
            Ok(result) => result,
            Err(e) => {
                let message = format!("Unexpected error during backup: {}", e);
                error!("{}", message);
                JobResult::failed(&job.name, message, started.elapsed().as_secs_f64())
            }
        }
    }

    async fn try_execute(
        &self,
        job: &BackupJob,
        started_at: DateTime<Local>,
        started: Instant,
    ) -> Result<JobResult> {
        let location = self.backend.instance_location(job)?;
        let instance = format!("{}_{}", location.prefix, instance_timestamp(started_at));
        let destination = self.backend.join(&location.parent, &instance);

        let outcome = self
            .backend
            .copy(&job.source_dir, &destination, job.max_age_days)
            .await;

        if !outcome.success {
            let elapsed_secs = started.elapsed().as_secs_f64();
            let message = outcome
                .error_message
                .unwrap_or_else(|| "copy failed".to_string());
            error!("Backup '{}' failed: {}", job.name, message);
            return Ok(JobResult {
                bytes_transferred: outcome.bytes_transferred,
                ..JobResult::failed(&job.name, message, elapsed_secs)
            });
        }

        let latest_file_date = self.latest_file_date(job).await;
        let elapsed_secs = started.elapsed().as_secs_f64();

        info!(
            "Backup '{}' completed successfully: {} bytes transferred in {:.2}s",
            job.name, outcome.bytes_transferred, elapsed_secs
        );

        match retention::cleanup(
            self.backend.as_ref(),
            &location,
            job.retention,
            Some(&instance),
        )
        .await
        {
            Ok(cleaned) if !cleaned.deleted.is_empty() => {
                info!(
                    "Removed {} old backup(s) of '{}'",
                    cleaned.deleted.len(),
                    job.name
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Error during cleanup for backup '{}': {}", job.name, e),
        }

        Ok(JobResult {
            name: job.name.clone(),
            success: true,
            bytes_transferred: outcome.bytes_transferred,
            elapsed_secs,
            error_message: None,
            latest_file_date,
        })
    }

    async fn latest_file_date(&self, job: &BackupJob) -> Option<DateTime<Local>> {
        if !is_directory_accessible(&job.source_dir) {
            return None;
        }

        let source = job.source_dir.clone();
        let max_age_days = job.max_age_days;
        let latest = tokio::task::spawn_blocking(move || {
            files_within_age(&source, max_age_days).map(|files| latest_modified(&files))
        })
        .await;

        match latest {
            Ok(Ok(latest)) => latest,
            Ok(Err(e)) => {
                warn!("Could not determine latest file date for {}: {}", job.name, e);
                None
            }
            Err(e) => {
                warn!("Could not determine latest file date for {}: {}", job.name, e);
                None
            }
        }
    }

    /// Execute every job sequentially, in order.
    pub async fn run_all(&self, jobs: &[BackupJob]) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%run_id, "Running {} backup(s) via {}", jobs.len(), self.backend_kind());

        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            info!(%run_id, "Processing backup: {}", job.name);
            results.push(self.execute(job).await);
        }

        RunSummary {
            run_id,
            results,
            total_elapsed_secs: started.elapsed().as_secs_f64(),
        }
    }

    /// Analyze every job without copying or deleting anything.
    pub async fn run_all_dry_run(&self, jobs: &[BackupJob]) -> DryRunSummary {
        info!("Starting dry run analysis for {} backups", jobs.len());

        let mut summary = DryRunSummary::default();
        for job in jobs {
            summary.results.push(self.dry_run(job).await);
        }

        info!(
            "Dry run analysis complete: {} successful, {} failed, {} total",
            summary.successful(),
            summary.failed(),
            format_bytes(summary.total_size())
        );
        summary
    }

    async fn dry_run(&self, job: &BackupJob) -> DryRunResult {
        info!("Analyzing backup: {}", job.name);

        match self.try_dry_run(job).await {
            Ok(result) => result,
            Err(e) => {
                let message = format!("Dry run analysis failed: {}", e);
                error!("Error analyzing backup '{}': {}", job.name, message);
                DryRunResult::failed(&job.name, job.source_dir.clone(), message)
            }
        }
    }

    async fn try_dry_run(&self, job: &BackupJob) -> Result<DryRunResult> {
        let timestamp = instance_timestamp(Local::now());
        // Pre-flight reports a bad destination; analysis still runs with a plain label
        let destination = match self.backend.instance_location(job) {
            Ok(location) => self.backend.destination_for(&location, &timestamp),
            Err(e) => {
                warn!("Backup '{}': {}", job.name, e);
                format!("{}_{}", job.remote_path, timestamp)
            }
        };

        let source = job.source_dir.clone();
        let (max_age_days, max_size_bytes) = (job.max_age_days, job.max_size_bytes);
        let selection =
            tokio::task::spawn_blocking(move || analyze(&source, max_age_days, max_size_bytes))
                .await?;

        info!(
            "Analysis complete for '{}': {} files, {}",
            job.name,
            selection.file_count(),
            format_bytes(selection.total_bytes)
        );

        Ok(DryRunResult::analyzed(
            &job.name,
            job.source_dir.clone(),
            destination,
            selection,
        ))
    }
}
