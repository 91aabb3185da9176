//! Per-job outcomes and run-level aggregates.

use crate::fs::FileSelection;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use uuid::Uuid;

/// Outcome of one executed job
#[derive(Debug, Clone)]
pub struct JobResult {
    pub name: String,
    pub success: bool,
    pub bytes_transferred: u64,
    pub elapsed_secs: f64,
    pub error_message: Option<String>,
    /// Newest modification time among the copied files, when known
    pub latest_file_date: Option<DateTime<Local>>,
}

impl JobResult {
    pub fn failed(name: impl Into<String>, error: impl Into<String>, elapsed_secs: f64) -> Self {
        Self {
            name: name.into(),
            success: false,
            bytes_transferred: 0,
            elapsed_secs,
            error_message: Some(error.into()),
            latest_file_date: None,
        }
    }
}

/// Results of a real run, in execution order
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub results: Vec<JobResult>,
    pub total_elapsed_secs: f64,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.results.len()
    }

    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.processed() - self.successful()
    }

    /// Bytes moved by successful jobs only
    pub fn total_bytes(&self) -> u64 {
        self.results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.bytes_transferred)
            .sum()
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| !r.success)
    }
}

/// What a job would do, computed without touching any destination
#[derive(Debug, Clone)]
pub struct DryRunResult {
    pub name: String,
    pub source_dir: PathBuf,
    /// Speculative instance path; empty when analysis failed
    pub destination: String,
    pub file_count: usize,
    pub total_bytes: u64,
    pub selection: FileSelection,
    pub success: bool,
    pub error_message: Option<String>,
}

impl DryRunResult {
    pub fn analyzed(
        name: impl Into<String>,
        source_dir: PathBuf,
        destination: String,
        selection: FileSelection,
    ) -> Self {
        Self {
            name: name.into(),
            source_dir,
            destination,
            file_count: selection.file_count(),
            total_bytes: selection.total_bytes,
            selection,
            success: true,
            error_message: None,
        }
    }

    pub fn failed(name: impl Into<String>, source_dir: PathBuf, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_dir,
            destination: String::new(),
            file_count: 0,
            total_bytes: 0,
            selection: FileSelection::default(),
            success: false,
            error_message: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DryRunSummary {
    pub results: Vec<DryRunResult>,
}

impl DryRunSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.successful()
    }

    pub fn total_files(&self) -> usize {
        self.results.iter().map(|r| r.file_count).sum()
    }

    pub fn total_size(&self) -> u64 {
        self.results.iter().map(|r| r.total_bytes).sum()
    }
}
