//! Age and size filtering of source files.
//!
//! [`analyze`] is the dry-run policy: age filter, then a running size budget.
//! [`files_within_age`] is the execution-time selector used by real copies,
//! where size limiting is left to pre-flight (or to rclone). Both share the
//! same cutoff: files modified at or after `now - max_age_days` are kept.

use super::walker::{collect_files, walk_files, FileEntry, WalkEntry};
use chrono::{DateTime, Duration, Local};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Why a file was left out of a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// Modified before the age cutoff
    TooOld,
    /// Would push the running total past the size budget
    OverBudget,
    /// Metadata could not be read
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedFile {
    pub path: PathBuf,
    pub reason: ExclusionReason,
}

/// Files that pass the filters, files that don't, and the included byte total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSelection {
    pub included: Vec<FileEntry>,
    pub excluded: Vec<ExcludedFile>,
    pub total_bytes: u64,
}

impl FileSelection {
    pub fn file_count(&self) -> usize {
        self.included.len()
    }

    pub fn excluded_count(&self, reason: ExclusionReason) -> usize {
        self.excluded.iter().filter(|e| e.reason == reason).count()
    }
}

fn age_cutoff(max_age_days: u32, now: DateTime<Local>) -> Option<DateTime<Local>> {
    (max_age_days > 0).then(|| now - Duration::days(i64::from(max_age_days)))
}

/// Analyze which files a backup would include.
///
/// A missing or unreadable source yields an empty selection rather than an
/// error; pre-flight is responsible for reporting inaccessible sources.
pub fn analyze(source_dir: &Path, max_age_days: u32, max_size_bytes: u64) -> FileSelection {
    analyze_at(source_dir, max_age_days, max_size_bytes, Local::now())
}

/// [`analyze`] against an explicit clock.
pub fn analyze_at(
    source_dir: &Path,
    max_age_days: u32,
    max_size_bytes: u64,
    now: DateTime<Local>,
) -> FileSelection {
    if !source_dir.is_dir() {
        warn!("Cannot access directory {}", source_dir.display());
        return FileSelection::default();
    }

    let cutoff = age_cutoff(max_age_days, now);
    let mut selection = FileSelection::default();

    let walked = walk_files(source_dir, |entry| match entry {
        WalkEntry::Unreadable { path, .. } => selection.excluded.push(ExcludedFile {
            path,
            reason: ExclusionReason::Unreadable,
        }),
        WalkEntry::File(file) => {
            let reason = if cutoff.is_some_and(|cutoff| file.modified < cutoff) {
                Some(ExclusionReason::TooOld)
            } else if max_size_bytes > 0
                && selection.total_bytes.saturating_add(file.size) > max_size_bytes
            {
                // Skip-and-continue: a later, smaller file may still fit.
                Some(ExclusionReason::OverBudget)
            } else {
                None
            };

            match reason {
                Some(reason) => selection.excluded.push(ExcludedFile {
                    path: file.path,
                    reason,
                }),
                None => {
                    selection.total_bytes += file.size;
                    selection.included.push(file);
                }
            }
        }
    });

    if let Err(e) = walked {
        warn!("Cannot access directory {}: {}", source_dir.display(), e);
        return FileSelection::default();
    }

    selection
}

/// Files modified within the last `max_age_days` days (0 = every file).
pub fn files_within_age(source_dir: &Path, max_age_days: u32) -> std::io::Result<Vec<FileEntry>> {
    files_within_age_at(source_dir, max_age_days, Local::now())
}

/// [`files_within_age`] against an explicit clock.
pub fn files_within_age_at(
    source_dir: &Path,
    max_age_days: u32,
    now: DateTime<Local>,
) -> std::io::Result<Vec<FileEntry>> {
    let mut files = collect_files(source_dir)?;

    if let Some(cutoff) = age_cutoff(max_age_days, now) {
        files.retain(|file| file.modified >= cutoff);
    }

    Ok(files)
}

/// Total size of the given files
pub fn total_size(files: &[FileEntry]) -> u64 {
    files.iter().map(|f| f.size).sum()
}

/// Most recent modification time among the given files
pub fn latest_modified(files: &[FileEntry]) -> Option<DateTime<Local>> {
    files.iter().map(|f| f.modified).max()
}
