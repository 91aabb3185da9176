//! Local directory backend.
//!
//! Instances are plain directories under the destination root, named
//! `{job name}_{timestamp}`. Copies preserve each file's path relative to the
//! source root and its modification time.

use super::{BackendKind, CopyOutcome, InstanceLocation, TransferBackend};
use crate::executor::BackupJob;
use crate::fs::selection::files_within_age;
use crate::utils::errors::{PreflightError, Result};
use async_trait::async_trait;
use filetime::FileTime;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const WRITE_PROBE: &str = ".write_test";

pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn probe_writable(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let probe = self.root.join(WRITE_PROBE);
        tokio::fs::write(&probe, b"test").await?;
        tokio::fs::remove_file(&probe).await?;
        Ok(())
    }
}

/// Copy the age-filtered files of `source` into `destination`; returns bytes copied.
fn copy_tree(source: &Path, destination: &Path, max_age_days: u32) -> std::io::Result<u64> {
    let files = files_within_age(source, max_age_days)?;
    if files.is_empty() {
        info!("No files to copy from {}", source.display());
        return Ok(0);
    }

    std::fs::create_dir_all(destination)?;

    let mut copied = 0u64;
    for file in &files {
        let target = destination.join(&file.relative_path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        copied += std::fs::copy(&file.path, &target)?;
        filetime::set_file_mtime(&target, FileTime::from_system_time(file.modified.into()))?;
        debug!("Copied {} ({} bytes)", file.relative_path.display(), file.size);
    }

    info!(
        "Copied {} files ({} bytes) to {}",
        files.len(),
        copied,
        destination.display()
    );
    Ok(copied)
}

#[async_trait]
impl TransferBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn instance_location(&self, job: &BackupJob) -> Result<InstanceLocation> {
        Ok(InstanceLocation {
            parent: self.root.to_string_lossy().into_owned(),
            prefix: job.name.clone(),
        })
    }

    fn join(&self, parent: &str, name: &str) -> String {
        Path::new(parent).join(name).to_string_lossy().into_owned()
    }

    async fn preflight(&self, _jobs: &[BackupJob]) -> Vec<PreflightError> {
        if self.validate_destination().await {
            Vec::new()
        } else {
            vec![PreflightError::DestinationNotWritable {
                path: self.root.clone(),
            }]
        }
    }

    async fn validate_destination(&self) -> bool {
        match self.probe_writable().await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Local destination {} is not writable: {}",
                    self.root.display(),
                    e
                );
                false
            }
        }
    }

    async fn copy(&self, source_dir: &Path, destination: &str, max_age_days: u32) -> CopyOutcome {
        if !source_dir.is_dir() {
            return CopyOutcome::failed(format!(
                "Source directory does not exist: {}",
                source_dir.display()
            ));
        }

        info!("Copying {} to {}", source_dir.display(), destination);

        let source = source_dir.to_path_buf();
        let target = PathBuf::from(destination);
        let copied =
            tokio::task::spawn_blocking(move || copy_tree(&source, &target, max_age_days)).await;

        match copied {
            Ok(Ok(bytes)) => CopyOutcome::succeeded(bytes),
            Ok(Err(e)) => CopyOutcome::failed(format!("Local copy failed: {}", e)),
            Err(e) => CopyOutcome::failed(format!("Local copy failed: {}", e)),
        }
    }

    async fn list_prior_instances(&self, parent: &str) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(parent).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        Ok(names)
    }

    async fn delete_instance(&self, path: &str) -> Result<()> {
        tokio::fs::remove_dir_all(path).await?;
        info!("Deleted old backup: {}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Local};
    use std::fs;
    use tempfile::TempDir;

    fn job(name: &str, source_dir: &Path) -> BackupJob {
        BackupJob {
            name: name.to_string(),
            source_dir: source_dir.to_path_buf(),
            remote_path: "remote:backups".to_string(),
            max_size_bytes: 1 << 30,
            max_age_days: 0,
            schedule: "* * * * *".to_string(),
            retention: 2,
            remote_enabled: true,
        }
    }

    #[tokio::test]
    async fn test_validate_creates_destination() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("usb/backups");
        let backend = LocalBackend::new(&root);

        assert!(backend.validate_destination().await);
        assert!(root.is_dir());
        assert!(!root.join(WRITE_PROBE).exists());
        assert!(backend.preflight(&[]).await.is_empty());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_unwritable_destination() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();

        let backend = LocalBackend::new(blocker.join("backups"));
        assert!(!backend.validate_destination().await);

        let errors = backend.preflight(&[]).await;
        assert_eq!(
            errors,
            vec![PreflightError::DestinationNotWritable {
                path: blocker.join("backups"),
            }]
        );
    }

    #[tokio::test]
    async fn test_copy_preserves_layout_and_mtime() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("nested/deeper")).unwrap();
        fs::write(source.path().join("top.txt"), b"hello").unwrap();
        fs::write(source.path().join("nested/deeper/inner.txt"), b"world!!").unwrap();

        let stamp = FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_mtime(source.path().join("top.txt"), stamp).unwrap();

        let backend = LocalBackend::new(dest.path());
        let location = backend.instance_location(&job("docs", source.path())).unwrap();
        let destination = backend.destination_for(&location, "2024-01-08_05-00");

        let outcome = backend.copy(source.path(), &destination, 0).await;
        assert!(outcome.success, "{:?}", outcome.error_message);
        assert_eq!(outcome.bytes_transferred, 12);

        let instance = dest.path().join("docs_2024-01-08_05-00");
        assert_eq!(fs::read(instance.join("top.txt")).unwrap(), b"hello");
        assert_eq!(
            fs::read(instance.join("nested/deeper/inner.txt")).unwrap(),
            b"world!!"
        );

        let copied_mtime =
            FileTime::from_last_modification_time(&fs::metadata(instance.join("top.txt")).unwrap());
        assert_eq!(copied_mtime.unix_seconds(), stamp.unix_seconds());
    }

    #[tokio::test]
    async fn test_copy_honours_max_age() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(source.path().join("fresh.txt"), b"fresh").unwrap();
        fs::write(source.path().join("stale.txt"), b"stale data").unwrap();

        let old = Local::now() - Duration::days(30);
        filetime::set_file_mtime(
            source.path().join("stale.txt"),
            FileTime::from_unix_time(old.timestamp(), 0),
        )
        .unwrap();

        let backend = LocalBackend::new(dest.path());
        let destination = backend.join(&dest.path().to_string_lossy(), "job_2024-01-08_05-00");
        let outcome = backend.copy(source.path(), &destination, 7).await;

        assert!(outcome.success);
        assert_eq!(outcome.bytes_transferred, 5);
        assert!(Path::new(&destination).join("fresh.txt").exists());
        assert!(!Path::new(&destination).join("stale.txt").exists());
    }

    #[tokio::test]
    async fn test_copy_missing_or_empty_source() {
        let dest = TempDir::new().unwrap();
        let backend = LocalBackend::new(dest.path());

        let missing = backend
            .copy(Path::new("/nonexistent/backup-copy-src"), "ignored", 0)
            .await;
        assert!(!missing.success);
        assert!(missing
            .error_message
            .unwrap()
            .starts_with("Source directory does not exist"));

        let empty = TempDir::new().unwrap();
        let destination = dest.path().join("empty_2024-01-08_05-00");
        let outcome = backend
            .copy(empty.path(), &destination.to_string_lossy(), 0)
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.bytes_transferred, 0);
    }

    #[tokio::test]
    async fn test_list_and_delete_instances() {
        let dest = TempDir::new().unwrap();
        fs::create_dir(dest.path().join("db_2024-01-01_05-00")).unwrap();
        fs::create_dir(dest.path().join("db_2024-01-02_05-00")).unwrap();
        fs::write(dest.path().join("notes.txt"), b"not an instance").unwrap();
        fs::write(dest.path().join("db_2024-01-02_05-00/dump.sql"), b"data").unwrap();

        let backend = LocalBackend::new(dest.path());
        let parent = dest.path().to_string_lossy().into_owned();

        let mut names = backend.list_prior_instances(&parent).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["db_2024-01-01_05-00", "db_2024-01-02_05-00"]);

        backend
            .delete_instance(&backend.join(&parent, "db_2024-01-02_05-00"))
            .await
            .unwrap();
        let names = backend.list_prior_instances(&parent).await.unwrap();
        assert_eq!(names, vec!["db_2024-01-01_05-00"]);

        let missing = backend
            .list_prior_instances(&dest.path().join("missing").to_string_lossy())
            .await
            .unwrap();
        assert!(missing.is_empty());
    }
}
