//! Retention of timestamped backup instances.
//!
//! An instance is managed only if its name is exactly `{prefix}_{timestamp}`
//! with a timestamp in [`TIMESTAMP_FORMAT`]. Anything else in the parent
//! directory is left alone.

use crate::transfer::{InstanceLocation, TransferBackend};
use crate::utils::errors::Result;
use chrono::{DateTime, Local, NaiveDateTime};
use tracing::{info, warn};

/// Instance timestamp layout, minute resolution
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M";

const TIMESTAMP_LEN: usize = "YYYY-MM-DD_HH-MM".len();

/// Timestamp suffix for an instance started at `at`.
pub fn instance_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// The timestamp of `name` if it is a managed instance of `prefix`.
pub fn managed_timestamp<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let timestamp = name.strip_prefix(prefix)?.strip_prefix('_')?;
    if timestamp.len() != TIMESTAMP_LEN {
        return None;
    }
    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
    Some(timestamp)
}

/// Names to delete so that at most `retention` managed instances remain.
///
/// Instances are ranked newest first by timestamp; `current` (the instance
/// just written) is never returned. The result is ordered oldest first.
pub fn select_expired(
    names: &[String],
    prefix: &str,
    retention: usize,
    current: Option<&str>,
) -> Vec<String> {
    let mut managed: Vec<(&str, &str)> = names
        .iter()
        .filter_map(|name| managed_timestamp(name, prefix).map(|ts| (name.as_str(), ts)))
        .collect();

    managed.sort_by(|a, b| b.1.cmp(a.1).then_with(|| b.0.cmp(a.0)));

    managed
        .into_iter()
        .skip(retention)
        .rev()
        .filter(|(name, _)| Some(*name) != current)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// What a cleanup pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Delete the instances of `location` beyond `retention`.
///
/// Listing errors are returned; individual delete failures are logged and
/// recorded in the outcome without stopping the pass.
pub async fn cleanup(
    backend: &dyn TransferBackend,
    location: &InstanceLocation,
    retention: usize,
    current: Option<&str>,
) -> Result<RetentionOutcome> {
    let names = backend.list_prior_instances(&location.parent).await?;
    let expired = select_expired(&names, &location.prefix, retention, current);

    let mut outcome = RetentionOutcome::default();
    for name in expired {
        let path = backend.join(&location.parent, &name);
        info!("Deleting old backup: {}", path);

        match backend.delete_instance(&path).await {
            Ok(()) => outcome.deleted.push(name),
            Err(e) => {
                warn!("Failed to delete old backup {}: {}", path, e);
                outcome.failed.push(name);
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::BackupJob;
    use crate::transfer::{BackendKind, CopyOutcome};
    use crate::utils::errors::{BackupError, PreflightError};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::path::Path;
    use std::sync::Mutex;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    struct FakeBackend {
        instances: Mutex<Vec<String>>,
        undeletable: Option<String>,
    }

    impl FakeBackend {
        fn with(list: &[&str]) -> Self {
            Self {
                instances: Mutex::new(names(list)),
                undeletable: None,
            }
        }

        fn remaining(&self) -> Vec<String> {
            let mut remaining = self.instances.lock().unwrap().clone();
            remaining.sort();
            remaining
        }
    }

    #[async_trait]
    impl TransferBackend for FakeBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Local
        }

        fn instance_location(&self, job: &BackupJob) -> Result<InstanceLocation> {
            Ok(InstanceLocation {
                parent: "/dest".to_string(),
                prefix: job.name.clone(),
            })
        }

        fn join(&self, parent: &str, name: &str) -> String {
            format!("{}/{}", parent, name)
        }

        async fn preflight(&self, _jobs: &[BackupJob]) -> Vec<PreflightError> {
            Vec::new()
        }

        async fn validate_destination(&self) -> bool {
            true
        }

        async fn copy(&self, _source: &Path, _destination: &str, _max_age: u32) -> CopyOutcome {
            CopyOutcome::succeeded(0)
        }

        async fn list_prior_instances(&self, _parent: &str) -> Result<Vec<String>> {
            Ok(self.instances.lock().unwrap().clone())
        }

        async fn delete_instance(&self, path: &str) -> Result<()> {
            let name = path.trim_start_matches("/dest/");
            if self.undeletable.as_deref() == Some(name) {
                return Err(BackupError::Transfer("permission denied".to_string()));
            }
            self.instances.lock().unwrap().retain(|n| n != name);
            Ok(())
        }
    }

    fn location(prefix: &str) -> InstanceLocation {
        InstanceLocation {
            parent: "/dest".to_string(),
            prefix: prefix.to_string(),
        }
    }

    #[test]
    fn test_instance_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 1, 8, 5, 7, 59).unwrap();
        assert_eq!(instance_timestamp(at), "2024-01-08_05-07");
    }

    #[test]
    fn test_managed_timestamp() {
        assert_eq!(
            managed_timestamp("db_2024-01-08_05-00", "db"),
            Some("2024-01-08_05-00")
        );
        assert_eq!(managed_timestamp("db_2024-01-08_05-00", "d"), None);
        assert_eq!(managed_timestamp("db2024-01-08_05-00", "db"), None);
        assert_eq!(managed_timestamp("db_2024-01-08_05-00_extra", "db"), None);
        assert_eq!(managed_timestamp("db_2024-13-08_05-00", "db"), None);
        assert_eq!(managed_timestamp("db_2024-1-8_5-0", "db"), None);
        assert_eq!(managed_timestamp("db_latest", "db"), None);
        assert_eq!(
            managed_timestamp("db_old_2024-01-08_05-00", "db_old"),
            Some("2024-01-08_05-00")
        );
    }

    #[test]
    fn test_select_expired_keeps_newest() {
        let list = names(&[
            "db_2024-01-03_05-00",
            "db_2024-01-01_05-00",
            "db_2024-01-05_05-00",
            "db_2024-01-02_05-00",
            "db_2024-01-04_05-00",
        ]);

        assert_eq!(
            select_expired(&list, "db", 2, Some("db_2024-01-05_05-00")),
            names(&[
                "db_2024-01-01_05-00",
                "db_2024-01-02_05-00",
                "db_2024-01-03_05-00"
            ])
        );
        assert!(select_expired(&list, "db", 5, None).is_empty());
        assert!(select_expired(&list, "db", 10, None).is_empty());
    }

    #[test]
    fn test_select_expired_ignores_foreign_entries() {
        let list = names(&[
            "db_2024-01-01_05-00",
            "db_2024-01-02_05-00",
            "db_backup",
            "db_2024-01-03",
            "photos_2023-01-01_05-00",
            "db_old_2020-01-01_05-00",
        ]);

        assert_eq!(
            select_expired(&list, "db", 1, None),
            names(&["db_2024-01-01_05-00"])
        );
    }

    #[test]
    fn test_current_instance_is_never_selected() {
        // A clock that went backwards leaves the fresh instance looking oldest.
        let list = names(&[
            "db_2024-01-05_05-00",
            "db_2024-01-04_05-00",
            "db_2023-12-31_05-00",
        ]);

        let expired = select_expired(&list, "db", 1, Some("db_2023-12-31_05-00"));
        assert_eq!(expired, names(&["db_2024-01-04_05-00"]));
    }

    #[tokio::test]
    async fn test_cleanup_deletes_three_oldest_of_five() {
        let backend = FakeBackend::with(&[
            "db_2024-01-01_05-00",
            "db_2024-01-02_05-00",
            "db_2024-01-03_05-00",
            "db_2024-01-04_05-00",
            "db_2024-01-05_05-00",
            "unrelated",
        ]);

        let outcome = cleanup(&backend, &location("db"), 2, Some("db_2024-01-05_05-00"))
            .await
            .unwrap();

        assert_eq!(
            outcome.deleted,
            names(&[
                "db_2024-01-01_05-00",
                "db_2024-01-02_05-00",
                "db_2024-01-03_05-00"
            ])
        );
        assert!(outcome.failed.is_empty());
        assert_eq!(
            backend.remaining(),
            names(&["db_2024-01-04_05-00", "db_2024-01-05_05-00", "unrelated"])
        );
    }

    #[tokio::test]
    async fn test_cleanup_continues_after_delete_failure() {
        let mut backend = FakeBackend::with(&[
            "db_2024-01-01_05-00",
            "db_2024-01-02_05-00",
            "db_2024-01-03_05-00",
        ]);
        backend.undeletable = Some("db_2024-01-01_05-00".to_string());

        let outcome = cleanup(&backend, &location("db"), 1, None).await.unwrap();
        assert_eq!(outcome.failed, names(&["db_2024-01-01_05-00"]));
        assert_eq!(outcome.deleted, names(&["db_2024-01-02_05-00"]));
        assert_eq!(
            backend.remaining(),
            names(&["db_2024-01-01_05-00", "db_2024-01-03_05-00"])
        );
    }
}
