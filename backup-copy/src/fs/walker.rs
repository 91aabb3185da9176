//! Directory traversal for backup file selection.
//!
//! Walks a source tree in a stable (file name) order and reports every
//! regular file with its size and modification time. Entries that cannot be
//! read are reported instead of aborting the walk; only an unreadable root is
//! an error.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A regular file discovered during walking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Full path to the file
    pub path: PathBuf,

    /// Path relative to the walk root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Last modification time
    pub modified: DateTime<Local>,
}

/// One item reported by [`walk_files`].
#[derive(Debug)]
pub enum WalkEntry {
    File(FileEntry),
    Unreadable { path: PathBuf, error: String },
}

impl FileEntry {
    /// Create a FileEntry from a DirEntry.
    /// Symlinks are resolved so that a link to a file is backed up with the
    /// target's size; links to directories and broken links yield None.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let file_type = entry.file_type();

        let metadata = if file_type.is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_file() => resolved,
                _ => return Ok(None),
            }
        } else if file_type.is_file() {
            entry.metadata()?
        } else {
            return Ok(None);
        };

        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        Ok(Some(Self {
            relative_path,
            size: metadata.len(),
            modified: DateTime::<Local>::from(metadata.modified()?),
            path,
        }))
    }
}

/// Walk a directory tree, calling `callback` for each file or unreadable entry
///
/// # Returns
/// * `Ok(())` - If the walk completed (individual entries may have been unreadable)
/// * `Err(io::Error)` - If the root itself cannot be read
pub fn walk_files<F>(root: &Path, mut callback: F) -> std::io::Result<()>
where
    F: FnMut(WalkEntry),
{
    let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                callback(WalkEntry::Unreadable {
                    path,
                    error: e.to_string(),
                });
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        match FileEntry::from_entry(&entry, root) {
            Ok(Some(file)) => callback(WalkEntry::File(file)),
            Ok(None) => {}
            Err(e) => callback(WalkEntry::Unreadable {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            }),
        }
    }

    Ok(())
}

/// Collect every readable file under `root`.
pub fn collect_files(root: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut files = Vec::new();

    walk_files(root, |entry| match entry {
        WalkEntry::File(file) => files.push(file),
        WalkEntry::Unreadable { path, error } => {
            tracing::warn!("Skipping unreadable entry {}: {}", path.display(), error);
        }
    })?;

    Ok(files)
}

/// Whether `path` is a directory whose entries can be listed.
pub fn is_directory_accessible(path: &Path) -> bool {
    path.is_dir() && std::fs::read_dir(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = collect_files(temp_dir.path())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("b.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/a.txt"), b"content22")?;

        let files = collect_files(temp_dir.path())?;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative_path, PathBuf::from("b.txt"));
        assert_eq!(files[0].size, 8);
        assert_eq!(files[1].relative_path, PathBuf::from("subdir/a.txt"));
        assert_eq!(files[1].size, 9);

        Ok(())
    }

    #[test]
    fn test_hidden_files_are_included() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("file.txt"), b"keep")?;
        fs::write(temp_dir.path().join(".DS_Store"), b"keep too")?;

        let files = collect_files(temp_dir.path())?;
        assert_eq!(files.len(), 2);

        Ok(())
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let result = collect_files(Path::new("/nonexistent/backup-copy-walk"));
        assert!(result.is_err());
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("root");
        fs::create_dir(&root)?;
        fs::create_dir(temp_dir.path().join("elsewhere"))?;
        fs::write(temp_dir.path().join("target.bin"), b"0123456789")?;

        std::os::unix::fs::symlink(temp_dir.path().join("target.bin"), root.join("link.bin"))?;
        std::os::unix::fs::symlink(temp_dir.path().join("elsewhere"), root.join("dir-link"))?;
        std::os::unix::fs::symlink(temp_dir.path().join("missing"), root.join("broken"))?;

        let files = collect_files(&root)?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, PathBuf::from("link.bin"));
        assert_eq!(files[0].size, 10);

        Ok(())
    }

    #[test]
    fn test_directory_accessibility() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let file = temp_dir.path().join("plain.txt");
        fs::write(&file, b"x")?;

        assert!(is_directory_accessible(temp_dir.path()));
        assert!(!is_directory_accessible(&file));
        assert!(!is_directory_accessible(&temp_dir.path().join("missing")));

        Ok(())
    }
}
