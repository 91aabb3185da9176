//! Source tree walking and file selection.

pub mod selection;
pub mod walker;

pub use selection::{analyze, files_within_age, ExcludedFile, ExclusionReason, FileSelection};
pub use walker::{is_directory_accessible, FileEntry};
