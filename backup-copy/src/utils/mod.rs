//! Utility modules for the backup copier.

pub mod errors;
pub mod format;
pub mod logger;

pub use errors::{BackupError, PreflightError, Result};
