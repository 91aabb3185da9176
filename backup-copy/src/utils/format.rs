//! Human-readable sizes and durations, and size-string parsing for config.

use crate::transfer::BackendKind;
use crate::utils::errors::{BackupError, Result};

const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

/// Assumed local disk throughput for dry-run estimates (50 MiB/s).
const LOCAL_RATE_BPS: f64 = 50.0 * 1024.0 * 1024.0;

/// Assumed upload throughput for dry-run estimates (5 MiB/s).
const REMOTE_RATE_BPS: f64 = 5.0 * 1024.0 * 1024.0;

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// Rough transfer time in seconds for `total_bytes` on the given backend.
pub fn estimate_transfer_time(total_bytes: u64, kind: BackendKind) -> f64 {
    if total_bytes == 0 {
        return 0.0;
    }

    let rate = match kind {
        BackendKind::Local => LOCAL_RATE_BPS,
        BackendKind::Remote => REMOTE_RATE_BPS,
    };

    total_bytes as f64 / rate
}

/// Parse a size such as `"200GB"`, `"1.5 MB"` or `"4096"` into bytes.
///
/// Units are binary (1 KB = 1024 bytes); `KiB`-style spellings and bare
/// `K`/`M`/`G`/`T` are accepted too. Matching is case-insensitive.
pub fn parse_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| BackupError::Config(format!("Invalid size '{}'", input)))?;

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        other => {
            return Err(BackupError::Config(format!(
                "Invalid size unit '{}' in '{}'",
                other, input
            )))
        }
    };

    Ok((value * multiplier as f64).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }

    #[test]
    fn test_estimate_transfer_time() {
        assert_eq!(estimate_transfer_time(0, BackendKind::Remote), 0.0);
        let hundred_mib = 100 * 1024 * 1024;
        assert!((estimate_transfer_time(hundred_mib, BackendKind::Local) - 2.0).abs() < 1e-9);
        assert!((estimate_transfer_time(hundred_mib, BackendKind::Remote) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("512B").unwrap(), 512);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("10 MB").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("1GB").unwrap(), 1 << 30);
        assert_eq!(parse_size("1.5gb").unwrap(), 3 << 29);
        assert_eq!(parse_size("200GiB").unwrap(), 200 << 30);
        assert_eq!(parse_size("2TB").unwrap(), 2 << 40);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("GB").is_err());
        assert!(parse_size("12 parsecs").is_err());
        assert!(parse_size("-5MB").is_err());
    }
}
