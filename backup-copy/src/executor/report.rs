//! Plain-text reports for the log and for notifications.

use super::results::{DryRunSummary, RunSummary};
use crate::fs::ExclusionReason;
use crate::transfer::BackendKind;
use crate::utils::errors::PreflightError;
use crate::utils::format::{estimate_transfer_time, format_bytes, format_duration};

pub const SUMMARY_HEADER: &str = "=== Backup Copy Summary ===";

/// Report body for a scheduled run in which no job was due.
pub const NO_JOBS_SCHEDULED: &str =
    "=== Backup Copy Summary ===\n\nNo backups were scheduled to run today.";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// `1234567` -> `1,234,567`
fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

pub fn format_run_summary(summary: &RunSummary) -> String {
    let total_bytes = summary.total_bytes();
    let mut lines = vec![
        SUMMARY_HEADER.to_string(),
        String::new(),
        format!("Total backups processed: {}", summary.processed()),
        format!("Successful: {}", summary.successful()),
        format!("Failed: {}", summary.failed()),
        format!(
            "Total bytes transferred: {} bytes ({:.2} GB)",
            group_thousands(total_bytes),
            total_bytes as f64 / GIB
        ),
        format!(
            "Total execution time: {:.2} seconds",
            summary.total_elapsed_secs
        ),
        String::new(),
        "=== Individual Backup Results ===".to_string(),
    ];

    for result in &summary.results {
        let status = if result.success {
            "✓ SUCCESS"
        } else {
            "✗ FAILED"
        };
        lines.push(String::new());
        lines.push(format!("[{}] {}", status, result.name));
        lines.push(format!("  Execution time: {:.2} seconds", result.elapsed_secs));

        if result.success {
            lines.push(format!(
                "  Bytes transferred: {}",
                group_thousands(result.bytes_transferred)
            ));
            if let Some(latest) = result.latest_file_date {
                lines.push(format!(
                    "  Latest file date: {}",
                    latest.format("%Y-%m-%d %H:%M:%S")
                ));
            }
        } else {
            lines.push(format!(
                "  Error: {}",
                result.error_message.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    lines.join("\n")
}

pub fn format_preflight_failure(errors: &[PreflightError]) -> String {
    let mut report = String::from("=== Backup Copy - Pre-flight Check Failures ===\n\n");
    report.push_str("The following errors prevented backups from starting:\n\n");
    report.push_str(
        &errors
            .iter()
            .map(|e| format!("• {}", e))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    report
}

pub fn format_dry_run_summary(summary: &DryRunSummary, kind: BackendKind) -> String {
    let total_size = summary.total_size();
    let estimate = estimate_transfer_time(total_size, kind).ceil() as u64;

    let mut lines = vec![
        "=== Backup Copy - Dry Run ===".to_string(),
        String::new(),
        format!("Destination type: {}", kind),
        format!("Backups analyzed: {}", summary.total()),
        format!("Successful: {}", summary.successful()),
        format!("Failed: {}", summary.failed()),
        format!("Total files: {}", summary.total_files()),
        format!("Total size: {}", format_bytes(total_size)),
        format!("Estimated transfer time: {}", format_duration(estimate)),
    ];

    for result in &summary.results {
        lines.push(String::new());
        if !result.success {
            lines.push(format!("[✗ FAILED] {}", result.name));
            lines.push(format!("  Source: {}", result.source_dir.display()));
            lines.push(format!(
                "  Error: {}",
                result.error_message.as_deref().unwrap_or("unknown error")
            ));
            continue;
        }

        let selection = &result.selection;
        lines.push(format!("[{}] {}", kind, result.name));
        lines.push(format!("  Source: {}", result.source_dir.display()));
        lines.push(format!("  Destination: {}", result.destination));
        lines.push(format!(
            "  Files: {} ({})",
            result.file_count,
            format_bytes(result.total_bytes)
        ));
        lines.push(format!(
            "  Excluded: {} (too old: {}, over size limit: {}, unreadable: {})",
            selection.excluded.len(),
            selection.excluded_count(ExclusionReason::TooOld),
            selection.excluded_count(ExclusionReason::OverBudget),
            selection.excluded_count(ExclusionReason::Unreadable)
        ));
        lines.push(format!(
            "  Estimated transfer time: {}",
            format_duration(estimate_transfer_time(result.total_bytes, kind).ceil() as u64)
        ));
    }

    lines.join("\n")
}
