//! Backup Copy - Main entry point
//!
//! Without a destination, runs the jobs due today against their rclone
//! remotes (meant to be started daily from cron). With a destination, copies
//! every job into that local directory.

use anyhow::Result;
use backup_copy::executor::report::{
    format_dry_run_summary, format_preflight_failure, format_run_summary, NO_JOBS_SCHEDULED,
};
use backup_copy::schedule::ScheduleChecker;
use backup_copy::{notify, shutdown, transfer, utils};
use backup_copy::{BackupJob, Config, Orchestrator, RunMode};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};

const EXIT_OK: u8 = 0;
const EXIT_ABORTED: u8 = 1;
const EXIT_JOB_FAILURES: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Local filesystem destination (enables local backup mode)
    destination: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Analyze what would be copied without copying or deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Print each job's next scheduled run and exit
    #[arg(long)]
    next: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let code = tokio::select! {
        result = run(args) => match result {
            Ok(code) => code,
            Err(e) => {
                eprintln!("ERROR: Unexpected error: {:#}", e);
                error!("Unexpected error: {:#}", e);
                EXIT_ABORTED
            }
        },
        interrupt = shutdown::wait_for_interrupt() => {
            eprintln!("\nINTERRUPTED: Backup process stopped by {}", interrupt);
            warn!("Backup process stopped by {}", interrupt);
            EXIT_INTERRUPTED
        }
    };

    ExitCode::from(code)
}

async fn run(args: Args) -> Result<u8> {
    let started = Instant::now();

    // A missing .env is fine; variables may come from the environment itself
    let _ = dotenvy::dotenv();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return Ok(EXIT_ABORTED);
        }
    };

    let mode = RunMode::from_args(args.destination.clone(), args.dry_run);

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    let console = !mode.uses_schedule() || args.next;
    utils::logger::init(log_level, console, config.log.file.as_deref())?;

    info!(
        "Starting backup-copy v{} in {} mode",
        env!("CARGO_PKG_VERSION"),
        mode
    );

    let jobs = config.backup_jobs()?;
    info!("Configuration loaded with {} backup items", jobs.len());

    if args.next {
        print_next_runs(&jobs);
        return Ok(EXIT_OK);
    }

    let orchestrator = Orchestrator::new(transfer::backend_for(&mode, &config)?);

    let code = match &mode {
        RunMode::DryRun { .. } => dry_run(&orchestrator, &jobs).await,
        RunMode::Scheduled | RunMode::Local { .. } => {
            backup(&config, &mode, &orchestrator, jobs).await?
        }
    };

    info!(
        "Backup process completed in {:.2} seconds",
        started.elapsed().as_secs_f64()
    );
    Ok(code)
}

fn print_next_runs(jobs: &[BackupJob]) {
    let checker = ScheduleChecker::new();
    let now = Local::now();

    for job in jobs {
        match checker.next_fire_time(job, now) {
            Ok(next) => println!(
                "{:<24} {:<16} next run {}{}",
                job.name,
                job.schedule,
                next.format("%Y-%m-%d %H:%M"),
                if job.remote_enabled { "" } else { " (remote disabled)" }
            ),
            Err(e) => println!("{:<24} {}", job.name, e),
        }
    }
}

async fn dry_run(orchestrator: &Orchestrator, jobs: &[BackupJob]) -> u8 {
    info!("Dry run: analyzing all {} backup items", jobs.len());

    let summary = orchestrator.run_all_dry_run(jobs).await;
    info!(
        "\n{}",
        format_dry_run_summary(&summary, orchestrator.backend_kind())
    );

    if summary.failed() > 0 {
        EXIT_JOB_FAILURES
    } else {
        EXIT_OK
    }
}

async fn backup(
    config: &Config,
    mode: &RunMode,
    orchestrator: &Orchestrator,
    jobs: Vec<BackupJob>,
) -> Result<u8> {
    let notifier = notify::from_config(&config.notify)?;

    let jobs = if mode.uses_schedule() {
        let scheduled = ScheduleChecker::new().scheduled_jobs(&jobs, Local::now());
        if scheduled.is_empty() {
            info!("No backups scheduled to run today");
            if let Some(notifier) = &notifier {
                notify::deliver(notifier.as_ref(), NO_JOBS_SCHEDULED, false).await;
            }
            return Ok(EXIT_OK);
        }
        info!("Found {} backups scheduled to run today", scheduled.len());
        scheduled
    } else {
        info!(
            "Local mode: processing all {} backup items (schedule ignored)",
            jobs.len()
        );
        jobs
    };

    info!("Performing pre-flight checks...");
    let preflight_errors = orchestrator.preflight_checks(&jobs).await;
    if !preflight_errors.is_empty() {
        error!("Pre-flight checks failed:");
        for e in &preflight_errors {
            error!("  - {}", e);
        }
        if let Some(notifier) = &notifier {
            let report = format_preflight_failure(&preflight_errors);
            notify::deliver(notifier.as_ref(), &report, true).await;
        }
        return Ok(EXIT_ABORTED);
    }
    info!("Pre-flight checks passed");

    let summary = orchestrator.run_all(&jobs).await;
    let report = format_run_summary(&summary);
    info!("\n{}", report);

    if let Some(notifier) = &notifier {
        notify::deliver(notifier.as_ref(), &report, summary.has_failures()).await;
    }

    if summary.has_failures() {
        warn!("Some backups failed - check logs for details");
        Ok(EXIT_JOB_FAILURES)
    } else {
        info!("All backups completed successfully");
        Ok(EXIT_OK)
    }
}
