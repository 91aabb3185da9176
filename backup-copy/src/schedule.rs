//! Cron-based schedule evaluation.
//!
//! The copier is started once a day (typically from the system crontab), not
//! once a minute. A job therefore "runs today" when its schedule would have
//! fired at least once between local midnight and the moment of the check.

use crate::executor::BackupJob;
use chrono::{DateTime, Duration, Local, NaiveTime, Timelike};
use croner::Cron;
use thiserror::Error;
use tracing::{debug, warn};

/// Longest look-back when searching for the previous fire instant.
const MAX_LOOKBACK_DAYS: i64 = 366 * 30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {reason}")]
    Invalid { expr: String, reason: String },

    #[error("cron expression '{expr}' does not fire within the search range")]
    NoOccurrence { expr: String },

    #[error("error evaluating schedule for backup '{job}': {reason}")]
    Job { job: String, reason: String },
}

impl ScheduleError {
    fn for_job(self, job: &str) -> Self {
        ScheduleError::Job {
            job: job.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Fire-instant arithmetic for five-field cron expressions.
pub trait CronEvaluator {
    /// Most recent fire instant at or before `at`.
    fn prev_fire_at_or_before(
        &self,
        expr: &str,
        at: DateTime<Local>,
    ) -> Result<DateTime<Local>, ScheduleError>;

    /// First fire instant strictly after `at`.
    fn next_fire_after(
        &self,
        expr: &str,
        at: DateTime<Local>,
    ) -> Result<DateTime<Local>, ScheduleError>;
}

/// [`CronEvaluator`] backed by the `croner` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct CronerEvaluator;

impl CronerEvaluator {
    fn parse(expr: &str) -> Result<Cron, ScheduleError> {
        Cron::new(expr.trim())
            .parse()
            .map_err(|e| ScheduleError::Invalid {
                expr: expr.to_string(),
                reason: e.to_string(),
            })
    }

    fn first_at_or_after(
        cron: &Cron,
        expr: &str,
        at: DateTime<Local>,
    ) -> Result<DateTime<Local>, ScheduleError> {
        cron.find_next_occurrence(&at, true)
            .map_err(|_| ScheduleError::NoOccurrence {
                expr: expr.to_string(),
            })
    }
}

impl CronEvaluator for CronerEvaluator {
    // croner only searches forward. Widen a look-back window until some fire
    // instant lands at or before `at`, then bisect the window. Fire instants
    // are at least a minute apart, so once the bounds are closer than that,
    // the first fire at or after the lower bound is the latest one <= `at`.
    fn prev_fire_at_or_before(
        &self,
        expr: &str,
        at: DateTime<Local>,
    ) -> Result<DateTime<Local>, ScheduleError> {
        let cron = Self::parse(expr)?;

        let exact = Self::first_at_or_after(&cron, expr, at)?;
        if exact <= at {
            return Ok(exact);
        }

        let max_window = Duration::days(MAX_LOOKBACK_DAYS);
        let mut window = Duration::hours(1);
        let mut lo = loop {
            let candidate = at - window;
            if Self::first_at_or_after(&cron, expr, candidate)? <= at {
                break candidate;
            }
            if window >= max_window {
                return Err(ScheduleError::NoOccurrence {
                    expr: expr.to_string(),
                });
            }
            window = window * 2;
        };
        let mut hi = at;

        while hi - lo > Duration::seconds(30) {
            let mid = lo + (hi - lo) / 2;
            if Self::first_at_or_after(&cron, expr, mid)? <= at {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        Self::first_at_or_after(&cron, expr, lo)
    }

    fn next_fire_after(
        &self,
        expr: &str,
        at: DateTime<Local>,
    ) -> Result<DateTime<Local>, ScheduleError> {
        let cron = Self::parse(expr)?;
        cron.find_next_occurrence(&at, false)
            .map_err(|_| ScheduleError::NoOccurrence {
                expr: expr.to_string(),
            })
    }
}

/// Check that `expr` is a well-formed five-field cron expression.
pub fn validate_schedule(expr: &str) -> Result<(), ScheduleError> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(ScheduleError::Invalid {
            expr: expr.to_string(),
            reason: format!(
                "expected 5 fields 'minute hour day-of-month month day-of-week', found {}",
                fields
            ),
        });
    }

    CronerEvaluator::parse(expr).map(|_| ())
}

/// Decides which jobs fire today.
#[derive(Debug, Clone, Default)]
pub struct ScheduleChecker<E = CronerEvaluator> {
    evaluator: E,
}

impl ScheduleChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: CronEvaluator> ScheduleChecker<E> {
    pub fn with_evaluator(evaluator: E) -> Self {
        Self { evaluator }
    }

    /// Whether the job's schedule fired at least once since local midnight.
    pub fn should_run_today(
        &self,
        job: &BackupJob,
        now: DateTime<Local>,
    ) -> Result<bool, ScheduleError> {
        let previous = self
            .evaluator
            .prev_fire_at_or_before(&job.schedule, now)
            .map_err(|e| e.for_job(&job.name))?;

        Ok(previous >= start_of_day(now))
    }

    /// Next time this job's schedule fires after `now`.
    pub fn next_fire_time(
        &self,
        job: &BackupJob,
        now: DateTime<Local>,
    ) -> Result<DateTime<Local>, ScheduleError> {
        self.evaluator
            .next_fire_after(&job.schedule, now)
            .map_err(|e| e.for_job(&job.name))
    }

    /// Remote-enabled jobs whose schedule fires today, in input order.
    ///
    /// A job whose schedule cannot be evaluated is logged and skipped.
    pub fn scheduled_jobs(&self, jobs: &[BackupJob], now: DateTime<Local>) -> Vec<BackupJob> {
        jobs.iter()
            .filter(|job| {
                if !job.remote_enabled {
                    debug!(job = %job.name, "Skipping job disabled for remote mode");
                    return false;
                }
                match self.should_run_today(job, now) {
                    Ok(due) => due,
                    Err(e) => {
                        warn!("Could not evaluate schedule for backup '{}': {}", job.name, e);
                        false
                    }
                }
            })
            .cloned()
            .collect()
    }
}

fn start_of_day(now: DateTime<Local>) -> DateTime<Local> {
    now.date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or_else(|| now - Duration::seconds(i64::from(now.num_seconds_from_midnight())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn job(name: &str, schedule: &str, remote_enabled: bool) -> BackupJob {
        BackupJob {
            name: name.to_string(),
            source_dir: PathBuf::from("/data").join(name),
            remote_path: format!("remote:backups/{}", name),
            max_size_bytes: 1 << 30,
            max_age_days: 0,
            schedule: schedule.to_string(),
            retention: 2,
            remote_enabled,
        }
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Local> {
        // January 2024; the 8th is a Monday.
        Local.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_daily_schedule_after_fire_time() {
        let checker = ScheduleChecker::new();
        let daily = job("db", "0 5 * * *", true);
        assert!(checker.should_run_today(&daily, at(10, 6, 0)).unwrap());
    }

    #[test]
    fn test_daily_schedule_before_fire_time() {
        let checker = ScheduleChecker::new();
        let daily = job("db", "0 5 * * *", true);
        assert!(!checker.should_run_today(&daily, at(10, 4, 0)).unwrap());
    }

    #[test]
    fn test_weekly_schedule() {
        let checker = ScheduleChecker::new();
        let monday = job("weekly", "0 5 * * 1", true);
        assert!(checker.should_run_today(&monday, at(8, 6, 0)).unwrap());
        assert!(!checker.should_run_today(&monday, at(9, 6, 0)).unwrap());
    }

    #[test]
    fn test_default_schedule_fires_all_monday() {
        let checker = ScheduleChecker::new();
        let monday = job("default", "* * * * 1", true);
        assert!(checker.should_run_today(&monday, at(8, 0, 30)).unwrap());
        assert!(!checker.should_run_today(&monday, at(10, 12, 0)).unwrap());
    }

    #[test]
    fn test_prev_fire_at_exact_instant() {
        let evaluator = CronerEvaluator;
        let now = at(10, 5, 0);
        assert_eq!(evaluator.prev_fire_at_or_before("0 5 * * *", now).unwrap(), now);
    }

    #[test]
    fn test_prev_fire_finds_latest() {
        let evaluator = CronerEvaluator;
        let prev = evaluator
            .prev_fire_at_or_before("*/15 * * * *", at(10, 6, 7))
            .unwrap();
        assert_eq!(prev, at(10, 6, 0));

        let prev = evaluator
            .prev_fire_at_or_before("0 5 * * *", at(10, 4, 0))
            .unwrap();
        assert_eq!(prev, at(9, 5, 0));
    }

    #[test]
    fn test_prev_fire_far_in_the_past() {
        let evaluator = CronerEvaluator;
        let prev = evaluator
            .prev_fire_at_or_before("30 2 1 3 *", at(10, 6, 0))
            .unwrap();
        assert_eq!(prev, Local.with_ymd_and_hms(2023, 3, 1, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_next_fire_time() {
        let checker = ScheduleChecker::new();
        let daily = job("db", "0 5 * * *", true);
        assert_eq!(checker.next_fire_time(&daily, at(10, 6, 0)).unwrap(), at(11, 5, 0));
        assert_eq!(checker.next_fire_time(&daily, at(10, 4, 0)).unwrap(), at(10, 5, 0));
    }

    #[test]
    fn test_invalid_schedule_names_job() {
        let checker = ScheduleChecker::new();
        let broken = job("broken", "not a cron", true);
        let err = checker.should_run_today(&broken, at(10, 6, 0)).unwrap_err();
        assert!(err.to_string().contains("'broken'"));
    }

    #[test]
    fn test_scheduled_jobs_filters_disabled_and_broken() {
        let checker = ScheduleChecker::new();
        let jobs = vec![
            job("first", "0 5 * * *", true),
            job("disabled", "* * * * *", false),
            job("broken", "99 99 * * *", true),
            job("later", "0 23 * * *", true),
            job("second", "*/5 * * * *", true),
        ];

        let names: Vec<String> = checker
            .scheduled_jobs(&jobs, at(10, 6, 0))
            .into_iter()
            .map(|j| j.name)
            .collect();

        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_validate_schedule() {
        assert!(validate_schedule("0 5 * * *").is_ok());
        assert!(validate_schedule("*/10 2-4 1,15 * mon-fri").is_ok());
        assert!(validate_schedule("0 5 * *").is_err());
        assert!(validate_schedule("0 0 5 * * *").is_err());
        assert!(validate_schedule("61 5 * * *").is_err());
    }

    struct FixedEvaluator(DateTime<Local>);

    impl CronEvaluator for FixedEvaluator {
        fn prev_fire_at_or_before(
            &self,
            _expr: &str,
            _at: DateTime<Local>,
        ) -> Result<DateTime<Local>, ScheduleError> {
            Ok(self.0)
        }

        fn next_fire_after(
            &self,
            _expr: &str,
            _at: DateTime<Local>,
        ) -> Result<DateTime<Local>, ScheduleError> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_midnight_boundary() {
        let daily = job("db", "0 0 * * *", true);

        let checker = ScheduleChecker::with_evaluator(FixedEvaluator(at(10, 0, 0)));
        assert!(checker.should_run_today(&daily, at(10, 0, 1)).unwrap());

        let checker = ScheduleChecker::with_evaluator(FixedEvaluator(at(9, 23, 59)));
        assert!(!checker.should_run_today(&daily, at(10, 0, 1)).unwrap());
    }
}
