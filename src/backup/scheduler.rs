//! Recurring backups and retention cleanup
//!
//! Times are UTC. Hourly backups run at the top of every hour with cleanup
//! once a day at 03:00. Daily and weekly (Sunday) backups run at the
//! configured time and cleanup follows after the configured offset, so an
//! in-flight snapshot is never deleted mid-write.
//!
//! Failures in scheduled runs are logged and land in history; they never stop
//! the loop.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc, Weekday};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{VaultError, VaultResult};

use super::manager::{BackupManager, BackupReport, BackupRequest};
use super::retention::{CleanupReport, RetentionJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interval {
    Hourly,
    #[default]
    Daily,
    /// Sundays
    Weekly,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Hourly => write!(f, "hourly"),
            Interval::Daily => write!(f, "daily"),
            Interval::Weekly => write!(f, "weekly"),
        }
    }
}

impl FromStr for Interval {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hourly" => Ok(Interval::Hourly),
            "daily" => Ok(Interval::Daily),
            "weekly" => Ok(Interval::Weekly),
            other => Err(VaultError::Configuration(format!(
                "Unknown interval '{}': expected hourly, daily or weekly",
                other
            ))),
        }
    }
}

/// Parse `HH:MM`
pub fn parse_time(s: &str) -> VaultResult<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| VaultError::Configuration(format!("Invalid time '{}': expected HH:MM", s)))
}

fn hourly_cleanup_time() -> NaiveTime {
    NaiveTime::from_hms_opt(3, 0, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Interval,
    pub at: NaiveTime,
    pub cleanup_offset: Duration,
}

impl Schedule {
    pub fn new(interval: Interval, at: NaiveTime, cleanup_offset_hours: u32) -> Self {
        Self {
            interval,
            at,
            cleanup_offset: Duration::hours(i64::from(cleanup_offset_hours)),
        }
    }

    /// First backup strictly after `after`
    pub fn next_backup(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match self.interval {
            Interval::Hourly => {
                let hour = after
                    .with_minute(0)
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0))
                    .unwrap_or(after);
                hour + Duration::hours(1)
            }
            Interval::Daily => next_at(after, self.at, None),
            Interval::Weekly => next_at(after, self.at, Some(Weekday::Sun)),
        }
    }

    /// First cleanup strictly after `after`
    pub fn next_cleanup(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match self.interval {
            Interval::Hourly => next_at(after, hourly_cleanup_time(), None),
            Interval::Daily => {
                next_at(after - self.cleanup_offset, self.at, None) + self.cleanup_offset
            }
            Interval::Weekly => {
                let shifted = after - self.cleanup_offset;
                next_at(shifted, self.at, Some(Weekday::Sun)) + self.cleanup_offset
            }
        }
    }
}

/// First instant after `after` at time `at`, optionally on `weekday`
fn next_at(after: DateTime<Utc>, at: NaiveTime, weekday: Option<Weekday>) -> DateTime<Utc> {
    let mut day = after.date_naive();
    loop {
        let candidate = day.and_time(at).and_utc();
        let day_matches = weekday.map_or(true, |w| day.weekday() == w);
        if day_matches && candidate > after {
            return candidate;
        }
        day = day.succ_opt().unwrap_or(day);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Backup,
    Cleanup,
}

/// Runs backups and cleanups on a [`Schedule`] until cancelled
pub struct Scheduler {
    schedule: Schedule,
    backup: BackupManager,
    request: BackupRequest,
    retention: RetentionJob,
}

impl Scheduler {
    pub fn new(
        schedule: Schedule,
        backup: BackupManager,
        request: BackupRequest,
        retention: RetentionJob,
    ) -> Self {
        Self {
            schedule,
            backup,
            request,
            retention,
        }
    }

    /// One backup; failures are logged and recorded, never returned
    pub async fn run_backup_once(&self) -> Option<BackupReport> {
        match self.backup.run(&self.request).await {
            Ok(report) => {
                if let Some(partial) = report.partial_failure() {
                    warn!(error = %partial, "Scheduled backup partially failed");
                }
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Scheduled backup failed");
                None
            }
        }
    }

    pub async fn run_cleanup_once(&self) -> Option<CleanupReport> {
        match self.retention.run().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Scheduled cleanup failed");
                None
            }
        }
    }

    /// Loop until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let now = Utc::now();
        let mut next_backup = self.schedule.next_backup(now);
        let mut next_cleanup = self.schedule.next_cleanup(now);
        info!(
            interval = %self.schedule.interval,
            next_backup = %next_backup,
            next_cleanup = %next_cleanup,
            retention_days = self.retention.retention_days(),
            "Scheduler started"
        );

        loop {
            let (job, due) = if next_backup <= next_cleanup {
                (Job::Backup, next_backup)
            } else {
                (Job::Cleanup, next_cleanup)
            };
            let wait = (due - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match job {
                Job::Backup => {
                    self.run_backup_once().await;
                    next_backup = self.schedule.next_backup(due);
                    info!(next_backup = %next_backup, "Next backup scheduled");
                }
                Job::Cleanup => {
                    self.run_cleanup_once().await;
                    next_cleanup = self.schedule.next_cleanup(due);
                }
            }
        }
    }
}
