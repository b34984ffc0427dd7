//! Backup, restore and retention
//!
//! - `BackupManager`: snapshots collections and stores the data artifact plus
//!   an optional media archive
//! - `RestoreManager`: inspects and applies snapshots, optionally extracting
//!   the media archive
//! - `RetentionJob`: deletes artifacts older than the retention window
//! - `Scheduler`: runs backups and cleanups on an hourly, daily or weekly
//!   schedule
//!
//! # Snapshot format
//!
//! A snapshot is gzip-compressed JSON with one key per collection holding
//! `{count, data}` and a reserved `_metadata` key:
//!
//! ```json
//! {
//!   "Center": {"count": 2, "data": [{"id": 1, "name": "..."}, ...]},
//!   "_metadata": {"backup_time": "20260301_020000", "format_version": 1, ...}
//! }
//! ```
//!
//! Files are named `backup_<YYYYMMDD_HHMMSS>.json.gz`; the media archive
//! taken in the same run is `media_<YYYYMMDD_HHMMSS>.tar.gz`.

mod manager;
pub mod media;
mod restore;
mod retention;
mod scheduler;

pub use manager::{BackupManager, BackupReport, BackupRequest};
pub use restore::{
    companion_media_name, snapshot_counts, RestoreManager, RestoreOptions, RestoreReport,
    RestoreSource, SnapshotSummary,
};
pub use retention::{CleanupReport, RetentionJob, RetentionPlan};
pub use scheduler::{parse_time, Interval, Schedule, Scheduler};
