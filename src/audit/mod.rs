//! Run history for centervault
//!
//! Every backup and restore run appends exactly one entry to an append-only
//! JSONL log, including unattended scheduled runs whose failures are never
//! raised to a human.
//!
//! - `HistoryEntry`: filename, size, status, per-collection counts, actor,
//!   timestamp and error message of one run.
//! - `HistoryLog`: appends entries and reads them back.

mod entry;
mod logger;

pub use entry::{default_actor, HistoryEntry, RunKind, RunStatus};
pub use logger::HistoryLog;
