//! Storage layer for centervault
//!
//! Provides atomic file writes and the record store the backup, restore and
//! import pipelines read from and write to.

pub mod file_io;
pub mod records;

pub use file_io::{read_json, write_bytes_atomic, write_json_atomic};
pub use records::{ApplyOutcome, JsonRecordStore, RecordStore};
