//! History entry data structures
//!
//! One entry per backup or restore run, written once and never mutated.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backends::BackendKind;

/// Which kind of run produced the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Backup,
    Restore,
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunKind::Backup => write!(f, "BACKUP"),
            RunKind::Restore => write!(f, "RESTORE"),
        }
    }
}

/// Final status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    /// Data stored, media failed (backup) or some collections skipped (restore)
    Partial,
    Failure,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Failure => write!(f, "failure"),
        }
    }
}

/// A single history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: RunKind,

    /// When the run finished (UTC)
    pub timestamp: DateTime<Utc>,

    pub filename: String,

    /// Artifact size in bytes
    #[serde(default)]
    pub size: u64,

    pub status: RunStatus,

    pub backend: BackendKind,

    /// Records per collection
    #[serde(default)]
    pub counts: BTreeMap<String, usize>,

    /// Who triggered the run
    pub actor: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

impl HistoryEntry {
    fn new(kind: RunKind, filename: impl Into<String>, backend: BackendKind, actor: &str) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            filename: filename.into(),
            size: 0,
            status: RunStatus::Success,
            backend,
            counts: BTreeMap::new(),
            actor: actor.to_string(),
            error_message: None,
            dry_run: false,
        }
    }

    pub fn backup(filename: impl Into<String>, backend: BackendKind, actor: &str) -> Self {
        Self::new(RunKind::Backup, filename, backend, actor)
    }

    pub fn restore(filename: impl Into<String>, backend: BackendKind, actor: &str) -> Self {
        Self::new(RunKind::Restore, filename, backend, actor)
    }

    pub fn with_counts(mut self, counts: BTreeMap<String, usize>, size: u64) -> Self {
        self.counts = counts;
        self.size = size;
        self
    }

    pub fn with_status(mut self, status: RunStatus, error_message: Option<String>) -> Self {
        self.status = status;
        self.error_message = error_message;
        self
    }

    pub fn failed(self, error_message: impl Into<String>) -> Self {
        self.with_status(RunStatus::Failure, Some(error_message.into()))
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Total records across collections
    pub fn total_records(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Actor recorded when none is given: the login name, else "cli"
pub fn default_actor() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "cli".to_string())
}
