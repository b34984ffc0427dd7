//! Import progress tracking
//!
//! An import run writes progress while separate poll requests read it, so the
//! state lives in a shared keyed store addressed by [`TaskId`], never in the
//! run's own stack. Entries expire after a TTL that is refreshed on every
//! write.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::TaskId;

/// Lifecycle of an import task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Created,
    Validating,
    Processing,
    Completed,
    Failed,
}

/// One failed row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    #[serde(rename = "error")]
    pub message: String,
}

/// Result of processing a single row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Success,
    Failed(RowError),
}

/// Full task state held by the store
#[derive(Debug, Clone)]
pub struct ImportTask {
    pub task_id: TaskId,
    pub total: usize,
    pub processed: usize,
    pub success_count: usize,
    pub errors: Vec<RowError>,
    pub state: TaskState,
    /// 1-based batch currently being processed
    pub batch: usize,
    expires_at: Instant,
}

/// What a poll returns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub processed: usize,
    pub success: usize,
    pub errors: Vec<RowError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
}

impl From<&ImportTask> for ProgressSnapshot {
    fn from(task: &ImportTask) -> Self {
        Self {
            total: task.total,
            processed: task.processed,
            success: task.success_count,
            errors: task.errors.clone(),
            state: Some(task.state),
        }
    }
}

/// Shared, TTL-bound progress store
pub trait ProgressStore: Send + Sync {
    fn init(&self, id: TaskId, total: usize);

    fn set_state(&self, id: TaskId, state: TaskState, batch: Option<usize>);

    /// Count one processed row; atomic with respect to `read`
    fn increment(&self, id: TaskId, outcome: RowOutcome);

    /// Current progress; unknown or expired ids yield a zeroed snapshot
    fn read(&self, id: TaskId) -> ProgressSnapshot;

    fn clear(&self, id: TaskId);

    /// Drop every expired task; returns how many were removed
    fn purge_expired(&self) -> usize;
}

/// In-process store backed by a concurrent map
pub struct MemoryProgressStore {
    tasks: DashMap<TaskId, ImportTask>,
    ttl: Duration,
}

impl MemoryProgressStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tasks: DashMap::new(),
            ttl,
        }
    }

    fn touch(&self, task: &mut ImportTask) {
        task.expires_at = Instant::now() + self.ttl;
    }
}

impl Default for MemoryProgressStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl ProgressStore for MemoryProgressStore {
    fn init(&self, id: TaskId, total: usize) {
        debug!(task_id = %id, total, "Tracking import task");
        self.tasks.insert(
            id,
            ImportTask {
                task_id: id,
                total,
                processed: 0,
                success_count: 0,
                errors: Vec::new(),
                state: TaskState::Created,
                batch: 0,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    fn set_state(&self, id: TaskId, state: TaskState, batch: Option<usize>) {
        if let Some(mut task) = self.tasks.get_mut(&id) {
            task.state = state;
            if let Some(batch) = batch {
                task.batch = batch;
            }
            self.touch(&mut task);
        }
    }

    fn increment(&self, id: TaskId, outcome: RowOutcome) {
        if let Some(mut task) = self.tasks.get_mut(&id) {
            task.processed += 1;
            match outcome {
                RowOutcome::Success => task.success_count += 1,
                RowOutcome::Failed(error) => task.errors.push(error),
            }
            self.touch(&mut task);
        }
    }

    fn read(&self, id: TaskId) -> ProgressSnapshot {
        let expired = match self.tasks.get(&id) {
            Some(task) if task.expires_at > Instant::now() => {
                return ProgressSnapshot::from(&*task);
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.tasks.remove(&id);
        }
        ProgressSnapshot::default()
    }

    fn clear(&self, id: TaskId) {
        self.tasks.remove(&id);
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.tasks.len();
        self.tasks.retain(|_, task| task.expires_at > now);
        before.saturating_sub(self.tasks.len())
    }
}
