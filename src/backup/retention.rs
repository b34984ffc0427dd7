//! Retention cleanup
//!
//! Deletes stored artifacts older than the retention window. Age comes from
//! the timestamp in the artifact name, falling back to the backend's
//! modification time.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backends::{Entry, StorageBackend};
use crate::error::VaultResult;
use crate::models::snapshot::artifact_timestamp;

/// Result of one cleanup pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub examined: usize,
    pub deleted: Vec<String>,
    pub kept: usize,
    /// Artifacts that could not be deleted, with the reason
    pub failed: Vec<(String, String)>,
}

/// What a cleanup would do
#[derive(Debug, Clone, Default)]
pub struct RetentionPlan {
    pub expired: Vec<Entry>,
    pub kept: usize,
}

pub struct RetentionJob {
    backend: Arc<dyn StorageBackend>,
    retention_days: u32,
}

impl RetentionJob {
    pub fn new(backend: Arc<dyn StorageBackend>, retention_days: u32) -> Self {
        Self {
            backend,
            retention_days,
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    pub async fn run(&self) -> VaultResult<CleanupReport> {
        self.run_at(Utc::now()).await
    }

    /// Artifacts that a cleanup at `now` would delete
    pub async fn plan_at(&self, now: DateTime<Utc>) -> VaultResult<RetentionPlan> {
        let cutoff = now - Duration::days(i64::from(self.retention_days));
        let mut plan = RetentionPlan::default();

        for entry in self.backend.list("").await? {
            let Some(created) = created_at(&entry) else {
                debug!(name = %entry.name, "Not an artifact, skipping");
                continue;
            };
            if created < cutoff {
                plan.expired.push(entry);
            } else {
                plan.kept += 1;
            }
        }
        Ok(plan)
    }

    /// Delete every artifact created before `now - retention_days`
    pub async fn run_at(&self, now: DateTime<Utc>) -> VaultResult<CleanupReport> {
        let plan = self.plan_at(now).await?;
        let mut report = CleanupReport {
            examined: plan.expired.len() + plan.kept,
            kept: plan.kept,
            ..CleanupReport::default()
        };
        // Artifacts sharing a group (one release) are removed by one delete
        let mut removed_groups: HashSet<String> = HashSet::new();

        for entry in plan.expired {
            if let Some(group) = &entry.locator.group {
                if removed_groups.contains(group) {
                    report.deleted.push(entry.name);
                    continue;
                }
            }

            match self.backend.delete(&entry.locator).await {
                Ok(existed) => {
                    if !existed {
                        debug!(name = %entry.name, "Artifact already gone");
                    }
                    if let Some(group) = entry.locator.group.clone() {
                        removed_groups.insert(group);
                    }
                    info!(name = %entry.name, "Deleted expired artifact");
                    report.deleted.push(entry.name);
                }
                Err(e) => {
                    warn!(name = %entry.name, error = %e, "Failed to delete expired artifact");
                    report.failed.push((entry.name, e.to_string()));
                }
            }
        }

        info!(
            backend = %self.backend.kind(),
            retention_days = self.retention_days,
            examined = report.examined,
            deleted = report.deleted.len(),
            "Retention cleanup finished"
        );
        Ok(report)
    }
}

fn created_at(entry: &Entry) -> Option<DateTime<Utc>> {
    artifact_timestamp(&entry.name).or_else(|| {
        entry
            .name
            .starts_with("backup_")
            .then_some(entry.modified_at)
            .flatten()
    })
}
