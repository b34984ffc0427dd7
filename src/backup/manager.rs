//! Backup orchestrator
//!
//! Snapshots the registered collections into one versioned envelope, gzips it
//! and hands it to a storage backend. With media enabled a second artifact,
//! the media tar.gz, is stored next to it. Every run appends one history
//! entry whether it succeeded, partially failed or failed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::audit::{default_actor, HistoryEntry, HistoryLog, RunStatus};
use crate::backends::{Locator, StorageBackend};
use crate::codec;
use crate::error::{VaultError, VaultResult};
use crate::models::snapshot::{media_filename, snapshot_filename};
use crate::models::{CollectionDescriptor, Snapshot};
use crate::storage::RecordStore;

use super::media::{self, MEDIA_CONTENT_TYPE};

/// What to back up
#[derive(Debug, Clone)]
pub struct BackupRequest {
    /// Collection names; empty means every registered collection
    pub collections: Vec<String>,
    pub compress: bool,
    pub include_media: bool,
    pub actor: String,
}

impl Default for BackupRequest {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            compress: true,
            include_media: false,
            actor: default_actor(),
        }
    }
}

/// Outcome of one backup run
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub filename: String,
    /// Size of the stored data artifact in bytes
    pub size: u64,
    pub status: RunStatus,
    pub counts: BTreeMap<String, usize>,
    pub locator: Locator,
    pub media: Option<Locator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_error: Option<String>,
}

impl BackupReport {
    pub fn total_records(&self) -> usize {
        self.counts.values().sum()
    }

    /// The partial failure as an error, when the media artifact was lost
    pub fn partial_failure(&self) -> Option<VaultError> {
        self.media_error
            .as_ref()
            .map(|media_error| VaultError::PartialBackupFailure {
                data: self.locator.clone(),
                media_error: media_error.clone(),
            })
    }
}

/// Creates snapshots and stores them through one backend
pub struct BackupManager {
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn StorageBackend>,
    history: HistoryLog,
    registry: Vec<CollectionDescriptor>,
    media_root: PathBuf,
    media_subdirs: Vec<String>,
}

impl BackupManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn StorageBackend>,
        history: HistoryLog,
        registry: Vec<CollectionDescriptor>,
    ) -> Self {
        Self {
            store,
            backend,
            history,
            registry,
            media_root: PathBuf::new(),
            media_subdirs: Vec::new(),
        }
    }

    /// Where media is packed from when a request includes it
    pub fn with_media(mut self, media_root: PathBuf, subdirs: Vec<String>) -> Self {
        self.media_root = media_root;
        self.media_subdirs = subdirs;
        self
    }

    pub async fn run(&self, request: &BackupRequest) -> VaultResult<BackupReport> {
        self.run_at(request, Utc::now()).await
    }

    pub(crate) async fn run_at(
        &self,
        request: &BackupRequest,
        now: DateTime<Utc>,
    ) -> VaultResult<BackupReport> {
        let kind = self.backend.kind();
        let filename = snapshot_filename(&now, request.compress);
        info!(backend = %kind, file = %filename, "Starting backup");

        let result = self.store_data(request, now, &filename).await;
        let (snapshot, size, locator) = match result {
            Ok(stored) => stored,
            Err(e) => {
                error!(backend = %kind, error = %e, "Backup failed");
                let entry = HistoryEntry::backup(&filename, kind, &request.actor);
                self.record(entry.failed(e.to_string()));
                return Err(e);
            }
        };

        let mut report = BackupReport {
            filename: filename.clone(),
            size,
            status: RunStatus::Success,
            counts: snapshot.counts(),
            locator,
            media: None,
            media_error: None,
        };

        if request.include_media {
            match self.store_media(&report.locator, now).await {
                Ok(media) => report.media = Some(media),
                Err(e) => {
                    warn!(backend = %kind, error = %e, "Media upload failed; data artifact kept");
                    report.status = RunStatus::Partial;
                    report.media_error = Some(e.to_string());
                }
            }
        }

        self.record(
            HistoryEntry::backup(&filename, kind, &request.actor)
                .with_counts(report.counts.clone(), report.size)
                .with_status(report.status, report.media_error.clone()),
        );
        info!(
            backend = %kind,
            file = %filename,
            records = report.total_records(),
            size = report.size,
            status = %report.status,
            "Backup finished"
        );
        Ok(report)
    }

    /// Build, encode and upload the data snapshot
    async fn store_data(
        &self,
        request: &BackupRequest,
        now: DateTime<Utc>,
        filename: &str,
    ) -> VaultResult<(Snapshot, u64, Locator)> {
        let snapshot = self.snapshot(request, now)?;
        let json = snapshot.to_json_bytes()?;
        let (bytes, content_type) = if request.compress {
            (codec::compress(&json)?, "application/gzip")
        } else {
            (json, "application/json")
        };
        let size = bytes.len() as u64;
        let locator = self.backend.put(filename, bytes, content_type).await?;
        Ok((snapshot, size, locator))
    }

    /// Snapshot the requested collections; unknown or unreadable ones are skipped
    pub fn snapshot(&self, request: &BackupRequest, now: DateTime<Utc>) -> VaultResult<Snapshot> {
        let names: Vec<String> = if request.collections.is_empty() {
            self.registry.iter().map(|d| d.name.clone()).collect()
        } else {
            request.collections.clone()
        };

        let mut snapshot = Snapshot::new(now, self.backend.kind().as_str(), request.include_media);
        for name in names {
            if !self.registry.iter().any(|d| d.name == name) {
                warn!(collection = %name, "Unknown collection, skipping");
                continue;
            }
            match self.store.fetch_all(&name) {
                Ok(records) => {
                    info!(collection = %name, records = records.len(), "Collection captured");
                    snapshot.insert_collection(name, records);
                }
                Err(e) => {
                    warn!(collection = %name, error = %e, "Failed to read collection, skipping")
                }
            }
        }

        if snapshot.collections.is_empty() {
            return Err(VaultError::Validation("No collections to back up".into()));
        }
        Ok(snapshot)
    }

    async fn store_media(&self, anchor: &Locator, now: DateTime<Utc>) -> VaultResult<Locator> {
        let root = self.media_root.clone();
        let subdirs = self.media_subdirs.clone();
        let archive = tokio::task::spawn_blocking(move || media::pack(&root, &subdirs))
            .await
            .map_err(|e| VaultError::Io(format!("Media packing task failed: {}", e)))??;

        self.backend
            .put_related(anchor, &media_filename(&now), archive, MEDIA_CONTENT_TYPE)
            .await
    }

    fn record(&self, entry: HistoryEntry) {
        if let Err(e) = self.history.append(&entry) {
            warn!(error = %e, "Failed to write backup history");
        }
    }
}
