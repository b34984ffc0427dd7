//! Snapshot restoration
//!
//! A snapshot is fetched, decoded and fully parsed before anything is
//! touched, so a corrupt envelope aborts with no partial apply. Each selected
//! collection is then applied as one atomic unit (optional clear, then
//! inserts). Records whose natural key is already present are skipped, which
//! makes restoring the same snapshot twice harmless.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::audit::{HistoryEntry, HistoryLog, RunStatus};
use crate::backends::{Locator, StorageBackend};
use crate::codec;
use crate::error::{VaultError, VaultResult};
use crate::models::snapshot::{artifact_timestamp, media_filename};
use crate::models::{CollectionDescriptor, Snapshot, SnapshotMetadata};
use crate::storage::RecordStore;

use super::media;

/// Where a snapshot comes from
#[derive(Debug, Clone)]
pub enum RestoreSource {
    Locator(Locator),
    /// Artifact name resolved through the backend
    Name(String),
    Bytes { name: String, bytes: Vec<u8> },
}

impl RestoreSource {
    fn display_name(&self) -> String {
        match self {
            RestoreSource::Locator(locator) => locator
                .reference
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(&locator.reference)
                .to_string(),
            RestoreSource::Name(name) => name.clone(),
            RestoreSource::Bytes { name, .. } => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Collections to restore; empty means all in the snapshot
    pub collections: Vec<String>,
    pub clear_existing: bool,
    pub dry_run: bool,
    /// Must be set for anything but a dry run
    pub confirmed: bool,
    /// Companion media archive to extract after the data
    pub media: Option<RestoreSource>,
    pub actor: String,
}

/// What a snapshot holds, without applying it
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub filename: String,
    pub size: u64,
    pub metadata: SnapshotMetadata,
    pub counts: BTreeMap<String, usize>,
}

impl SnapshotSummary {
    pub fn total_records(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Per-collection record counts of a stored snapshot
pub async fn snapshot_counts(
    backend: &dyn StorageBackend,
    locator: &Locator,
) -> VaultResult<BTreeMap<String, usize>> {
    let raw = backend.get(locator).await?;
    let json = codec::decode(raw)?;
    Ok(Snapshot::from_json_bytes(&json)?.counts())
}

/// Outcome of a restore run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    pub filename: String,
    pub size: u64,
    pub dry_run: bool,
    /// Records inserted per collection
    pub restored: BTreeMap<String, usize>,
    /// Records already present per collection
    pub skipped: BTreeMap<String, usize>,
    /// Requested collections absent from the snapshot
    pub missing: Vec<String>,
    /// Records a dry run would apply per collection
    pub pending: BTreeMap<String, usize>,
    pub media_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_error: Option<String>,
}

impl RestoreReport {
    pub fn total_restored(&self) -> usize {
        self.restored.values().sum()
    }

    pub fn total_pending(&self) -> usize {
        self.pending.values().sum()
    }
}

struct LoadedSnapshot {
    filename: String,
    size: u64,
    snapshot: Snapshot,
}

/// Name of the media archive taken alongside a data snapshot
pub fn companion_media_name(snapshot_name: &str) -> Option<String> {
    artifact_timestamp(snapshot_name).map(|at| media_filename(&at))
}

/// Applies snapshots from one backend to the record store
pub struct RestoreManager {
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn StorageBackend>,
    history: HistoryLog,
    registry: Vec<CollectionDescriptor>,
    media_root: PathBuf,
}

impl RestoreManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn StorageBackend>,
        history: HistoryLog,
        registry: Vec<CollectionDescriptor>,
        media_root: PathBuf,
    ) -> Self {
        Self {
            store,
            backend,
            history,
            registry,
            media_root,
        }
    }

    async fn fetch(&self, source: &RestoreSource) -> VaultResult<Vec<u8>> {
        match source {
            RestoreSource::Locator(locator) => self.backend.get(locator).await,
            RestoreSource::Name(name) => {
                let locator = self.backend.resolve(name).await?;
                self.backend.get(&locator).await
            }
            RestoreSource::Bytes { bytes, .. } => Ok(bytes.clone()),
        }
    }

    async fn load(&self, source: &RestoreSource) -> VaultResult<LoadedSnapshot> {
        let raw = self.fetch(source).await?;
        let size = raw.len() as u64;
        let json = codec::decode(raw)?;
        let snapshot = Snapshot::from_json_bytes(&json)?;
        Ok(LoadedSnapshot {
            filename: source.display_name(),
            size,
            snapshot,
        })
    }

    /// Parse a snapshot and report its contents without applying it
    pub async fn inspect(&self, source: &RestoreSource) -> VaultResult<SnapshotSummary> {
        let loaded = self.load(source).await?;
        Ok(SnapshotSummary {
            filename: loaded.filename,
            size: loaded.size,
            counts: loaded.snapshot.counts(),
            metadata: loaded.snapshot.metadata,
        })
    }

    pub async fn restore(
        &self,
        source: &RestoreSource,
        options: &RestoreOptions,
    ) -> VaultResult<RestoreReport> {
        if !options.dry_run && !options.confirmed {
            return Err(VaultError::ConfirmationRequired);
        }

        let kind = self.backend.kind();
        let entry = HistoryEntry::restore(source.display_name(), kind, &options.actor)
            .dry_run(options.dry_run);

        let loaded = match self.load(source).await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(backend = %kind, error = %e, "Failed to load snapshot");
                self.record(entry.failed(e.to_string()));
                return Err(e);
            }
        };

        let mut report = RestoreReport {
            filename: loaded.filename.clone(),
            size: loaded.size,
            dry_run: options.dry_run,
            ..RestoreReport::default()
        };
        let entry = HistoryEntry::restore(&loaded.filename, kind, &options.actor)
            .dry_run(options.dry_run);

        let selected = self.select(&loaded.snapshot, options, &mut report);
        for name in &report.missing {
            warn!(collection = %name, "Collection not in snapshot, skipping");
        }

        if options.dry_run {
            for name in &selected {
                if let Some(collection) = loaded.snapshot.collections.get(name) {
                    report.pending.insert(name.clone(), collection.count);
                }
            }
            info!(
                file = %report.filename,
                pending = report.total_pending(),
                "Dry run: nothing was changed"
            );
            self.record(entry.with_counts(report.pending.clone(), report.size));
            return Ok(report);
        }

        let mut collections = loaded.snapshot.collections;
        for name in selected {
            let Some(collection) = collections.remove(&name) else {
                continue;
            };
            let descriptor = self.descriptor(&name);
            match self
                .store
                .apply_snapshot(&descriptor, collection.data, options.clear_existing)
            {
                Ok(outcome) => {
                    info!(
                        collection = %name,
                        inserted = outcome.inserted,
                        skipped = outcome.skipped,
                        cleared = outcome.cleared,
                        "Collection restored"
                    );
                    report.restored.insert(name.clone(), outcome.inserted);
                    report.skipped.insert(name, outcome.skipped);
                }
                Err(e) => {
                    error!(collection = %name, error = %e, "Restore failed");
                    self.record(
                        entry
                            .with_counts(report.restored.clone(), report.size)
                            .failed(format!("{}: {}", name, e)),
                    );
                    return Err(e);
                }
            }
        }

        if let Some(media_source) = &options.media {
            match self.restore_media(media_source).await {
                Ok(files) => report.media_files = Some(files),
                Err(e) => {
                    warn!(error = %e, "Media restore failed");
                    report.media_error = Some(e.to_string());
                }
            }
        }

        let status = if report.media_error.is_some() || !report.missing.is_empty() {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
        let message = report.media_error.clone().or_else(|| {
            (!report.missing.is_empty())
                .then(|| format!("Missing collections: {}", report.missing.join(", ")))
        });
        self.record(
            entry
                .with_counts(report.restored.clone(), report.size)
                .with_status(status, message),
        );
        info!(
            file = %report.filename,
            restored = report.total_restored(),
            status = %status,
            "Restore finished"
        );
        Ok(report)
    }

    /// Collections to apply, registry order first; fills `report.missing`
    fn select(
        &self,
        snapshot: &Snapshot,
        options: &RestoreOptions,
        report: &mut RestoreReport,
    ) -> Vec<String> {
        let mut wanted: Vec<String> = if options.collections.is_empty() {
            snapshot.collections.keys().cloned().collect()
        } else {
            options.collections.clone()
        };

        report.missing = wanted
            .iter()
            .filter(|name| !snapshot.collections.contains_key(*name))
            .cloned()
            .collect();
        wanted.retain(|name| snapshot.collections.contains_key(name));

        let rank = |name: &String| {
            self.registry
                .iter()
                .position(|d| &d.name == name)
                .unwrap_or(usize::MAX)
        };
        wanted.sort_by(|a, b| rank(a).cmp(&rank(b)).then(a.cmp(b)));
        wanted.dedup();
        wanted
    }

    fn descriptor(&self, name: &str) -> CollectionDescriptor {
        self.registry
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .unwrap_or_else(|| CollectionDescriptor::new(name, &[]))
    }

    async fn restore_media(&self, source: &RestoreSource) -> VaultResult<usize> {
        let bytes = self.fetch(source).await?;
        let root = self.media_root.clone();
        let files = tokio::task::spawn_blocking(move || media::unpack(&bytes, &root))
            .await
            .map_err(|e| VaultError::Io(format!("Media extraction task failed: {}", e)))??;
        info!(files, "Media restored");
        Ok(files)
    }

    fn record(&self, entry: HistoryEntry) {
        if let Err(e) = self.history.append(&entry) {
            warn!(error = %e, "Failed to write restore history");
        }
    }
}
