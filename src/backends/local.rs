//! Local filesystem backend
//!
//! Artifacts are plain files under the backup directory, written atomically.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::{ensure_kind, sort_newest_first, BackendKind, Entry, Locator, StorageBackend};
use crate::error::{VaultError, VaultResult};
use crate::storage::write_bytes_atomic;

pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> VaultResult<PathBuf> {
        let plain = !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != "..";
        if !plain {
            return Err(VaultError::Validation(format!(
                "Invalid artifact name: {:?}",
                name
            )));
        }
        Ok(self.root.join(name))
    }

    fn locator_for(&self, path: &Path) -> Locator {
        Locator::new(BackendKind::Local, path.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, name: &str, bytes: Vec<u8>, _content_type: &str) -> VaultResult<Locator> {
        let path = self.path_for(name)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_bytes_atomic(&target, &bytes))
            .await
            .map_err(|e| VaultError::Io(format!("Write task failed: {}", e)))??;

        debug!(path = %path.display(), "Stored artifact");
        Ok(self.locator_for(&path))
    }

    async fn list(&self, prefix: &str) -> VaultResult<Vec<Entry>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(VaultError::Io(format!(
                    "Failed to read {}: {}",
                    self.root.display(),
                    e
                )))
            }
        };

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().into_owned();
            if !name.starts_with(prefix) || name.ends_with(".tmp") {
                continue;
            }
            let metadata = item.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(Entry {
                size: metadata.len(),
                modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
                locator: self.locator_for(&item.path()),
                download_count: None,
                name,
            });
        }

        sort_newest_first(&mut entries);
        Ok(entries)
    }

    async fn get(&self, locator: &Locator) -> VaultResult<Vec<u8>> {
        ensure_kind(BackendKind::Local, locator)?;
        match tokio::fs::read(&locator.reference).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(VaultError::backup_not_found(&locator.reference))
            }
            Err(e) => Err(VaultError::Io(format!(
                "Failed to read {}: {}",
                locator.reference, e
            ))),
        }
    }

    async fn delete(&self, locator: &Locator) -> VaultResult<bool> {
        ensure_kind(BackendKind::Local, locator)?;
        match tokio::fs::remove_file(&locator.reference).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(VaultError::Io(format!(
                "Failed to delete {}: {}",
                locator.reference, e
            ))),
        }
    }

    async fn resolve(&self, name: &str) -> VaultResult<Locator> {
        let path = self.path_for(name)?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Ok(self.locator_for(&path))
        } else {
            Err(VaultError::backup_not_found(name))
        }
    }
}
