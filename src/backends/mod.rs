//! Storage backends
//!
//! A backend is a destination and source for artifacts: local disk, a
//! release-asset API, an S3-compatible object store, a Dropbox folder or a
//! write-only webhook.
//! Every write returns a [`Locator`]; every read and delete takes one.
//!
//! Missing credentials are reported as [`VaultError::Configuration`] when an
//! operation is attempted, never at construction, so an unconfigured backend
//! can still be built and listed in help output.

pub mod dropbox;
pub mod local;
pub mod object_store;
pub mod release;
pub mod webhook;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Settings, VaultPaths};
use crate::error::{VaultError, VaultResult};

pub use dropbox::DropboxBackend;
pub use local::LocalBackend;
pub use object_store::ObjectStoreBackend;
pub use release::ReleaseBackend;
pub use webhook::WebhookBackend;

/// Which kind of backend an artifact lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackendKind {
    #[default]
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "github")]
    Release,
    #[serde(rename = "s3")]
    ObjectStore,
    #[serde(rename = "dropbox")]
    Dropbox,
    #[serde(rename = "webhook", alias = "google_drive")]
    Webhook,
}

impl BackendKind {
    /// All kinds, in display order
    pub fn all() -> [BackendKind; 5] {
        [
            BackendKind::Local,
            BackendKind::Release,
            BackendKind::ObjectStore,
            BackendKind::Dropbox,
            BackendKind::Webhook,
        ]
    }

    /// Name used on the command line and in snapshot metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Release => "github",
            BackendKind::ObjectStore => "s3",
            BackendKind::Dropbox => "dropbox",
            BackendKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "github" | "release" => Ok(BackendKind::Release),
            "s3" | "object_store" => Ok(BackendKind::ObjectStore),
            "dropbox" => Ok(BackendKind::Dropbox),
            "webhook" | "google_drive" => Ok(BackendKind::Webhook),
            other => Err(VaultError::Configuration(format!(
                "Unknown storage backend: {} (expected local, github, s3, dropbox or webhook)",
                other
            ))),
        }
    }
}

/// Opaque reference to a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub backend: BackendKind,
    /// Path, URL or object key, depending on the backend
    pub reference: String,
    /// Grouping handle (release id) shared by related artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Locator {
    pub fn new(backend: BackendKind, reference: impl Into<String>) -> Self {
        Self {
            backend,
            reference: reference.into(),
            group: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.reference)
    }
}

/// One listed artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub name: String,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub locator: Locator,
    pub download_count: Option<u64>,
}

/// Capability set shared by all backends
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Store an artifact under `name`
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> VaultResult<Locator>;

    /// Store an artifact next to `anchor` (same release, same prefix)
    async fn put_related(
        &self,
        anchor: &Locator,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> VaultResult<Locator> {
        let _ = anchor;
        self.put(name, bytes, content_type).await
    }

    /// Artifacts whose name starts with `prefix`, newest first
    async fn list(&self, prefix: &str) -> VaultResult<Vec<Entry>>;

    async fn get(&self, locator: &Locator) -> VaultResult<Vec<u8>>;

    /// Remove an artifact; `false` when it did not exist
    async fn delete(&self, locator: &Locator) -> VaultResult<bool>;

    /// Find an artifact by exact name
    async fn resolve(&self, name: &str) -> VaultResult<Locator> {
        self.list(name)
            .await?
            .into_iter()
            .find(|e| e.name == name)
            .map(|e| e.locator)
            .ok_or_else(|| VaultError::backup_not_found(name))
    }
}

/// Per-invocation overrides from the command line
#[derive(Debug, Clone, Default)]
pub struct BackendOverrides {
    pub repo: Option<String>,
    pub token: Option<String>,
}

/// Build the backend for `kind` from settings
pub fn build_backend(
    kind: BackendKind,
    settings: &Settings,
    paths: &VaultPaths,
    overrides: &BackendOverrides,
) -> VaultResult<Arc<dyn StorageBackend>> {
    let timeout = settings.network_timeout();
    let backend: Arc<dyn StorageBackend> = match kind {
        BackendKind::Local => Arc::new(LocalBackend::new(paths.backup_dir())),
        BackendKind::Release => {
            let mut release = settings.release.clone();
            if overrides.repo.is_some() {
                release.repo = overrides.repo.clone();
            }
            if overrides.token.is_some() {
                release.token = overrides.token.clone();
            }
            Arc::new(ReleaseBackend::new(&release, timeout)?)
        }
        BackendKind::ObjectStore => Arc::new(ObjectStoreBackend::new(
            settings.object_store.clone(),
            timeout,
        )),
        BackendKind::Dropbox => {
            let mut dropbox = settings.dropbox.clone();
            if overrides.token.is_some() {
                dropbox.token = overrides.token.clone();
            }
            Arc::new(DropboxBackend::new(&dropbox, timeout)?)
        }
        BackendKind::Webhook => Arc::new(WebhookBackend::new(
            settings.webhook.url.clone(),
            timeout,
        )?),
    };
    Ok(backend)
}

/// HTTP client shared by the HTTP-based backends
pub(crate) fn http_client(timeout: Duration) -> VaultResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("centervault/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| VaultError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Reject a locator that belongs to another backend
pub(crate) fn ensure_kind(expected: BackendKind, locator: &Locator) -> VaultResult<()> {
    if locator.backend == expected {
        Ok(())
    } else {
        Err(VaultError::Validation(format!(
            "Locator {} does not belong to the {} backend",
            locator, expected
        )))
    }
}

/// Sort newest first; entries without a timestamp go last
pub(crate) fn sort_newest_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then(a.name.cmp(&b.name)));
}
