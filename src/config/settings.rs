//! Settings for centervault
//!
//! Manages backend credentials and endpoints, the retention window, import
//! tuning and the collection registry. Settings are stored as JSON; secrets
//! may instead come from the environment and are overlaid at load time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths::VaultPaths;
use crate::backends::BackendKind;
use crate::error::VaultError;
use crate::models::CollectionDescriptor;

/// Retention settings for remote snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Snapshots older than this many days are deleted
    pub days: u32,
    /// Hours between a scheduled backup and the cleanup that follows it
    pub cleanup_offset_hours: u32,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            days: 30,
            cleanup_offset_hours: 1,
        }
    }
}

/// Bulk import tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Rows per batch
    pub batch_size: usize,
    /// How long an import's progress stays pollable
    pub progress_ttl_secs: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            progress_ttl_secs: 600,
        }
    }
}

/// Release-asset backend (GitHub releases API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSettings {
    /// Repository in `owner/name` form
    #[serde(default)]
    pub repo: Option<String>,
    /// Personal access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// API base URL
    #[serde(default = "default_release_api")]
    pub api_base: String,
}

fn default_release_api() -> String {
    "https://api.github.com".to_string()
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            repo: None,
            token: None,
            api_base: default_release_api(),
        }
    }
}

/// Object-store backend (S3 compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreSettings {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO etc.)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Key prefix every snapshot is stored under
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub path_style: bool,
}

fn default_region() -> String {
    "ap-northeast-2".to_string()
}

fn default_prefix() -> String {
    "backups/".to_string()
}

impl Default for ObjectStoreSettings {
    fn default() -> Self {
        Self {
            bucket: None,
            region: default_region(),
            access_key: None,
            secret_key: None,
            endpoint: None,
            prefix: default_prefix(),
            path_style: false,
        }
    }
}

/// Dropbox backend (files API v2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropboxSettings {
    /// Access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Folder snapshots are stored under
    #[serde(default = "default_dropbox_folder")]
    pub folder: String,
    /// RPC endpoint base (list, delete)
    #[serde(default = "default_dropbox_api")]
    pub api_base: String,
    /// Content endpoint base (upload, download)
    #[serde(default = "default_dropbox_content")]
    pub content_base: String,
}

fn default_dropbox_folder() -> String {
    "/backups".to_string()
}

fn default_dropbox_api() -> String {
    "https://api.dropboxapi.com".to_string()
}

fn default_dropbox_content() -> String {
    "https://content.dropboxapi.com".to_string()
}

impl Default for DropboxSettings {
    fn default() -> Self {
        Self {
            token: None,
            folder: default_dropbox_folder(),
            api_base: default_dropbox_api(),
            content_base: default_dropbox_content(),
        }
    }
}

/// Webhook sink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookSettings {
    #[serde(default)]
    pub url: Option<String>,
}

/// Address to coordinate enrichment provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_geocoder_endpoint")]
    pub endpoint: String,
}

fn default_geocoder_endpoint() -> String {
    "https://maps.apigw.ntruss.com/map-geocode/v2/geocode".to_string()
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            endpoint: default_geocoder_endpoint(),
        }
    }
}

/// Settings for centervault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Backend used when a command does not name one
    #[serde(default)]
    pub default_backend: BackendKind,

    #[serde(default)]
    pub retention: RetentionSettings,

    /// Upper bound for every storage and geocoding call
    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,

    #[serde(default)]
    pub import: ImportSettings,

    /// Media subdirectories captured by media backups
    #[serde(default = "default_media_subdirs")]
    pub media_subdirs: Vec<String>,

    /// Static registry of backed-up collections
    #[serde(default = "CollectionDescriptor::default_registry")]
    pub collections: Vec<CollectionDescriptor>,

    #[serde(default)]
    pub release: ReleaseSettings,

    #[serde(default)]
    pub object_store: ObjectStoreSettings,

    #[serde(default)]
    pub dropbox: DropboxSettings,

    #[serde(default)]
    pub webhook: WebhookSettings,

    #[serde(default)]
    pub geocoder: GeocoderSettings,
}

fn default_schema_version() -> u32 {
    1
}

fn default_network_timeout() -> u64 {
    10
}

fn default_media_subdirs() -> Vec<String> {
    vec!["centers".to_string(), "therapists".to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            default_backend: BackendKind::default(),
            retention: RetentionSettings::default(),
            network_timeout_secs: default_network_timeout(),
            import: ImportSettings::default(),
            media_subdirs: default_media_subdirs(),
            collections: CollectionDescriptor::default_registry(),
            release: ReleaseSettings::default(),
            object_store: ObjectStoreSettings::default(),
            dropbox: DropboxSettings::default(),
            webhook: WebhookSettings::default(),
            geocoder: GeocoderSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk (or defaults) and overlay environment secrets
    pub fn load_or_create(paths: &VaultPaths) -> Result<Self, VaultError> {
        let settings_path = paths.settings_file();

        let mut settings = if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path).map_err(|e| {
                VaultError::Io(format!("Failed to read settings file: {}", e))
            })?;

            serde_json::from_str(&contents).map_err(|e| {
                VaultError::Configuration(format!("Failed to parse settings file: {}", e))
            })?
        } else {
            Settings::default()
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Overlay values from an environment lookup; set variables win over the file
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("GITHUB_TOKEN") {
            self.release.token = Some(v);
        }
        if let Some(v) = non_empty("GITHUB_BACKUP_REPO") {
            self.release.repo = Some(v);
        }
        if let Some(v) = non_empty("AWS_ACCESS_KEY_ID") {
            self.object_store.access_key = Some(v);
        }
        if let Some(v) = non_empty("AWS_SECRET_ACCESS_KEY") {
            self.object_store.secret_key = Some(v);
        }
        if let Some(v) = non_empty("AWS_BACKUP_BUCKET_NAME") {
            self.object_store.bucket = Some(v);
        }
        if let Some(v) = non_empty("AWS_S3_REGION_NAME") {
            self.object_store.region = v;
        }
        if let Some(v) = non_empty("S3_ENDPOINT") {
            self.object_store.endpoint = Some(v);
        }
        if let Some(v) = non_empty("DROPBOX_TOKEN") {
            self.dropbox.token = Some(v);
        }
        if let Some(v) =
            non_empty("WEBHOOK_BACKUP_URL").or_else(|| non_empty("GOOGLE_DRIVE_WEBHOOK_URL"))
        {
            self.webhook.url = Some(v);
        }
        if let Some(v) = non_empty("NAVER_CLIENT_ID") {
            self.geocoder.client_id = Some(v);
        }
        if let Some(v) = non_empty("NAVER_CLIENT_SECRET") {
            self.geocoder.client_secret = Some(v);
        }
    }

    /// Network timeout as a Duration
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs.max(1))
    }

    /// Look up a collection descriptor by name
    pub fn collection(&self, name: &str) -> Option<&CollectionDescriptor> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &VaultPaths) -> Result<(), VaultError> {
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            VaultError::Configuration(format!("Failed to serialize settings: {}", e))
        })?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| VaultError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }
}
