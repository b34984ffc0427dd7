//! Path management for centervault
//!
//! Provides path resolution for configuration, the record store, local
//! backups, media files and the history log.
//!
//! ## Path Resolution Order
//!
//! 1. `CENTERVAULT_DATA_DIR` environment variable (if set)
//! 2. The platform configuration directory (`~/.config/centervault` on Linux)

use std::path::PathBuf;

use directories::BaseDirs;

use crate::error::VaultError;

/// Manages all paths used by centervault
#[derive(Debug, Clone)]
pub struct VaultPaths {
    /// Base directory for all centervault data
    base_dir: PathBuf,
}

impl VaultPaths {
    /// Create a new VaultPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, VaultError> {
        let base_dir = if let Ok(custom) = std::env::var("CENTERVAULT_DATA_DIR") {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create VaultPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Directory holding one JSON file per record collection
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Root of the local storage backend
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Root of uploaded media files (center photos, therapist photos)
    pub fn media_dir(&self) -> PathBuf {
        self.base_dir.join("media")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the backup/restore history log
    pub fn history_log(&self) -> PathBuf {
        self.base_dir.join("history.log")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), VaultError> {
        for dir in [
            self.base_dir.clone(),
            self.data_dir(),
            self.backup_dir(),
            self.media_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                VaultError::Io(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        Ok(())
    }
}

/// Resolve the default base directory from the platform config location
fn resolve_default_path() -> Result<PathBuf, VaultError> {
    let dirs = BaseDirs::new()
        .ok_or_else(|| VaultError::Configuration("Could not determine home directory".into()))?;
    Ok(dirs.config_dir().join("centervault"))
}
