//! Custom error types for centervault
//!
//! This module defines the error hierarchy for the backup, restore and import
//! pipeline using thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::backends::{BackendKind, Locator};

/// The main error type for centervault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Missing credential or endpoint, raised before any network call
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network failure, timeout or non-2xx response from a storage backend
    #[error("{backend} backend unavailable: {message}")]
    BackendUnavailable {
        backend: BackendKind,
        message: String,
    },

    /// The backend cannot perform the requested operation at all
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: BackendKind,
        operation: &'static str,
    },

    /// Malformed snapshot envelope
    #[error("Snapshot is corrupt: {0}")]
    SnapshotCorrupt(String),

    /// Import file rejected before any row was written
    #[error("Validation error: {0}")]
    Validation(String),

    /// A single import row failed
    #[error("Row {row}: {message}")]
    Row { row: usize, message: String },

    /// The data artifact was stored but the media artifact was not
    #[error("Backup partially failed: data stored at {data}, media upload failed: {media_error}")]
    PartialBackupFailure { data: Locator, media_error: String },

    /// A destructive restore was attempted without confirmation
    #[error("Restore requires confirmation before modifying data")]
    ConfirmationRequired,

    /// The run was cancelled cooperatively
    #[error("Operation cancelled")]
    Cancelled,

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// CSV parsing errors
    #[error("CSV error: {0}")]
    Csv(String),

    /// Record store errors
    #[error("Storage error: {0}")]
    Storage(String),
}

impl VaultError {
    /// Create a "backend unavailable" error
    pub fn unavailable(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend,
            message: message.into(),
        }
    }

    /// Create a "not found" error for backup artifacts
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Whether retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<csv::Error> for VaultError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

/// Result type alias for centervault operations
pub type VaultResult<T> = Result<T, VaultError>;
