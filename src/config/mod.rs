//! Configuration module for centervault
//!
//! This module provides configuration management including:
//! - Path resolution for data, backups, media and history
//! - Settings persistence with environment overlays for secrets
//! - Logging initialization

pub mod logging;
pub mod paths;
pub mod settings;

pub use paths::VaultPaths;
pub use settings::Settings;
