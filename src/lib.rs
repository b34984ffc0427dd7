//! centervault - backup, restore and bulk import for a center directory
//!
//! This library snapshots record collections to pluggable storage backends,
//! restores them idempotently, expires old snapshots, and bulk-imports
//! entities from CSV with per-row error isolation and pollable progress.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Paths, settings and logging
//! - `error`: Custom error types
//! - `models`: Records, the collection registry and the snapshot envelope
//! - `storage`: Atomic file writes and the record store
//! - `codec`: Gzip detection and (de)compression
//! - `backends`: Local, release, object-store, Dropbox and webhook storage
//! - `backup`: Backup, restore, retention and scheduling
//! - `import`: CSV import descriptors, image bundles and the import engine
//! - `progress`: TTL-bound import progress tracking
//! - `geocode`: Address to coordinate enrichment
//! - `audit`: Backup and restore history
//! - `cli` / `display`: Command handlers and terminal output
//!
//! # Example
//!
//! ```rust,ignore
//! use centervault::config::{Settings, VaultPaths};
//!
//! let paths = VaultPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! ```

pub mod audit;
pub mod backends;
pub mod backup;
pub mod cli;
pub mod codec;
pub mod config;
pub mod display;
pub mod error;
pub mod geocode;
pub mod import;
pub mod models;
pub mod progress;
pub mod storage;

pub use error::{VaultError, VaultResult};
