//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup, restore and import
//! pipelines.

pub mod backup;
pub mod history;
pub mod import;
pub mod schedule;

use std::sync::Arc;

use clap::Subcommand;

pub use backup::{BackupArgs, ListBackupsArgs, RestoreArgs};
pub use history::{ConfigArgs, HistoryArgs};
pub use import::ImportArgs;
pub use schedule::{CleanupArgs, ScheduleArgs};

use crate::audit::HistoryLog;
use crate::backends::{build_backend, BackendKind, BackendOverrides, StorageBackend};
use crate::config::{Settings, VaultPaths};
use crate::error::VaultResult;
use crate::storage::{JsonRecordStore, RecordStore};

#[derive(Subcommand)]
pub enum Commands {
    /// Snapshot collections (and optionally media) to a storage backend
    Backup(BackupArgs),

    /// Restore a snapshot into the record store
    Restore(RestoreArgs),

    /// List stored backups
    #[command(name = "list-backups", alias = "ls")]
    ListBackups(ListBackupsArgs),

    /// Run backups and retention cleanup on a schedule
    Schedule(ScheduleArgs),

    /// Delete backups older than the retention window
    Cleanup(CleanupArgs),

    /// Bulk-import centers or therapists from CSV
    Import(ImportArgs),

    /// Show backup and restore history
    History(HistoryArgs),

    /// Show current configuration and paths
    Config(ConfigArgs),
}

/// Everything a handler needs, built once in `main`
pub struct CliContext {
    pub paths: VaultPaths,
    pub settings: Settings,
    pub store: Arc<JsonRecordStore>,
}

impl CliContext {
    pub fn new(paths: VaultPaths, settings: Settings) -> Self {
        let store = Arc::new(JsonRecordStore::new(paths.data_dir()));
        Self {
            paths,
            settings,
            store,
        }
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    pub fn history(&self) -> HistoryLog {
        HistoryLog::new(self.paths.history_log())
    }

    /// The named backend, or the configured default
    pub fn backend(
        &self,
        kind: Option<BackendKind>,
        overrides: &BackendOverrides,
    ) -> VaultResult<Arc<dyn StorageBackend>> {
        let kind = kind.unwrap_or(self.settings.default_backend);
        build_backend(kind, &self.settings, &self.paths, overrides)
    }
}

/// Dispatch a parsed command
pub async fn handle_command(ctx: &CliContext, cmd: Commands) -> VaultResult<()> {
    match cmd {
        Commands::Backup(args) => backup::handle_backup(ctx, args).await,
        Commands::Restore(args) => backup::handle_restore(ctx, args).await,
        Commands::ListBackups(args) => backup::handle_list_backups(ctx, args).await,
        Commands::Schedule(args) => schedule::handle_schedule(ctx, args).await,
        Commands::Cleanup(args) => schedule::handle_cleanup(ctx, args).await,
        Commands::Import(args) => import::handle_import(ctx, args).await,
        Commands::History(args) => history::handle_history(ctx, args),
        Commands::Config(args) => history::handle_config(ctx, args),
    }
}
