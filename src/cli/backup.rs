//! Backup CLI commands
//!
//! Implements `backup`, `restore` and `list-backups`.

use std::path::Path;

use clap::Args;
use tracing::warn;

use crate::audit::default_actor;
use crate::backends::{BackendKind, BackendOverrides, StorageBackend};
use crate::backup::{
    companion_media_name, snapshot_counts, BackupManager, BackupRequest, RestoreManager,
    RestoreOptions, RestoreSource,
};
use crate::display::{
    format_backup_details, format_backup_list, format_backup_report, format_restore_report,
    format_snapshot_summary, DetailedEntry,
};
use crate::error::{VaultError, VaultResult};
use crate::models::snapshot::artifact_timestamp;

use super::CliContext;

#[derive(Args)]
pub struct BackupArgs {
    /// Collections to back up (default: every registered collection)
    #[arg(short, long, num_args = 1..)]
    pub models: Vec<String>,

    /// Storage backend: local, github, s3, dropbox or webhook
    #[arg(short, long)]
    pub storage: Option<BackendKind>,

    /// Snapshot format
    #[arg(short, long, default_value = "json")]
    pub format: String,

    /// Store plain JSON instead of gzip
    #[arg(long)]
    pub no_compress: bool,

    /// Also archive the media directory
    #[arg(long)]
    pub media: bool,

    /// Release repository (owner/name), overrides GITHUB_BACKUP_REPO
    #[arg(long)]
    pub repo: Option<String>,

    /// Access token, overrides GITHUB_TOKEN or DROPBOX_TOKEN
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Args)]
pub struct RestoreArgs {
    /// Backup name, local file path, or 'latest'
    pub file: String,

    #[arg(short, long)]
    pub storage: Option<BackendKind>,

    /// Collections to restore (default: all in the snapshot)
    #[arg(short, long, num_args = 1..)]
    pub models: Vec<String>,

    /// Delete existing records of each restored collection first
    #[arg(long)]
    pub clear: bool,

    /// Show what would be restored without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Apply the restore
    #[arg(short, long)]
    pub force: bool,

    /// Also extract the media archive taken with the snapshot
    #[arg(long)]
    pub media: bool,

    #[arg(long)]
    pub repo: Option<String>,

    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Args)]
pub struct ListBackupsArgs {
    #[arg(short, long)]
    pub storage: Option<BackendKind>,

    /// Number of backups to show
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Show creation time, downloads and location
    #[arg(short, long)]
    pub details: bool,

    #[arg(long)]
    pub repo: Option<String>,

    #[arg(long)]
    pub token: Option<String>,
}

pub async fn handle_backup(ctx: &CliContext, args: BackupArgs) -> VaultResult<()> {
    if !args.format.eq_ignore_ascii_case("json") {
        return Err(VaultError::Validation(format!(
            "Unsupported backup format: {} (only json is supported)",
            args.format
        )));
    }

    let overrides = BackendOverrides {
        repo: args.repo,
        token: args.token,
    };
    let backend = ctx.backend(args.storage, &overrides)?;
    let kind = backend.kind();
    let manager = BackupManager::new(
        ctx.store(),
        backend,
        ctx.history(),
        ctx.settings.collections.clone(),
    )
    .with_media(ctx.paths.media_dir(), ctx.settings.media_subdirs.clone());

    let request = BackupRequest {
        collections: args.models,
        compress: !args.no_compress,
        include_media: args.media,
        actor: default_actor(),
    };

    println!("Creating backup on {}...", kind);
    let report = manager.run(&request).await?;
    println!("{}", format_backup_report(&report));

    if let Some(partial) = report.partial_failure() {
        println!();
        println!("WARNING: {}", partial);
    }
    Ok(())
}

/// Resolve `latest` to the newest data snapshot on the backend
async fn latest_snapshot(backend: &dyn StorageBackend) -> VaultResult<(String, RestoreSource)> {
    backend
        .list("backup_")
        .await?
        .into_iter()
        .filter_map(|entry| artifact_timestamp(&entry.name).map(|at| (at, entry)))
        .filter(|(_, entry)| entry.name.starts_with("backup_"))
        .max_by_key(|(at, _)| *at)
        .map(|(_, entry)| (entry.name, RestoreSource::Locator(entry.locator)))
        .ok_or_else(|| VaultError::backup_not_found("latest"))
}

/// A path on disk is read directly; anything else goes through the backend
async fn resolve_source(
    backend: &dyn StorageBackend,
    file: &str,
    with_media: bool,
) -> VaultResult<(RestoreSource, Option<RestoreSource>)> {
    let path = Path::new(file);
    if path.is_file() {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file.to_string());
        let bytes = std::fs::read(path)
            .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", path.display(), e)))?;

        let media = match companion_media_name(&name) {
            Some(media_name) if with_media => {
                let media_path = path.with_file_name(&media_name);
                if media_path.is_file() {
                    let bytes = std::fs::read(&media_path).map_err(|e| {
                        VaultError::Io(format!("Failed to read {}: {}", media_path.display(), e))
                    })?;
                    Some(RestoreSource::Bytes {
                        name: media_name,
                        bytes,
                    })
                } else {
                    println!("No media archive found next to {}", name);
                    None
                }
            }
            _ => None,
        };
        return Ok((RestoreSource::Bytes { name, bytes }, media));
    }

    let (name, source) = if file.eq_ignore_ascii_case("latest") {
        latest_snapshot(backend).await?
    } else {
        (file.to_string(), RestoreSource::Name(file.to_string()))
    };

    let media = if with_media {
        companion_media_name(&name).map(RestoreSource::Name)
    } else {
        None
    };
    Ok((source, media))
}

/// The restore command line the operator ran, plus `--force`
fn proceed_command(args: &RestoreArgs) -> String {
    let mut parts = vec!["centervault restore".to_string(), args.file.clone()];
    if let Some(storage) = args.storage {
        parts.push(format!("--storage {}", storage));
    }
    if !args.models.is_empty() {
        parts.push(format!("--models {}", args.models.join(" ")));
    }
    if args.clear {
        parts.push("--clear".into());
    }
    if args.media {
        parts.push("--media".into());
    }
    if let Some(repo) = &args.repo {
        parts.push(format!("--repo {}", repo));
    }
    if args.token.is_some() {
        parts.push("--token <TOKEN>".into());
    }
    parts.push("--force".into());
    parts.join(" ")
}

pub async fn handle_restore(ctx: &CliContext, args: RestoreArgs) -> VaultResult<()> {
    let overrides = BackendOverrides {
        repo: args.repo.clone(),
        token: args.token.clone(),
    };
    let backend = ctx.backend(args.storage, &overrides)?;
    let (source, media) = resolve_source(backend.as_ref(), &args.file, args.media).await?;

    let manager = RestoreManager::new(
        ctx.store(),
        backend,
        ctx.history(),
        ctx.settings.collections.clone(),
        ctx.paths.media_dir(),
    );

    if !args.force && !args.dry_run {
        let summary = manager.inspect(&source).await?;
        println!("{}", format_snapshot_summary(&summary));
        println!();
        if args.clear {
            println!("WARNING: Existing records of each restored collection will be deleted!");
        } else {
            println!("Records already present (same natural key) will be left untouched.");
        }
        println!("To proceed, run again with --force flag:");
        println!("  {}", proceed_command(&args));
        println!("Or preview with --dry-run.");
        return Ok(());
    }

    let options = RestoreOptions {
        collections: args.models,
        clear_existing: args.clear,
        dry_run: args.dry_run,
        confirmed: args.force,
        media,
        actor: default_actor(),
    };

    if !args.dry_run {
        println!("Restoring from backup...");
    }
    let report = manager.restore(&source, &options).await?;
    println!("{}", format_restore_report(&report));
    Ok(())
}

pub async fn handle_list_backups(ctx: &CliContext, args: ListBackupsArgs) -> VaultResult<()> {
    let overrides = BackendOverrides {
        repo: args.repo,
        token: args.token,
    };
    let backend = ctx.backend(args.storage, &overrides)?;

    let mut entries = backend.list("").await?;
    entries.truncate(args.limit);

    println!("Available Backups ({})", backend.kind());
    if !args.details {
        println!("{}", format_backup_list(&entries));
        return Ok(());
    }

    let mut detailed: Vec<DetailedEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        let counts = if entry.name.starts_with("backup_") {
            match snapshot_counts(backend.as_ref(), &entry.locator).await {
                Ok(counts) => Some(counts),
                Err(e) => {
                    warn!(backup = %entry.name, error = %e, "Failed to read snapshot contents");
                    None
                }
            }
        } else {
            None
        };
        detailed.push((entry, counts));
    }
    println!("{}", format_backup_details(&detailed));
    Ok(())
}
