//! Bulk import CLI command
//!
//! Runs the import while a separate task polls the progress tracker, the way
//! a browser polls the progress endpoint during an upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::display::{format_import_progress, format_import_summary};
use crate::error::{VaultError, VaultResult};
use crate::geocode::build_geocoder;
use crate::import::{descriptor_for, descriptors, ImportEngine};
use crate::progress::{MemoryProgressStore, ProgressStore};

use super::CliContext;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Args)]
pub struct ImportArgs {
    /// What to import: center or therapist
    pub entity: String,

    /// CSV file
    pub file: PathBuf,

    /// Zip archive of images referenced by the image_filename column
    #[arg(short, long)]
    pub images: Option<PathBuf>,
}

fn read_file(path: &Path) -> VaultResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", path.display(), e)))
}

pub async fn handle_import(ctx: &CliContext, args: ImportArgs) -> VaultResult<()> {
    let descriptor = descriptor_for(&args.entity).ok_or_else(|| {
        let known: Vec<&str> = descriptors().iter().map(|d| d.name).collect();
        VaultError::Validation(format!(
            "Unknown import type: {} (expected one of: {})",
            args.entity,
            known.join(", ")
        ))
    })?;

    let csv = read_file(&args.file)?;
    let bundle = args.images.as_deref().map(read_file).transpose()?;

    let settings = &ctx.settings;
    let progress = Arc::new(MemoryProgressStore::new(Duration::from_secs(
        settings.import.progress_ttl_secs,
    )));
    let geocoder = build_geocoder(&settings.geocoder, settings.network_timeout())?;
    let engine = ImportEngine::new(
        ctx.store(),
        progress.clone(),
        geocoder,
        ctx.paths.media_dir(),
    )
    .with_batch_size(settings.import.batch_size)
    .with_registry(settings.collections.clone());

    let prepared = engine.prepare(descriptor, &csv, bundle.as_deref())?;
    let task_id = prepared.task_id;
    println!(
        "Importing {} {} row(s) from {} (task {})",
        prepared.total(),
        descriptor.name,
        args.file.display(),
        task_id.short()
    );
    if args.images.is_some() {
        println!("{} valid image(s) in bundle", prepared.image_count());
    }

    let cancel = CancellationToken::new();
    let done = CancellationToken::new();

    let signal = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping after the current batch");
                cancel.cancel();
            }
        })
    };

    let poller = {
        let done = done.clone();
        let progress = progress.clone();
        tokio::spawn(async move {
            let mut last_processed = None;
            loop {
                let snapshot = progress.read(task_id);
                if snapshot.total > 0 && last_processed != Some(snapshot.processed) {
                    println!("{}", format_import_progress(&snapshot));
                    last_processed = Some(snapshot.processed);
                }
                tokio::select! {
                    _ = done.cancelled() => break,
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
            }
        })
    };

    let result = engine.run(prepared, &cancel).await;
    done.cancel();
    let _ = poller.await;
    signal.abort();

    let summary = result?;
    println!("{}", format_import_summary(&summary));
    Ok(())
}
