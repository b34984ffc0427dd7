//! History and configuration commands

use clap::Args;

use crate::audit::RunKind;
use crate::display::format_history;
use crate::error::{VaultError, VaultResult};

use super::CliContext;

#[derive(Args)]
pub struct HistoryArgs {
    /// Number of entries to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Only show backup or restore runs
    #[arg(short, long)]
    pub kind: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the settings file and create the data directories
    #[arg(long)]
    pub init: bool,
}

fn parse_kind(s: &str) -> VaultResult<RunKind> {
    match s.trim().to_lowercase().as_str() {
        "backup" => Ok(RunKind::Backup),
        "restore" => Ok(RunKind::Restore),
        other => Err(VaultError::Validation(format!(
            "Unknown run kind: {} (expected backup or restore)",
            other
        ))),
    }
}

pub fn handle_history(ctx: &CliContext, args: HistoryArgs) -> VaultResult<()> {
    let kind = args.kind.as_deref().map(parse_kind).transpose()?;
    let entries = ctx.history().read_recent(args.limit, kind)?;
    println!("{}", format_history(&entries));
    Ok(())
}

pub fn handle_config(ctx: &CliContext, args: ConfigArgs) -> VaultResult<()> {
    let paths = &ctx.paths;
    let settings = &ctx.settings;

    if args.init {
        settings.save(paths)?;
        println!("Initialized centervault at: {}", paths.base_dir().display());
        println!();
    }

    let set = |value: &Option<String>| if value.is_some() { "set" } else { "not set" };

    println!("centervault Configuration");
    println!("=========================");
    println!("Base directory:   {}", paths.base_dir().display());
    println!("Record store:     {}", paths.data_dir().display());
    println!("Local backups:    {}", paths.backup_dir().display());
    println!("Media:            {}", paths.media_dir().display());
    println!("Settings file:    {}", paths.settings_file().display());
    println!("History log:      {}", paths.history_log().display());
    println!();
    println!("Settings:");
    println!("  Default storage:  {}", settings.default_backend);
    println!("  Retention:        {} days", settings.retention.days);
    println!("  Network timeout:  {}s", settings.network_timeout_secs);
    println!("  Import batch:     {} rows", settings.import.batch_size);
    println!(
        "  Collections:      {}",
        settings
            .collections
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();
    println!("Backends:");
    println!(
        "  github:   repo {}, token {}",
        settings.release.repo.as_deref().unwrap_or("not set"),
        set(&settings.release.token)
    );
    println!(
        "  s3:       bucket {}, region {}",
        settings.object_store.bucket.as_deref().unwrap_or("not set"),
        settings.object_store.region
    );
    println!(
        "  dropbox:  folder {}, token {}",
        settings.dropbox.folder,
        set(&settings.dropbox.token)
    );
    println!("  webhook:  url {}", set(&settings.webhook.url));
    println!(
        "  geocoder: {}",
        if settings.geocoder.client_id.is_some() && settings.geocoder.client_secret.is_some() {
            "naver"
        } else {
            "disabled"
        }
    );
    Ok(())
}
