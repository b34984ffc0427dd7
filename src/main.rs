use anyhow::Result;
use clap::Parser;

use centervault::cli::{handle_command, CliContext, Commands};
use centervault::config::logging::{init_logging, LogConfig};
use centervault::config::{Settings, VaultPaths};

#[derive(Parser)]
#[command(
    name = "centervault",
    version,
    about = "Backup, restore and bulk import for the center directory",
    long_about = "centervault snapshots the center directory's collections to local disk, \
                  GitHub releases, S3, Dropbox or a webhook, restores them idempotently, enforces \
                  a retention window, and bulk-imports centers and therapists from CSV."
)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogConfig::from_env(cli.verbose)?)?;

    // Initialize paths and settings
    let paths = VaultPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;
    paths.ensure_directories()?;

    let ctx = CliContext::new(paths, settings);
    handle_command(&ctx, cli.command).await?;

    Ok(())
}
