//! Scheduling and retention CLI commands

use chrono::Utc;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::audit::default_actor;
use crate::backends::{BackendKind, BackendOverrides};
use crate::backup::{
    parse_time, BackupManager, BackupRequest, Interval, RetentionJob, Schedule, Scheduler,
};
use crate::display::{format_backup_report, format_cleanup_plan, format_cleanup_report};
use crate::error::VaultResult;

use super::CliContext;

#[derive(Args)]
pub struct ScheduleArgs {
    /// hourly, daily or weekly (Sundays)
    #[arg(short, long, default_value = "daily")]
    pub interval: Interval,

    /// Time of day (HH:MM, UTC) for daily and weekly backups
    #[arg(short, long, default_value = "02:00")]
    pub time: String,

    #[arg(short, long)]
    pub storage: Option<BackendKind>,

    /// Days to keep backups (default from settings)
    #[arg(short, long)]
    pub retention_days: Option<u32>,

    /// Run one backup now and exit
    #[arg(long)]
    pub once: bool,

    /// Include the media archive in every backup
    #[arg(long)]
    pub media: bool,

    #[arg(long)]
    pub repo: Option<String>,

    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Args)]
pub struct CleanupArgs {
    #[arg(short, long)]
    pub storage: Option<BackendKind>,

    /// Days to keep backups (default from settings)
    #[arg(short, long)]
    pub retention_days: Option<u32>,

    /// Delete without previewing
    #[arg(short, long)]
    pub force: bool,

    #[arg(long)]
    pub repo: Option<String>,

    #[arg(long)]
    pub token: Option<String>,
}

pub async fn handle_schedule(ctx: &CliContext, args: ScheduleArgs) -> VaultResult<()> {
    let at = parse_time(&args.time)?;
    let retention_days = args.retention_days.unwrap_or(ctx.settings.retention.days);
    let overrides = BackendOverrides {
        repo: args.repo,
        token: args.token,
    };
    let backend = ctx.backend(args.storage, &overrides)?;

    let manager = BackupManager::new(
        ctx.store(),
        backend.clone(),
        ctx.history(),
        ctx.settings.collections.clone(),
    )
    .with_media(ctx.paths.media_dir(), ctx.settings.media_subdirs.clone());
    let request = BackupRequest {
        include_media: args.media,
        actor: format!("scheduler@{}", default_actor()),
        ..BackupRequest::default()
    };
    let retention = RetentionJob::new(backend.clone(), retention_days);
    let schedule = Schedule::new(
        args.interval,
        at,
        ctx.settings.retention.cleanup_offset_hours,
    );
    let scheduler = Scheduler::new(schedule, manager, request, retention);

    if args.once {
        println!("Running one backup on {}...", backend.kind());
        match scheduler.run_backup_once().await {
            Some(report) => println!("{}", format_backup_report(&report)),
            None => println!("Backup failed; see the log and 'centervault history'."),
        }
        return Ok(());
    }

    let now = Utc::now();
    println!("Backup schedule: {} on {}", args.interval, backend.kind());
    println!(
        "  Next backup:  {}",
        schedule.next_backup(now).format("%Y-%m-%d %H:%M UTC")
    );
    println!(
        "  Next cleanup: {} (keeping {} days)",
        schedule.next_cleanup(now).format("%Y-%m-%d %H:%M UTC"),
        retention_days
    );
    println!("Press Ctrl+C to stop.");

    let cancel = CancellationToken::new();
    let signal = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping scheduler");
                cancel.cancel();
            }
        })
    };

    scheduler.run(cancel).await;
    signal.abort();
    Ok(())
}

pub async fn handle_cleanup(ctx: &CliContext, args: CleanupArgs) -> VaultResult<()> {
    let retention_days = args.retention_days.unwrap_or(ctx.settings.retention.days);
    let overrides = BackendOverrides {
        repo: args.repo,
        token: args.token,
    };
    let backend = ctx.backend(args.storage, &overrides)?;
    let job = RetentionJob::new(backend, retention_days);

    if !args.force {
        let plan = job.plan_at(Utc::now()).await?;
        println!("{}", format_cleanup_plan(&plan, retention_days));
        if !plan.expired.is_empty() {
            println!();
            println!("To delete these backups, run again with --force flag:");
            println!("  centervault cleanup --retention-days {} --force", retention_days);
        }
        return Ok(());
    }

    let report = job.run().await?;
    println!("{}", format_cleanup_report(&report));
    Ok(())
}
