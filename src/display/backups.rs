//! Backup, restore and cleanup output

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::backends::Entry;
use crate::backup::{BackupReport, CleanupReport, RestoreReport, RetentionPlan, SnapshotSummary};
use crate::models::snapshot::artifact_timestamp;

use super::{format_age, format_size};

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Age")]
    age: String,
}

#[derive(Tabled)]
struct DetailedBackupRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Records")]
    records: String,
    #[tabled(rename = "Contents")]
    contents: String,
    #[tabled(rename = "Downloads")]
    downloads: String,
    #[tabled(rename = "Location")]
    location: String,
}

/// A listed artifact with the collection counts read from it, if any
pub type DetailedEntry = (Entry, Option<BTreeMap<String, usize>>);

fn created_at(entry: &Entry) -> Option<DateTime<Utc>> {
    artifact_timestamp(&entry.name).or(entry.modified_at)
}

fn with_total<'a>(table: String, entries: impl Iterator<Item = &'a Entry>) -> String {
    let (count, total) = entries.fold((0, 0u64), |(n, size), e| (n + 1, size + e.size));
    format!("{}\nTotal: {} backup(s), {}", table, count, format_size(total))
}

/// `Center(12), Review(3)`
fn contents_summary(counts: &BTreeMap<String, usize>) -> String {
    counts
        .iter()
        .map(|(name, count)| format!("{}({})", name, count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Table of stored artifacts, newest first
pub fn format_backup_list(entries: &[Entry]) -> String {
    if entries.is_empty() {
        return "No backups found.".to_string();
    }

    let mut table = Table::new(entries.iter().enumerate().map(|(i, e)| BackupRow {
        index: i + 1,
        name: e.name.clone(),
        size: format_size(e.size),
        age: created_at(e).map(format_age).unwrap_or_else(|| "-".into()),
    }));
    table.with(Style::sharp());
    with_total(table.to_string(), entries.iter())
}

/// Detailed table; snapshots that could not be read show `-` for their contents
pub fn format_backup_details(backups: &[DetailedEntry]) -> String {
    if backups.is_empty() {
        return "No backups found.".to_string();
    }

    let mut table = Table::new(backups.iter().enumerate().map(|(i, (e, counts))| {
        DetailedBackupRow {
            index: i + 1,
            name: e.name.clone(),
            size: format_size(e.size),
            created: created_at(e)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".into()),
            records: counts
                .as_ref()
                .map(|c| c.values().sum::<usize>().to_string())
                .unwrap_or_else(|| "-".into()),
            contents: counts
                .as_ref()
                .map(contents_summary)
                .unwrap_or_else(|| "-".into()),
            downloads: e
                .download_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".into()),
            location: e.locator.reference.clone(),
        }
    }));
    table.with(Style::sharp());
    with_total(table.to_string(), backups.iter().map(|(e, _)| e))
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Collection")]
    collection: String,
    #[tabled(rename = "Records")]
    records: usize,
}

fn count_table(counts: &BTreeMap<String, usize>) -> String {
    let mut table = Table::new(counts.iter().map(|(name, count)| CountRow {
        collection: name.clone(),
        records: *count,
    }));
    table.with(Style::sharp());
    table.to_string()
}

pub fn format_backup_report(report: &BackupReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Backup: {} ({})", report.filename, report.status);
    let _ = writeln!(out, "Stored at: {}", report.locator);
    let _ = writeln!(out, "Size: {}", format_size(report.size));
    if let Some(media) = &report.media {
        let _ = writeln!(out, "Media: {}", media);
    }
    if let Some(error) = &report.media_error {
        let _ = writeln!(out, "Media upload failed: {}", error);
    }
    let _ = writeln!(out, "{}", count_table(&report.counts));
    let _ = write!(out, "Total: {} record(s)", report.total_records());
    out
}

pub fn format_snapshot_summary(summary: &SnapshotSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Snapshot Information");
    let _ = writeln!(out, "====================");
    let _ = writeln!(out, "File: {}", summary.filename);
    let _ = writeln!(out, "Size: {}", format_size(summary.size));
    let created = summary
        .metadata
        .created_at()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| summary.metadata.backup_time.clone());
    let _ = writeln!(out, "Created: {}", created);
    let _ = writeln!(out, "Format version: {}", summary.metadata.format_version);
    if !summary.metadata.storage_type.is_empty() {
        let _ = writeln!(out, "Stored via: {}", summary.metadata.storage_type);
    }
    let _ = writeln!(out, "{}", count_table(&summary.counts));
    let _ = write!(out, "Total: {} record(s)", summary.total_records());
    out
}

#[derive(Tabled)]
struct RestoreRow {
    #[tabled(rename = "Collection")]
    collection: String,
    #[tabled(rename = "Restored")]
    restored: usize,
    #[tabled(rename = "Already present")]
    skipped: usize,
}

pub fn format_restore_report(report: &RestoreReport) -> String {
    let mut out = String::new();
    if report.dry_run {
        let _ = writeln!(out, "Dry run of {}: nothing was changed", report.filename);
        let _ = writeln!(out, "{}", count_table(&report.pending));
        let _ = write!(out, "Would restore up to {} record(s)", report.total_pending());
    } else {
        let _ = writeln!(out, "Restored from {}", report.filename);
        let mut table = Table::new(report.restored.iter().map(|(name, restored)| RestoreRow {
            collection: name.clone(),
            restored: *restored,
            skipped: report.skipped.get(name).copied().unwrap_or(0),
        }));
        table.with(Style::sharp());
        let _ = writeln!(out, "{}", table);
        let _ = write!(out, "Total: {} record(s) restored", report.total_restored());
        if let Some(files) = report.media_files {
            let _ = write!(out, "\nMedia: {} file(s) restored", files);
        }
        if let Some(error) = &report.media_error {
            let _ = write!(out, "\nMedia restore failed: {}", error);
        }
    }
    if !report.missing.is_empty() {
        let _ = write!(
            out,
            "\nNot in snapshot (skipped): {}",
            report.missing.join(", ")
        );
    }
    out
}

pub fn format_cleanup_plan(plan: &RetentionPlan, retention_days: u32) -> String {
    if plan.expired.is_empty() {
        return format!(
            "No backups older than {} days ({} kept).",
            retention_days, plan.kept
        );
    }
    format!(
        "Backups older than {} days:\n{}",
        retention_days,
        format_backup_list(&plan.expired)
    )
}

pub fn format_cleanup_report(report: &CleanupReport) -> String {
    let mut out = format!(
        "Deleted {} of {} backup(s); {} kept.",
        report.deleted.len(),
        report.examined,
        report.kept
    );
    for name in &report.deleted {
        let _ = write!(out, "\n  - {}", name);
    }
    for (name, error) in &report.failed {
        let _ = write!(out, "\n  ! {}: {}", name, error);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendKind, Locator};

    fn entry(name: &str, size: u64) -> Entry {
        Entry {
            name: name.into(),
            size,
            modified_at: None,
            locator: Locator::new(BackendKind::Local, format!("/tmp/{}", name)),
            download_count: None,
        }
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(format_backup_list(&[]), "No backups found.");
        assert_eq!(format_backup_details(&[]), "No backups found.");
    }

    #[test]
    fn test_list_contains_names() {
        let output = format_backup_list(&[
            entry("backup_20260301_020000.json.gz", 2048),
            entry("media_20260301_020000.tar.gz", 10),
        ]);
        assert!(output.contains("backup_20260301_020000.json.gz"));
        assert!(output.contains("media_20260301_020000.tar.gz"));
        assert!(output.contains("Total: 2 backup(s)"));
    }

    #[test]
    fn test_details_show_snapshot_contents() {
        let counts: BTreeMap<String, usize> =
            [("Center".to_string(), 12), ("Review".to_string(), 3)].into_iter().collect();
        let output = format_backup_details(&[
            (entry("backup_20260301_020000.json.gz", 2048), Some(counts)),
            (entry("media_20260301_020000.tar.gz", 10), None),
        ]);
        assert!(output.contains("2026-03-01 02:00:00 UTC"));
        assert!(output.contains("Center(12), Review(3)"));
        assert!(output.contains("15"));
        assert!(output.contains("Total: 2 backup(s)"));
    }

    #[test]
    fn test_dry_run_report() {
        let mut report = RestoreReport {
            filename: "backup_x.json.gz".into(),
            dry_run: true,
            ..RestoreReport::default()
        };
        report.pending.insert("Center".into(), 2);
        report.pending.insert("Review".into(), 1);
        let output = format_restore_report(&report);
        assert!(output.contains("nothing was changed"));
        assert!(output.contains("3 record(s)"));
    }
}
