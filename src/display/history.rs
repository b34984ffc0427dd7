//! History table

use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::audit::HistoryEntry;

use super::format_size;

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "When (UTC)")]
    when: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Backend")]
    backend: String,
    #[tabled(rename = "Records")]
    records: usize,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "By")]
    actor: String,
}

pub fn format_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No backup or restore runs recorded.".to_string();
    }

    let mut table = Table::new(entries.iter().map(|entry| {
        let mut status = entry.status.to_string();
        if entry.dry_run {
            status.push_str(" (dry run)");
        }
        HistoryRow {
            when: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            kind: entry.kind.to_string(),
            file: entry.filename.clone(),
            backend: entry.backend.to_string(),
            records: entry.total_records(),
            size: format_size(entry.size),
            status,
            actor: entry.actor.clone(),
        }
    }));
    table.with(Style::sharp());

    let mut out = table.to_string();
    for entry in entries {
        if let Some(message) = &entry.error_message {
            out.push_str(&format!(
                "\n{} {}: {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.filename,
                message
            ));
        }
    }
    out
}
