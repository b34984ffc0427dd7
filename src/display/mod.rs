//! Display formatting for terminal output
//!
//! Tables are rendered with `tabled`; summaries are plain text blocks.

pub mod backups;
pub mod history;
pub mod import;

pub use backups::{
    format_backup_details, format_backup_list, format_backup_report, format_cleanup_plan,
    format_cleanup_report, format_restore_report, format_snapshot_summary, DetailedEntry,
};
pub use history::format_history;
pub use import::{format_import_progress, format_import_summary};

use chrono::{DateTime, Utc};

/// Format a file size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Age relative to now, e.g. `3d`
pub fn format_age(at: DateTime<Utc>) -> String {
    let total_seconds = Utc::now().signed_duration_since(at).num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }
    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }
    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }
    format!("{}mo", days / 30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Utc::now() - chrono::Duration::days(3)), "3d");
        assert_eq!(format_age(Utc::now() - chrono::Duration::days(65)), "2mo");
    }
}
