//! Import progress and summary

use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::import::ImportSummary;
use crate::progress::ProgressSnapshot;

#[derive(Tabled)]
struct ErrorRow {
    #[tabled(rename = "Row")]
    row: usize,
    #[tabled(rename = "Error")]
    error: String,
}

/// One progress line, e.g. `[=====     ] 10/20 (9 ok, 1 failed)`
pub fn format_import_progress(progress: &ProgressSnapshot) -> String {
    const WIDTH: usize = 20;
    let filled = if progress.total == 0 {
        0
    } else {
        (progress.processed * WIDTH / progress.total).min(WIDTH)
    };
    format!(
        "[{}{}] {}/{} ({} ok, {} failed)",
        "=".repeat(filled),
        " ".repeat(WIDTH - filled),
        progress.processed,
        progress.total,
        progress.success,
        progress.errors.len()
    )
}

pub fn format_import_summary(summary: &ImportSummary) -> String {
    let mut out = if summary.cancelled {
        format!(
            "Import cancelled: {} of {} row(s) imported before stopping",
            summary.success_count, summary.total
        )
    } else {
        format!(
            "Imported {} of {} row(s); {} failed",
            summary.success_count, summary.total, summary.error_count
        )
    };

    if !summary.errors.is_empty() {
        let mut table = Table::new(summary.errors.iter().map(|e| ErrorRow {
            row: e.row,
            error: e.message.clone(),
        }));
        table.with(Style::sharp());
        out.push('\n');
        out.push_str(&table.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskId;
    use crate::progress::RowError;

    #[test]
    fn test_progress_bar() {
        let progress = ProgressSnapshot {
            total: 20,
            processed: 10,
            success: 9,
            errors: vec![RowError {
                row: 4,
                message: "contact is required".into(),
            }],
            state: None,
        };
        assert_eq!(
            format_import_progress(&progress),
            "[==========          ] 10/20 (9 ok, 1 failed)"
        );
        assert!(format_import_progress(&ProgressSnapshot::default()).contains("0/0"));
    }

    #[test]
    fn test_summary_lists_row_errors() {
        let summary = ImportSummary {
            task_id: TaskId::new(),
            total: 3,
            success_count: 2,
            error_count: 1,
            errors: vec![RowError {
                row: 2,
                message: "contact is required".into(),
            }],
            cancelled: false,
        };
        let output = format_import_summary(&summary);
        assert!(output.starts_with("Imported 2 of 3 row(s); 1 failed"));
        assert!(output.contains("contact is required"));
    }
}
