//! Integration tests for the centervault CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn centervault(base: &Path) -> Command {
    let mut cmd = Command::cargo_bin("centervault").unwrap();
    cmd.env("CENTERVAULT_DATA_DIR", base)
        .env_remove("RUST_LOG")
        .env_remove("NAVER_CLIENT_ID")
        .env_remove("NAVER_CLIENT_SECRET")
        .env_remove("DROPBOX_TOKEN")
        .env_remove("WEBHOOK_BACKUP_URL")
        .env_remove("GOOGLE_DRIVE_WEBHOOK_URL");
    cmd
}

fn import_centers(base: &Path) {
    let csv = base.join("centers.csv");
    fs::write(
        &csv,
        "name,address,contact\nSunrise Therapy,Seoul 1,010-1111\nBlue Wave,Busan 2,\n",
    )
    .unwrap();
    centervault(base)
        .arg("import")
        .arg("center")
        .arg(&csv)
        .assert()
        .success();
}

fn only_backup(base: &Path) -> PathBuf {
    let mut files: Vec<PathBuf> = fs::read_dir(base.join("backups"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("backup_")
        })
        .collect();
    assert_eq!(files.len(), 1);
    files.pop().unwrap()
}

#[test]
fn test_cli_help() {
    let temp = TempDir::new().unwrap();
    centervault(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("list-backups"))
        .stdout(predicate::str::contains("import"));
}

#[test]
fn test_config_init() {
    let temp = TempDir::new().unwrap();
    centervault(temp.path())
        .args(["config", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Retention:        30 days"));
    assert!(temp.path().join("config.json").exists());
}

#[test]
fn test_import_reports_row_errors() {
    let temp = TempDir::new().unwrap();
    let csv = temp.path().join("centers.csv");
    fs::write(
        &csv,
        "name,address,contact\n\
         Sunrise Therapy,Seoul 1,010-1111\n\
         Blue Wave,Busan 2,\n\
         Green Leaf,Daegu 3,010-3333\n",
    )
    .unwrap();

    centervault(temp.path())
        .arg("import")
        .arg("center")
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 of 3 row(s); 1 failed"))
        .stdout(predicate::str::contains("contact is required"));

    let stored = fs::read_to_string(temp.path().join("data").join("Center.json")).unwrap();
    assert!(stored.contains("Sunrise Therapy"));
    assert!(!stored.contains("Blue Wave"));
}

#[test]
fn test_import_rejects_missing_columns() {
    let temp = TempDir::new().unwrap();
    let csv = temp.path().join("centers.csv");
    fs::write(&csv, "name,address\nSunrise Therapy,Seoul 1\n").unwrap();

    centervault(temp.path())
        .arg("import")
        .arg("center")
        .arg(&csv)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing required columns: contact"));
}

#[test]
fn test_unknown_import_type() {
    let temp = TempDir::new().unwrap();
    let csv = temp.path().join("x.csv");
    fs::write(&csv, "a\n1\n").unwrap();

    centervault(temp.path())
        .arg("import")
        .arg("review")
        .arg(&csv)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown import type"));
}

#[test]
fn test_backup_then_list() {
    let temp = TempDir::new().unwrap();
    import_centers(temp.path());

    centervault(temp.path())
        .args(["backup", "--storage", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(success)"))
        .stdout(predicate::str::contains("Total: 1 record(s)"));

    let backup = only_backup(temp.path());
    let name = backup.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.ends_with(".json.gz"));

    centervault(temp.path())
        .args(["list-backups", "--details"])
        .assert()
        .success()
        .stdout(predicate::str::contains(name))
        .stdout(predicate::str::contains("Center(1)"))
        .stdout(predicate::str::contains("Contents"));
}

#[test]
fn test_backup_rejects_other_formats() {
    let temp = TempDir::new().unwrap();
    centervault(temp.path())
        .args(["backup", "--format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported backup format"));
}

#[test]
fn test_restore_requires_force() {
    let temp = TempDir::new().unwrap();
    import_centers(temp.path());
    centervault(temp.path()).arg("backup").assert().success();
    let backup = only_backup(temp.path());

    centervault(temp.path())
        .arg("restore")
        .arg(&backup)
        .args(["--storage", "local", "--models", "Center", "--clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Snapshot Information"))
        .stdout(predicate::str::contains(
            "--storage local --models Center --clear --force",
        ));

    centervault(temp.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("BACKUP"))
        .stdout(predicate::str::contains("RESTORE").not());
}

#[test]
fn test_restore_dry_run_and_force() {
    let temp = TempDir::new().unwrap();
    import_centers(temp.path());
    centervault(temp.path()).arg("backup").assert().success();
    let backup = only_backup(temp.path());

    centervault(temp.path())
        .arg("restore")
        .arg(&backup)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing was changed"));

    centervault(temp.path())
        .arg("restore")
        .arg(&backup)
        .arg("--force")
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored from"))
        .stdout(predicate::str::contains("Total: 0 record(s) restored"));

    centervault(temp.path())
        .args(["history", "--kind", "restore"])
        .assert()
        .success()
        .stdout(predicate::str::contains("RESTORE"))
        .stdout(predicate::str::contains("(dry run)"));
}

#[test]
fn test_restore_latest_from_backend() {
    let temp = TempDir::new().unwrap();
    import_centers(temp.path());
    centervault(temp.path()).arg("backup").assert().success();

    // Empty the store, then restore through the local backend
    fs::remove_file(temp.path().join("data").join("Center.json")).unwrap();

    centervault(temp.path())
        .args(["restore", "latest", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 1 record(s) restored"));

    let stored = fs::read_to_string(temp.path().join("data").join("Center.json")).unwrap();
    assert!(stored.contains("Sunrise Therapy"));
}

#[test]
fn test_cleanup_preview_keeps_recent() {
    let temp = TempDir::new().unwrap();
    centervault(temp.path()).arg("backup").assert().success();

    centervault(temp.path())
        .args(["cleanup", "--retention-days", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups older than 30 days"));
}

#[test]
fn test_empty_history() {
    let temp = TempDir::new().unwrap();
    centervault(temp.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No backup or restore runs recorded."));
}
