//! Generic bulk import engine
//!
//! Runs `Created → Validating → Processing(batch 1..n) → Completed | Failed`
//! for any [`ImportDescriptor`]. Validation finishes with zero writes before
//! any row is processed. Afterwards every row is its own atomic unit and a
//! failing row is recorded without touching its neighbours.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{VaultError, VaultResult};
use crate::geocode::Geocoder;
use crate::models::{CollectionDescriptor, NaturalKey, Record, TaskId};
use crate::progress::{ProgressSnapshot, ProgressStore, RowError, RowOutcome, TaskState};
use crate::storage::{write_bytes_atomic, RecordStore};

use super::bundle::ImageBundle;
use super::descriptor::{owner_id, CsvRow, ImageAttachment, ImportDescriptor};

/// Validation messages shown before the rest are summarized
const MAX_VALIDATION_MESSAGES: usize = 10;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A validated import waiting to be run
#[derive(Debug)]
pub struct PreparedImport {
    pub task_id: TaskId,
    pub descriptor: ImportDescriptor,
    rows: Vec<CsvRow>,
    images: Option<ImageBundle>,
}

impl PreparedImport {
    pub fn total(&self) -> usize {
        self.rows.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.as_ref().map_or(0, ImageBundle::len)
    }
}

/// Final result of an import run
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub task_id: TaskId,
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<RowError>,
    pub cancelled: bool,
}

pub struct ImportEngine {
    store: Arc<dyn RecordStore>,
    progress: Arc<dyn ProgressStore>,
    geocoder: Arc<dyn Geocoder>,
    media_root: PathBuf,
    batch_size: usize,
    registry: Vec<CollectionDescriptor>,
}

impl ImportEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        progress: Arc<dyn ProgressStore>,
        geocoder: Arc<dyn Geocoder>,
        media_root: PathBuf,
    ) -> Self {
        Self {
            store,
            progress,
            geocoder,
            media_root,
            batch_size: 10,
            registry: CollectionDescriptor::default_registry(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_registry(mut self, registry: Vec<CollectionDescriptor>) -> Self {
        self.registry = registry;
        self
    }

    /// Parse and validate a file, registering a task callers can poll.
    ///
    /// Any violation fails the whole import with one consolidated
    /// validation error and nothing is written.
    pub fn prepare(
        &self,
        descriptor: ImportDescriptor,
        csv_bytes: &[u8],
        bundle: Option<&[u8]>,
    ) -> VaultResult<PreparedImport> {
        let (headers, rows) = parse_csv(csv_bytes)?;

        let purged = self.progress.purge_expired();
        if purged > 0 {
            debug!(purged, "Dropped expired import tasks");
        }

        let task_id = TaskId::new();
        self.progress.init(task_id, rows.len());
        self.progress.set_state(task_id, TaskState::Validating, None);

        let validated = self.validate(&descriptor, &headers, &rows).and_then(|()| {
            bundle.map(ImageBundle::from_zip).transpose()
        });

        match validated {
            Ok(images) => {
                info!(
                    task_id = %task_id,
                    entity = descriptor.name,
                    rows = rows.len(),
                    images = images.as_ref().map_or(0, ImageBundle::len),
                    "Import file validated"
                );
                Ok(PreparedImport {
                    task_id,
                    descriptor,
                    rows,
                    images,
                })
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Import rejected");
                self.progress.set_state(task_id, TaskState::Failed, None);
                self.progress.clear(task_id);
                Err(e)
            }
        }
    }

    fn validate(
        &self,
        descriptor: &ImportDescriptor,
        headers: &[String],
        rows: &[CsvRow],
    ) -> VaultResult<()> {
        let missing: Vec<&str> = descriptor
            .required_columns
            .iter()
            .copied()
            .filter(|c| !headers.iter().any(|h| h == c))
            .collect();
        if !missing.is_empty() {
            return Err(VaultError::Validation(format!(
                "Missing required columns: {}",
                missing.join(", ")
            )));
        }
        if rows.is_empty() {
            return Err(VaultError::Validation("Import file has no data rows".into()));
        }

        let existing = self.store.keys(&self.collection(descriptor))?;
        let mut seen: HashMap<NaturalKey, usize> = HashMap::new();
        let mut problems = Vec::new();

        for row in rows {
            let Some(key) = descriptor.file_key(row) else {
                problems.push(format!(
                    "Row {}: {} must not be blank",
                    row.number,
                    descriptor.key_columns.join(", ")
                ));
                continue;
            };
            if let Some(first) = seen.get(&key) {
                problems.push(format!(
                    "Row {}: duplicate {} (first seen on row {})",
                    row.number, key, first
                ));
                continue;
            }
            seen.insert(key.clone(), row.number);

            if let Some(store_key) = (descriptor.store_key)(row, self.store.as_ref())? {
                if existing.contains(&store_key) {
                    problems.push(format!(
                        "Row {}: {} already exists: {}",
                        row.number, descriptor.collection, key
                    ));
                }
            }
        }

        if problems.is_empty() {
            return Ok(());
        }
        let extra = problems.len().saturating_sub(MAX_VALIDATION_MESSAGES);
        let mut message = problems
            .into_iter()
            .take(MAX_VALIDATION_MESSAGES)
            .collect::<Vec<_>>()
            .join("; ");
        if extra > 0 {
            message.push_str(&format!("; and {} more", extra));
        }
        Err(VaultError::Validation(message))
    }

    /// Process every row in batches, checking `cancel` between batches
    pub async fn run(
        &self,
        prepared: PreparedImport,
        cancel: &CancellationToken,
    ) -> VaultResult<ImportSummary> {
        let PreparedImport {
            task_id,
            descriptor,
            rows,
            images,
        } = prepared;
        let collection = self.collection(&descriptor);

        let mut summary = ImportSummary {
            task_id,
            total: rows.len(),
            success_count: 0,
            error_count: 0,
            errors: Vec::new(),
            cancelled: false,
        };

        for (index, batch) in rows.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.progress
                .set_state(task_id, TaskState::Processing, Some(index + 1));
            debug!(task_id = %task_id, batch = index + 1, rows = batch.len(), "Processing batch");

            for row in batch {
                let outcome = match self
                    .process_row(&descriptor, &collection, row, images.as_ref())
                    .await
                {
                    Ok(()) => {
                        summary.success_count += 1;
                        RowOutcome::Success
                    }
                    Err(message) => {
                        debug!(task_id = %task_id, row = row.number, %message, "Row failed");
                        let error = RowError {
                            row: row.number,
                            message,
                        };
                        summary.errors.push(error.clone());
                        RowOutcome::Failed(error)
                    }
                };
                self.progress.increment(task_id, outcome);
            }
            tokio::task::yield_now().await;
        }
        summary.error_count = summary.errors.len();

        let final_state = if summary.cancelled {
            TaskState::Failed
        } else {
            TaskState::Completed
        };
        self.progress.set_state(task_id, final_state, None);
        self.progress.clear(task_id);

        info!(
            task_id = %task_id,
            entity = descriptor.name,
            total = summary.total,
            success = summary.success_count,
            errors = summary.error_count,
            cancelled = summary.cancelled,
            "Import finished"
        );
        Ok(summary)
    }

    /// Progress of a running import; unknown ids read as zero
    pub fn poll(&self, task_id: TaskId) -> ProgressSnapshot {
        self.progress.read(task_id)
    }

    async fn process_row(
        &self,
        descriptor: &ImportDescriptor,
        collection: &CollectionDescriptor,
        row: &CsvRow,
        images: Option<&ImageBundle>,
    ) -> Result<(), String> {
        if let Some(column) = descriptor.non_key_required().find(|c| row.get(c).is_none()) {
            return Err(format!("{} is required", column));
        }

        let coords = match descriptor.geocode_column.and_then(|c| row.get(c)) {
            Some(address) => self.geocoder.geocode(address).await,
            None => None,
        };

        let record = (descriptor.build)(row, self.store.as_ref(), coords)?;
        let saved = self
            .store
            .insert(collection, record)
            .map_err(|e| match e {
                VaultError::Validation(message) => message,
                other => other.to_string(),
            })?;

        if let (Some(attachment), Some(bundle)) = (descriptor.image, images) {
            if let Err(e) = self.attach_image(attachment, bundle, row, &saved) {
                warn!(row = row.number, error = %e, "Failed to attach image");
            }
        }
        Ok(())
    }

    /// Store the row's bundle image under the media root and link it to the
    /// saved entity. Rows without a matching image are left as they are.
    fn attach_image(
        &self,
        attachment: ImageAttachment,
        bundle: &ImageBundle,
        row: &CsvRow,
        owner: &Record,
    ) -> VaultResult<()> {
        let Some(filename) = row.get(attachment.column) else {
            return Ok(());
        };
        let Some(bytes) = bundle.get(filename) else {
            debug!(row = row.number, file = filename, "No matching image in bundle");
            return Ok(());
        };
        let owner = owner_id(owner)
            .ok_or_else(|| VaultError::Storage("Saved record has no id".into()))?;

        let relative = format!("{}/{}", attachment.subdir, filename);
        write_bytes_atomic(self.media_root.join(&relative), bytes)?;

        let mut image = Record::new();
        image.insert(attachment.owner_field.to_string(), owner);
        image.insert("image".into(), json!(relative));
        let descriptor = self
            .registry
            .iter()
            .find(|d| d.name == attachment.collection)
            .cloned()
            .unwrap_or_else(|| {
                CollectionDescriptor::new(attachment.collection, &[attachment.owner_field, "image"])
            });
        self.store.insert(&descriptor, image)?;
        Ok(())
    }

    fn collection(&self, descriptor: &ImportDescriptor) -> CollectionDescriptor {
        self.registry
            .iter()
            .find(|d| d.name == descriptor.collection)
            .cloned()
            .unwrap_or_else(|| {
                CollectionDescriptor::new(descriptor.collection, descriptor.key_columns)
            })
    }
}

/// Parse an import file into trimmed headers and numbered rows
fn parse_csv(bytes: &[u8]) -> VaultResult<(Vec<String>, Vec<CsvRow>)> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(VaultError::Validation("Import file is empty".into()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| VaultError::Validation(format!("Failed to read header row: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let unique: HashSet<&String> = headers.iter().collect();
    if unique.len() != headers.len() {
        return Err(VaultError::Validation("Header row has duplicate columns".into()));
    }

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            VaultError::Validation(format!("Failed to parse row {}: {}", index + 1, e))
        })?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        let values = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(CsvRow::new(index + 1, values));
    }
    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::{Coordinates, NoopGeocoder};
    use crate::import::bundle::tests::{tiny_png, zip_of};
    use crate::import::descriptor::{CENTER, THERAPIST};
    use crate::progress::MemoryProgressStore;
    use crate::storage::JsonRecordStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedGeocoder;

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, address: &str) -> Option<Coordinates> {
            (!address.contains("unknown")).then_some(Coordinates {
                latitude: 37.5,
                longitude: 127.0,
            })
        }
    }

    struct Fixture {
        _temp: TempDir,
        store: Arc<JsonRecordStore>,
        progress: Arc<MemoryProgressStore>,
        engine: ImportEngine,
        media: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(JsonRecordStore::new(temp.path().join("data")));
        let progress = Arc::new(MemoryProgressStore::default());
        let media = temp.path().join("media");
        let engine = ImportEngine::new(
            store.clone(),
            progress.clone(),
            Arc::new(FixedGeocoder),
            media.clone(),
        );
        Fixture {
            _temp: temp,
            store,
            progress,
            engine,
            media,
        }
    }

    const HEADER: &str = "name,address,contact,url,operating_hours,description,image_filename\n";

    fn centers_csv(rows: &[&str]) -> Vec<u8> {
        let mut csv = HEADER.to_string();
        for row in rows {
            csv.push_str(row);
            csv.push('\n');
        }
        csv.into_bytes()
    }

    #[tokio::test]
    async fn test_row_missing_contact_fails_alone() {
        let f = fixture();
        let csv = centers_csv(&[
            "Sunrise,1 Main St,010-1111-2222,,,,",
            "Harbor,2 Sea Rd,,,,,",
            "Maple,3 Tree Ln,010-3333-4444,,,,",
        ]);

        let prepared = f.engine.prepare(CENTER, &csv, None).unwrap();
        assert_eq!(prepared.total(), 3);
        let summary = f.engine.run(prepared, &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.errors[0].row, 2);
        assert_eq!(summary.errors[0].message, "contact is required");

        let centers = f.store.fetch_all("Center").unwrap();
        assert_eq!(centers.len(), 2);
        assert!(centers.iter().all(|c| c["name"] != json!("Harbor")));
        assert_eq!(centers[0]["latitude"], json!(37.5));
    }

    #[tokio::test]
    async fn test_geocode_failure_stores_null() {
        let f = fixture();
        let csv = centers_csv(&["Sunrise,unknown street,010-1111-2222,,,,"]);

        let prepared = f.engine.prepare(CENTER, &csv, None).unwrap();
        let summary = f.engine.run(prepared, &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.success_count, 1);
        let centers = f.store.fetch_all("Center").unwrap();
        assert!(centers[0]["latitude"].is_null());
        assert!(centers[0]["longitude"].is_null());
    }

    #[test]
    fn test_duplicate_key_in_file_rejected() {
        let f = fixture();
        let csv = centers_csv(&[
            "Sunrise,1 Main St,010-1111-2222,,,,",
            "Sunrise,1 Main St,010-9999-0000,,,,",
        ]);

        let err = f.engine.prepare(CENTER, &csv, None).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("Row 2"));
        assert!(f.store.fetch_all("Center").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collision_with_store_rejected() {
        let f = fixture();
        let first = f
            .engine
            .prepare(CENTER, &centers_csv(&["Sunrise,1 Main St,010-1111-2222,,,,"]), None)
            .unwrap();
        f.engine.run(first, &CancellationToken::new()).await.unwrap();

        let csv = centers_csv(&[
            "Maple,3 Tree Ln,010-3333-4444,,,,",
            "Sunrise,1 Main St,010-1111-2222,,,,",
        ]);
        let err = f.engine.prepare(CENTER, &csv, None).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(f.store.count("Center").unwrap(), 1);
    }

    #[test]
    fn test_missing_columns_rejected() {
        let f = fixture();
        let err = f
            .engine
            .prepare(CENTER, b"name,address\nSunrise,1 Main St\n", None)
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("contact"));
    }

    #[test]
    fn test_blank_key_and_empty_file_rejected() {
        let f = fixture();
        let err = f
            .engine
            .prepare(CENTER, &centers_csv(&[",1 Main St,010,,,,"]), None)
            .unwrap_err();
        assert!(err.to_string().contains("must not be blank"));

        assert!(f.engine.prepare(CENTER, b"", None).unwrap_err().is_validation());
        assert!(f
            .engine
            .prepare(CENTER, HEADER.as_bytes(), None)
            .unwrap_err()
            .is_validation());
    }

    #[tokio::test]
    async fn test_image_attached_from_bundle() {
        let f = fixture();
        let png = tiny_png();
        let bundle = zip_of(&[("images/sunrise.png", &png), ("readme.txt", b"hello")]);
        let csv = centers_csv(&[
            "Sunrise,1 Main St,010-1111-2222,,,,sunrise.png",
            "Maple,3 Tree Ln,010-3333-4444,,,,missing.png",
        ]);

        let prepared = f.engine.prepare(CENTER, &csv, Some(&bundle)).unwrap();
        assert_eq!(prepared.image_count(), 1);
        let summary = f.engine.run(prepared, &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.success_count, 2);

        let images = f.store.fetch_all("CenterImage").unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["center"], json!(1));
        assert_eq!(images[0]["image"], json!("centers/sunrise.png"));
        assert!(f.media.join("centers/sunrise.png").exists());
    }

    #[tokio::test]
    async fn test_therapist_rows() {
        let f = fixture();
        let centers = f
            .engine
            .prepare(CENTER, &centers_csv(&["Sunrise,1 Main St,010-1111-2222,,,,"]), None)
            .unwrap();
        f.engine.run(centers, &CancellationToken::new()).await.unwrap();

        let csv = b"center_name,name,experience,specialty\n\
Sunrise,Kim,5,speech\n\
Nowhere,Lee,3,play\n\
Sunrise,Park,many,art\n";
        let prepared = f.engine.prepare(THERAPIST, csv, None).unwrap();
        let summary = f.engine.run(prepared, &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.success_count, 1);
        let rows: Vec<_> = summary.errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![2, 3]);
        assert_eq!(summary.errors[0].message, "Center not found: Nowhere");
        assert_eq!(f.store.count("Therapist").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_between_batches() {
        let f = fixture();
        let engine = ImportEngine::new(
            f.store.clone(),
            f.progress.clone(),
            Arc::new(NoopGeocoder),
            f.media.clone(),
        )
        .with_batch_size(2);
        let rows: Vec<String> = (0..5)
            .map(|i| format!("Center {i},{i} Main St,010,,,,"))
            .collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();

        let prepared = engine.prepare(CENTER, &centers_csv(&rows), None).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = engine.run(prepared, &cancel).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.success_count, 0);
        assert_eq!(f.store.count("Center").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_progress_visible_until_finished() {
        let f = fixture();
        let csv = centers_csv(&["Sunrise,1 Main St,010,,,,"]);
        let prepared = f.engine.prepare(CENTER, &csv, None).unwrap();
        let task_id = prepared.task_id;

        let polled = f.engine.poll(task_id);
        assert_eq!(polled.total, 1);
        assert_eq!(polled.state, Some(TaskState::Validating));

        f.engine.run(prepared, &CancellationToken::new()).await.unwrap();
        assert_eq!(f.engine.poll(task_id), ProgressSnapshot::default());
    }

    #[test]
    fn test_poll_unknown_task() {
        let f = fixture();
        let polled = f.engine.poll(TaskId::new());
        assert_eq!(polled.total, 0);
        assert_eq!(polled.processed, 0);
        assert!(polled.errors.is_empty());
    }

    #[test]
    fn test_parse_csv_strips_bom_and_numbers_rows() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"name , address\n a , b \n\n c , d \n");
        let (headers, rows) = parse_csv(&bytes).unwrap();
        assert_eq!(headers, vec!["name", "address"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some("a"));
        assert_eq!(rows[1].number, 2);
    }
}
