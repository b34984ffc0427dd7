//! Per-entity import descriptors
//!
//! One generic engine imports every entity type. What differs between types
//! is captured here: the columns a file must carry, which of them form the
//! natural key, how a row becomes a record, and whether rows are geocoded or
//! get an image attached.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::VaultResult;
use crate::geocode::Coordinates;
use crate::models::record::{field, key_component};
use crate::models::{NaturalKey, Record};
use crate::storage::RecordStore;

/// One data row of an import file
#[derive(Debug, Clone)]
pub struct CsvRow {
    /// 1-based data row number (the header is not counted)
    pub number: usize,
    values: HashMap<String, String>,
}

impl CsvRow {
    pub fn new(number: usize, values: HashMap<String, String>) -> Self {
        Self { number, values }
    }

    /// Trimmed value; blank cells read as missing
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Text value for a record field; blank becomes an empty string
    fn text(&self, column: &str) -> Value {
        Value::String(self.get(column).unwrap_or_default().to_string())
    }

    fn require(&self, column: &str) -> Result<&str, String> {
        self.get(column)
            .ok_or_else(|| format!("{} is required", column))
    }
}

/// Where a matched bundle image goes after the entity is saved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageAttachment {
    /// Column naming the file inside the bundle
    pub column: &'static str,
    /// Collection receiving the image record
    pub collection: &'static str,
    /// Subdirectory of the media root the file is written to
    pub subdir: &'static str,
    /// Field of the image record pointing at the owner
    pub owner_field: &'static str,
}

/// Computes the key an entity would have in the store
pub type StoreKeyFn = fn(&CsvRow, &dyn RecordStore) -> VaultResult<Option<NaturalKey>>;

/// Turns a validated row into a record
pub type BuildFn = fn(&CsvRow, &dyn RecordStore, Option<Coordinates>) -> Result<Record, String>;

/// Declarative description of one importable entity type
#[derive(Clone, Copy)]
pub struct ImportDescriptor {
    /// Name used on the command line
    pub name: &'static str,
    /// Target collection
    pub collection: &'static str,
    pub required_columns: &'static [&'static str],
    pub optional_columns: &'static [&'static str],
    /// Columns forming the in-file natural key; never blank
    pub key_columns: &'static [&'static str],
    /// Column holding the address to geocode
    pub geocode_column: Option<&'static str>,
    pub image: Option<ImageAttachment>,
    pub store_key: StoreKeyFn,
    pub build: BuildFn,
}

impl std::fmt::Debug for ImportDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportDescriptor")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("required_columns", &self.required_columns)
            .field("key_columns", &self.key_columns)
            .finish()
    }
}

impl ImportDescriptor {
    /// Key of a row within the file; None when a key column is blank
    pub fn file_key(&self, row: &CsvRow) -> Option<NaturalKey> {
        self.key_columns
            .iter()
            .map(|c| row.get(c).map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(NaturalKey::new)
    }

    /// Required columns that are not part of the key
    pub fn non_key_required(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.required_columns
            .iter()
            .copied()
            .filter(|c| !self.key_columns.contains(c))
    }
}

/// Center listings: key (name, address), geocoded, images attached
pub const CENTER: ImportDescriptor = ImportDescriptor {
    name: "center",
    collection: "Center",
    required_columns: &["name", "address", "contact"],
    optional_columns: &["url", "operating_hours", "description", "image_filename"],
    key_columns: &["name", "address"],
    geocode_column: Some("address"),
    image: Some(ImageAttachment {
        column: "image_filename",
        collection: "CenterImage",
        subdir: "centers",
        owner_field: "center",
    }),
    store_key: center_store_key,
    build: build_center,
};

/// Therapists: key (center, name); the center is looked up by name
pub const THERAPIST: ImportDescriptor = ImportDescriptor {
    name: "therapist",
    collection: "Therapist",
    required_columns: &["center_name", "name", "experience", "specialty"],
    optional_columns: &[],
    key_columns: &["center_name", "name"],
    geocode_column: None,
    image: None,
    store_key: therapist_store_key,
    build: build_therapist,
};

/// All importable entity types
pub fn descriptors() -> [ImportDescriptor; 2] {
    [CENTER, THERAPIST]
}

/// Look up a descriptor by command-line name or collection name
pub fn descriptor_for(name: &str) -> Option<ImportDescriptor> {
    descriptors()
        .into_iter()
        .find(|d| d.name.eq_ignore_ascii_case(name) || d.collection.eq_ignore_ascii_case(name))
}

fn center_store_key(row: &CsvRow, _store: &dyn RecordStore) -> VaultResult<Option<NaturalKey>> {
    Ok(CENTER.file_key(row))
}

fn build_center(
    row: &CsvRow,
    _store: &dyn RecordStore,
    coords: Option<Coordinates>,
) -> Result<Record, String> {
    let mut record = Record::new();
    record.insert("name".into(), json!(row.require("name")?));
    record.insert("address".into(), json!(row.require("address")?));
    record.insert("contact".into(), json!(row.require("contact")?));
    record.insert(
        "latitude".into(),
        coords.map_or(Value::Null, |c| json!(c.latitude)),
    );
    record.insert(
        "longitude".into(),
        coords.map_or(Value::Null, |c| json!(c.longitude)),
    );
    record.insert("url".into(), row.text("url"));
    record.insert("operating_hours".into(), row.text("operating_hours"));
    record.insert("description".into(), row.text("description"));
    Ok(record)
}

/// Id of the first center with the given name
fn center_id(store: &dyn RecordStore, center_name: &str) -> VaultResult<Option<Value>> {
    Ok(store
        .find_by_field("Center", "name", &json!(center_name))?
        .and_then(|center| {
            center
                .get("id")
                .or_else(|| center.get("pk"))
                .cloned()
        }))
}

fn therapist_store_key(row: &CsvRow, store: &dyn RecordStore) -> VaultResult<Option<NaturalKey>> {
    let (Some(center_name), Some(name)) = (row.get("center_name"), row.get("name")) else {
        return Ok(None);
    };
    Ok(center_id(store, center_name)?
        .as_ref()
        .and_then(key_component)
        .map(|id| NaturalKey::new(vec![id, name.to_string()])))
}

fn build_therapist(
    row: &CsvRow,
    store: &dyn RecordStore,
    _coords: Option<Coordinates>,
) -> Result<Record, String> {
    let center_name = row.require("center_name")?;
    let center = center_id(store, center_name)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Center not found: {}", center_name))?;

    let experience: i64 = row
        .require("experience")?
        .parse()
        .map_err(|_| "experience must be an integer".to_string())?;

    let mut record = Record::new();
    record.insert("center".into(), center);
    record.insert("name".into(), json!(row.require("name")?));
    record.insert("experience".into(), json!(experience));
    record.insert("specialty".into(), json!(row.require("specialty")?));
    record.insert("photo".into(), Value::Null);
    Ok(record)
}

/// Value of the owner id to store on an attached image record
pub fn owner_id(record: &Record) -> Option<Value> {
    field(record, "id").or_else(|| field(record, "pk")).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CollectionDescriptor;
    use crate::storage::JsonRecordStore;
    use tempfile::TempDir;

    fn row(number: usize, pairs: &[(&str, &str)]) -> CsvRow {
        CsvRow::new(
            number,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_blank_cells_are_missing() {
        let r = row(1, &[("name", "  "), ("address", " 1 Main St ")]);
        assert_eq!(r.get("name"), None);
        assert_eq!(r.get("address"), Some("1 Main St"));
        assert!(CENTER.file_key(&r).is_none());
    }

    #[test]
    fn test_non_key_required() {
        let cols: Vec<_> = CENTER.non_key_required().collect();
        assert_eq!(cols, vec!["contact"]);
        let cols: Vec<_> = THERAPIST.non_key_required().collect();
        assert_eq!(cols, vec!["experience", "specialty"]);
    }

    #[test]
    fn test_descriptor_lookup() {
        assert_eq!(descriptor_for("center").unwrap().collection, "Center");
        assert_eq!(descriptor_for("Therapist").unwrap().name, "therapist");
        assert!(descriptor_for("review").is_none());
    }

    #[test]
    fn test_build_center() {
        let temp = TempDir::new().unwrap();
        let store = JsonRecordStore::new(temp.path().to_path_buf());
        let r = row(
            1,
            &[("name", "Sunrise"), ("address", "1 Main St"), ("contact", "010-0000-0000")],
        );
        let coords = Coordinates {
            latitude: 37.5,
            longitude: 127.0,
        };

        let record = (CENTER.build)(&r, &store, Some(coords)).unwrap();
        assert_eq!(record["latitude"], json!(37.5));
        assert_eq!(record["url"], json!(""));

        let record = (CENTER.build)(&r, &store, None).unwrap();
        assert!(record["latitude"].is_null());
    }

    #[test]
    fn test_build_therapist_resolves_center() {
        let temp = TempDir::new().unwrap();
        let store = JsonRecordStore::new(temp.path().to_path_buf());
        let centers = CollectionDescriptor::new("Center", &["name", "address"]);
        let mut center = Record::new();
        center.insert("name".into(), json!("Sunrise"));
        center.insert("address".into(), json!("1 Main St"));
        store.insert(&centers, center).unwrap();

        let r = row(
            1,
            &[
                ("center_name", "Sunrise"),
                ("name", "Kim"),
                ("experience", "7"),
                ("specialty", "speech"),
            ],
        );
        let record = (THERAPIST.build)(&r, &store, None).unwrap();
        assert_eq!(record["center"], json!(1));
        assert_eq!(record["experience"], json!(7));

        let key = (THERAPIST.store_key)(&r, &store).unwrap().unwrap();
        assert_eq!(key.parts(), &["1".to_string(), "Kim".to_string()]);
    }

    #[test]
    fn test_build_therapist_errors() {
        let temp = TempDir::new().unwrap();
        let store = JsonRecordStore::new(temp.path().to_path_buf());
        let r = row(
            1,
            &[
                ("center_name", "Nowhere"),
                ("name", "Kim"),
                ("experience", "7"),
                ("specialty", "speech"),
            ],
        );
        assert_eq!(
            (THERAPIST.build)(&r, &store, None).unwrap_err(),
            "Center not found: Nowhere"
        );
        assert!((THERAPIST.store_key)(&r, &store).unwrap().is_none());
    }
}
