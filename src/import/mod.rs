//! Bulk CSV import
//!
//! - `descriptor`: what each entity type requires and how a row becomes a record
//! - `bundle`: optional zip of images matched to rows by filename
//! - `engine`: validation gate, batched processing and progress reporting

pub mod bundle;
pub mod descriptor;
pub mod engine;

pub use bundle::ImageBundle;
pub use descriptor::{descriptor_for, descriptors, CsvRow, ImportDescriptor, CENTER, THERAPIST};
pub use engine::{ImportEngine, ImportSummary, PreparedImport};
