//! Core data models for centervault
//!
//! Records are opaque field maps; collections are described by a static
//! registry; snapshots wrap collections in a versioned envelope.

pub mod ids;
pub mod record;
pub mod registry;
pub mod snapshot;

pub use ids::TaskId;
pub use record::{NaturalKey, Record};
pub use registry::CollectionDescriptor;
pub use snapshot::{CollectionSnapshot, Snapshot, SnapshotMetadata};
