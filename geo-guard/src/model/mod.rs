//! Record model: entity classes, records and datasets.

pub mod dataset;
pub mod entity;
pub mod postal;
pub mod record;
pub mod window;

pub use dataset::{Dataset, DatasetState, SnapshotPaths};
pub use entity::{ColumnType, EntityClass, EntityDescriptor, PatternRule};
pub use postal::{postal_records_to_batch, postal_schema, PostalRecord, POSTAL_FILE, POSTAL_VIEW};
pub use record::{records_from_batches, records_to_batch, split_parent_uris, GeographicRecord};
pub use window::{historical_minimum, DateWindow};
