//! Exception registries.
//!
//! Exceptions are corrections approved ahead of time for known faults of the
//! reference data. Each one is keyed by record uri and scoped to a single
//! [`CheckKind`]. Whole-record [`Amendments`] are applied before the catalog
//! runs; per-kind registries are consulted by the checks themselves.

pub mod amendments;
pub mod entry;
pub mod kind;
pub mod postal;
pub mod registry;

pub use amendments::Amendments;
pub use entry::{Correction, ExceptionEntry, ExceptionSpec, ReplacementFields};
pub use kind::CheckKind;
pub use postal::{PostalAmendments, PostalEntry};
pub use registry::{ExceptionRegistry, RegistrySet};
