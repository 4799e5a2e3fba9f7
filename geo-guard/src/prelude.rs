//! Prelude for commonly used types and traits in geo-guard.

pub use crate::checks::{catalog_for, Check, CheckContext, CheckOutcome, Diagnostic, FaultClass};
pub use crate::config::{AcquisitionConfig, ExceptionsConfig};
pub use crate::core::{GeoStore, GeoStoreConfig};
pub use crate::error::{ErrorContext, GeoError, Result};
pub use crate::exceptions::{CheckKind, ExceptionRegistry, RegistrySet};
pub use crate::logging::LogConfig;
pub use crate::model::{Dataset, DateWindow, EntityClass, GeographicRecord};
pub use crate::pipeline::Collector;
pub use crate::replay::{ReplayController, ReplayReport};
pub use crate::report::CollectionReport;
pub use crate::supplier::{Supplier, SupplierError};
