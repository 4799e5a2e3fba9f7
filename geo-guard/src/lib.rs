//! # geo-guard
//!
//! Validation and correction engine for versioned administrative-geography
//! reference data: communes, municipal arrondissements, departments,
//! overseas collectivities, districts and countries.
//!
//! Raw snapshots are loaded into DataFusion views and run through an ordered
//! catalog of structural and temporal-hierarchical checks. Known faults of
//! the reference data are fixed by pre-approved exceptions; everything else
//! stops the collection with a diagnostic pointing at the offending row.
//!
//! ## Overview
//!
//! - [`model`]: entity classes, their schemas and records
//! - [`exceptions`]: registries of pre-approved corrections
//! - [`checks`]: the check catalog and the global checks
//! - [`temporal`]: interval algorithms behind the overlap and coverage checks
//! - [`replay`]: drives a catalog to a fixed point, replaying after corrections
//! - [`pipeline`]: fetches, amends and cleans every dataset, then the La Poste
//!   postal code base
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use geo_guard::prelude::*;
//! use geo_guard::supplier::FileSupplier;
//!
//! # async fn example() -> geo_guard::error::Result<()> {
//! let collector = Collector::new(
//!     Box::new(FileSupplier::new("snapshots")),
//!     AcquisitionConfig::default(),
//!     ExceptionsConfig::default(),
//! )?;
//!
//! match collector.run("download/insee".as_ref(), true).await {
//!     Ok(report) => println!("{report}"),
//!     Err(GeoError::CheckFailed(diagnostic)) => eprintln!("{diagnostic}"),
//!     Err(other) => return Err(other),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The library emits `tracing` events and spans. Binaries install a
//! subscriber with [`logging::setup::init_logging`].

pub mod checks;
pub mod config;
pub mod core;
pub mod error;
pub mod exceptions;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod prelude;
pub mod replay;
pub mod report;
pub mod security;
pub mod supplier;
pub mod temporal;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;
