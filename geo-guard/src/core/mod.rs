//! Core types shared by checks and the replay controller: check outcomes,
//! diagnostics and the relational store.

pub mod outcome;
pub mod store;

pub use outcome::{AppliedCorrection, CheckOutcome, Diagnostic, FaultClass};
pub use store::{GeoStore, GeoStoreConfig, ROW_COLUMN};
