//! Error types for the geo-guard validation engine.
//!
//! Validation faults are not errors: checks report them through
//! [`CheckOutcome`](crate::core::CheckOutcome). A fault only becomes a
//! [`GeoError`] once it is fatal for the run, at which point the diagnostic
//! travels inside [`GeoError::CheckFailed`]. Everything else in this enum is an
//! infrastructure failure (query engine, filesystem, configuration).

use thiserror::Error;

use crate::core::Diagnostic;
use crate::exceptions::CheckKind;
use crate::supplier::SupplierError;

/// The main error type for geo-guard.
#[derive(Error, Debug)]
pub enum GeoError {
    /// A check produced a fatal outcome. The run must stop.
    #[error("{0}")]
    CheckFailed(Box<Diagnostic>),

    /// A step that passed in an earlier pass fails again on replay and no
    /// registered exception resolves it.
    #[error(
        "Control-flow invariant violated at step {step} ('{check}') of dataset '{dataset}': {message}"
    )]
    ControlFlowInvariant {
        step: usize,
        check: String,
        dataset: String,
        message: String,
    },

    /// Two exception entries of the same check kind share a uri.
    #[error("Duplicate exception key '{uri}' for check kind '{kind}' ({occurrences} occurrences)")]
    DuplicateExceptionKey {
        kind: CheckKind,
        uri: String,
        occurrences: usize,
    },

    /// Error raised by a data supplier once its retries are exhausted.
    #[error("Supplier error: {0}")]
    Supplier(#[from] SupplierError),

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error when parsing or decoding data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generated statement was rejected before reaching the query engine.
    #[error("Security error: {0}")]
    SecurityError(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, GeoError>`.
pub type Result<T> = std::result::Result<T, GeoError>;

impl GeoError {
    /// Wraps a fatal diagnostic.
    pub fn check_failed(diagnostic: Diagnostic) -> Self {
        Self::CheckFailed(Box::new(diagnostic))
    }

    /// Returns the diagnostic carried by a fatal check outcome, if any.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            GeoError::CheckFailed(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }

    /// Creates a control-flow invariant error.
    pub fn control_flow(
        step: usize,
        check: impl Into<String>,
        dataset: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ControlFlowInvariant {
            step,
            check: check.into(),
            dataset: dataset.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for GeoError {
    fn from(err: serde_json::Error) -> Self {
        GeoError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for GeoError {
    fn from(err: serde_yaml::Error) -> Self {
        GeoError::Serialization(err.to_string())
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<GeoError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| wrap(msg, e.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(&f(), e.into()))
    }
}

// Fatal diagnostics keep their type so callers can still inspect them.
fn wrap(msg: &str, err: GeoError) -> GeoError {
    match err {
        GeoError::CheckFailed(_) | GeoError::ControlFlowInvariant { .. } => err,
        GeoError::Internal(inner) => GeoError::Internal(format!("{msg}: {inner}")),
        other => GeoError::Internal(format!("{msg}: {other}")),
    }
}
