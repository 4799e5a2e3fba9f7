use super::retry::RETRYABLE_STATUSES;
use thiserror::Error;

/// Errors raised while fetching a raw snapshot.
#[derive(Debug, Error)]
pub enum SupplierError {
    /// The connection or the read timed out.
    #[error("Timeout while querying {target}: {message}")]
    Timeout { target: String, message: String },

    /// The connection could not be established or broke mid-response.
    #[error("Connection error while querying {target}: {message}")]
    Connection { target: String, message: String },

    /// The endpoint answered with a status other than 200.
    #[error("HTTP error {status} while querying {target}: {body}")]
    Http {
        target: String,
        status: u16,
        body: String,
    },

    /// A local snapshot could not be read.
    #[error("I/O error while reading {target}: {message}")]
    Io { target: String, message: String },

    /// No query was configured for a dataset that needs one.
    #[error("No query configured for {dataset}")]
    MissingQuery { dataset: String },

    /// The supplier has no source for this dataset.
    #[error("{dataset} is not provided by this supplier")]
    Unavailable { dataset: String },
}

impl SupplierError {
    /// Returns true if this error is transient and the request should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SupplierError::Timeout { .. } | SupplierError::Connection { .. } => true,
            SupplierError::Http { status, .. } => RETRYABLE_STATUSES.contains(status),
            SupplierError::Io { .. }
            | SupplierError::MissingQuery { .. }
            | SupplierError::Unavailable { .. } => false,
        }
    }
}
