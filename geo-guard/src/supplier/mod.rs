//! Sources of raw snapshots.
//!
//! A [`Supplier`] turns a query into the CSV bytes of a raw snapshot, and
//! downloads the postal code base. The collector only depends on the trait:
//! [`HttpSupplier`] queries the SPARQL endpoint and the La Poste service,
//! [`FileSupplier`] replays snapshots kept on disk.

mod error;
mod file;
#[cfg(feature = "http")]
mod http;
mod queries;
mod retry;

pub use error::SupplierError;
pub use file::FileSupplier;
#[cfg(feature = "http")]
pub use http::HttpSupplier;
pub use queries::bundled_query;
pub use retry::{RetryPolicy, RETRYABLE_STATUSES};

use crate::model::postal::POSTAL_DESCRIPTION;
use crate::model::EntityClass;
use async_trait::async_trait;

#[async_trait]
pub trait Supplier: Send + Sync {
    /// Runs `query` and returns the CSV answer.
    async fn fetch(&self, query: &str) -> Result<Vec<u8>, SupplierError>;

    /// Fetches the raw snapshot of `class` with its configured query, if any.
    async fn fetch_dataset(
        &self,
        class: EntityClass,
        query: Option<&str>,
    ) -> Result<Vec<u8>, SupplierError> {
        match query {
            Some(query) => self.fetch(query).await,
            None => Err(SupplierError::MissingQuery {
                dataset: class.descriptor().description.to_string(),
            }),
        }
    }

    /// Downloads the raw postal code base.
    async fn fetch_postal(&self) -> Result<Vec<u8>, SupplierError> {
        Err(SupplierError::Unavailable {
            dataset: POSTAL_DESCRIPTION.to_string(),
        })
    }
}
