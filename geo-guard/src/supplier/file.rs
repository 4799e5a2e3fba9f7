use super::{Supplier, SupplierError};
use crate::model::{EntityClass, POSTAL_FILE};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Reads snapshots from a local directory instead of querying an endpoint.
///
/// Dataset fetches read `<dir>/<view_name>.csv`; queries are ignored. The
/// postal base is read from `<dir>/laposte_hexasmal.csv`. A raw
/// [`fetch`](Supplier::fetch) treats the query as a file name under `dir`.
#[derive(Debug, Clone)]
pub struct FileSupplier {
    dir: PathBuf,
}

impl FileSupplier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the snapshot of `class`.
    pub fn path_for(&self, class: EntityClass) -> PathBuf {
        self.dir.join(format!("{}.csv", class.descriptor().view_name))
    }

    pub fn postal_path(&self) -> PathBuf {
        self.dir.join(POSTAL_FILE)
    }

    async fn read(path: &Path) -> Result<Vec<u8>, SupplierError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| SupplierError::Io {
            target: path.display().to_string(),
            message: e.to_string(),
        })?;
        info!(path = %path.display(), bytes = bytes.len(), "Read local snapshot");
        Ok(bytes)
    }
}

#[async_trait]
impl Supplier for FileSupplier {
    async fn fetch(&self, query: &str) -> Result<Vec<u8>, SupplierError> {
        Self::read(&self.dir.join(query.trim())).await
    }

    #[instrument(skip(self, _query), fields(dir = %self.dir.display()))]
    async fn fetch_dataset(
        &self,
        class: EntityClass,
        _query: Option<&str>,
    ) -> Result<Vec<u8>, SupplierError> {
        Self::read(&self.path_for(class)).await
    }

    async fn fetch_postal(&self) -> Result<Vec<u8>, SupplierError> {
        Self::read(&self.postal_path()).await
    }
}
