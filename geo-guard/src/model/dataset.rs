//! Datasets and their snapshot files.

use super::entity::{EntityClass, EntityDescriptor};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Lifecycle of a dataset through one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetState {
    /// As fetched from the supplier
    Raw,
    /// Raw rows with configured amendments merged in
    ExceptionApplied,
    /// Passed every check of the catalog
    Cleaned,
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetState::Raw => write!(f, "raw"),
            DatasetState::ExceptionApplied => write!(f, "exception-applied"),
            DatasetState::Cleaned => write!(f, "cleaned"),
        }
    }
}

/// Files backing the four stages of a dataset.
///
/// `cleaned` is the working snapshot. Corrections rewrite it in place, so it
/// only holds cleaned data once the dataset reached [`DatasetState::Cleaned`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotPaths {
    pub raw: PathBuf,
    pub additions: PathBuf,
    pub removals: PathBuf,
    pub cleaned: PathBuf,
}

impl SnapshotPaths {
    /// Conventional layout: `root/{raw,add_or_replace,remove,cleaned}/file_name`.
    pub fn under(root: impl AsRef<Path>, file_name: &str) -> Self {
        let root = root.as_ref();
        Self {
            raw: root.join("raw").join(file_name),
            additions: root.join("add_or_replace").join(file_name),
            removals: root.join("remove").join(file_name),
            cleaned: root.join("cleaned").join(file_name),
        }
    }
}

/// The records of one entity class at one stage of the pipeline.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub class: EntityClass,
    pub paths: SnapshotPaths,
    state: DatasetState,
}

impl Dataset {
    pub fn new(class: EntityClass, paths: SnapshotPaths) -> Self {
        Self {
            class,
            paths,
            state: DatasetState::Raw,
        }
    }

    pub fn descriptor(&self) -> &'static EntityDescriptor {
        self.class.descriptor()
    }

    pub fn description(&self) -> &'static str {
        self.descriptor().description
    }

    pub fn view_name(&self) -> &'static str {
        self.descriptor().view_name
    }

    pub fn state(&self) -> DatasetState {
        self.state
    }

    pub fn is_cleaned(&self) -> bool {
        self.state == DatasetState::Cleaned
    }

    /// Moves the dataset forward. States never go back.
    pub(crate) fn advance(&mut self, state: DatasetState) {
        let rank = |s: DatasetState| s as u8;
        if rank(state) > rank(self.state) {
            self.state = state;
        }
    }
}
