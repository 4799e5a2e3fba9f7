//! Whole-record additions and removals merged before any check runs.

use crate::error::{GeoError, Result};
use crate::model::{DateWindow, EntityDescriptor, GeographicRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Records added to (or replacing rows of) a raw snapshot, and uris removed
/// from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendments {
    #[serde(default)]
    pub add_or_replace: Vec<GeographicRecord>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl Amendments {
    pub fn is_empty(&self) -> bool {
        self.add_or_replace.is_empty() && self.remove.is_empty()
    }

    /// Validates each added record and the uniqueness of uris within each list.
    pub fn validate(&self, descriptor: &EntityDescriptor, window: &DateWindow) -> Result<()> {
        check_unique_uris(
            descriptor,
            "add_or_replace",
            self.add_or_replace.iter().map(|r| r.uri.as_str()),
        )?;
        check_unique_uris(descriptor, "remove", self.remove.iter().map(String::as_str))?;
        for record in &self.add_or_replace {
            record.validate(descriptor, window)?;
        }
        Ok(())
    }
}

fn check_unique_uris<'a>(
    descriptor: &EntityDescriptor,
    list: &str,
    uris: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let mut counter: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for uri in uris {
        let count = counter.entry(uri).or_default();
        if *count == 0 {
            order.push(uri);
        }
        *count += 1;
    }
    let duplicates: Vec<&str> = order.into_iter().filter(|u| counter[u] > 1).collect();
    if let Some(example) = duplicates.first() {
        return Err(GeoError::Configuration(format!(
            "URIs of the {} '{list}' amendments must be unique, but {} are duplicated. For example, '{example}' appears {} times",
            descriptor.description,
            duplicates.len(),
            counter[example]
        )));
    }
    Ok(())
}
