//! Amendments of the postal code base.

use crate::error::{GeoError, Result};
use crate::model::postal::{PostalRecord, POSTAL_CODE_PATTERN, POSTAL_INSEE_CODE_PATTERN};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A postal row supplied in place of the published ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostalEntry {
    #[serde(alias = "name")]
    pub label: String,
    pub postal_code: String,
    pub delivery_label: String,
    #[serde(default)]
    pub associated_name: Option<String>,
}

/// Replacement rows keyed by commune code.
///
/// Every published row of a listed commune is dropped and the listed rows
/// take its place; an empty list only removes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostalAmendments {
    pub communes: BTreeMap<String, Vec<PostalEntry>>,
}

#[allow(clippy::expect_used)]
static INSEE_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(POSTAL_INSEE_CODE_PATTERN).expect("Hard-coded regex pattern should be valid")
});

#[allow(clippy::expect_used)]
static POSTAL_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(POSTAL_CODE_PATTERN).expect("Hard-coded regex pattern should be valid"));

impl PostalAmendments {
    pub fn is_empty(&self) -> bool {
        self.communes.is_empty()
    }

    /// Commune codes whose published rows are dropped.
    pub fn removed_codes(&self) -> Vec<String> {
        self.communes.keys().cloned().collect()
    }

    /// Rows added in place of the dropped ones, by commune code.
    pub fn records(&self) -> Vec<PostalRecord> {
        self.communes
            .iter()
            .flat_map(|(code, entries)| {
                entries.iter().map(move |entry| PostalRecord {
                    insee_code: code.clone(),
                    label: entry.label.clone(),
                    postal_code: entry.postal_code.clone(),
                    delivery_label: entry.delivery_label.clone(),
                    associated_name: entry.associated_name.clone(),
                })
            })
            .collect()
    }

    /// Rejects codes the postal checks would reject anyway.
    pub fn validate(&self) -> Result<()> {
        for (code, entries) in &self.communes {
            if !INSEE_CODE.is_match(code) {
                return Err(GeoError::Configuration(format!(
                    "laposte amendment key '{code}' does not match {POSTAL_INSEE_CODE_PATTERN}"
                )));
            }
            if let Some(entry) = entries.iter().find(|e| !POSTAL_CODE.is_match(&e.postal_code)) {
                return Err(GeoError::Configuration(format!(
                    "laposte amendment of {code}: postal code '{}' does not match {POSTAL_CODE_PATTERN}",
                    entry.postal_code
                )));
            }
        }
        Ok(())
    }
}
