//! Keyed tables of pre-approved corrections.

use super::entry::{Correction, ExceptionEntry};
use super::kind::CheckKind;
use crate::error::{GeoError, Result};
use std::collections::HashMap;

/// The exceptions registered for one check kind.
///
/// Immutable once loaded. Checks borrow it to decide whether a fault may be
/// corrected and to build the corrective rewrite.
#[derive(Debug, Clone)]
pub struct ExceptionRegistry {
    kind: CheckKind,
    entries: Vec<ExceptionEntry>,
    index: HashMap<String, usize>,
}

impl ExceptionRegistry {
    pub fn empty(kind: CheckKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Builds a registry, rejecting duplicate uris and corrections whose
    /// shape does not fit `kind`.
    pub fn load(kind: CheckKind, entries: impl IntoIterator<Item = ExceptionEntry>) -> Result<Self> {
        let entries: Vec<ExceptionEntry> = entries.into_iter().collect();

        let mut occurrences: HashMap<&str, usize> = HashMap::new();
        for entry in &entries {
            *occurrences.entry(entry.uri()).or_default() += 1;
        }
        if let Some(duplicate) = entries.iter().find(|e| occurrences[e.uri()] > 1) {
            return Err(GeoError::DuplicateExceptionKey {
                kind,
                uri: duplicate.uri().to_string(),
                occurrences: occurrences[duplicate.uri()],
            });
        }

        for entry in &entries {
            if let Some(correction) = entry.correction() {
                if !correction.fits(kind) {
                    return Err(GeoError::Configuration(format!(
                        "Exception '{}' carries a correction that does not apply to check kind '{kind}'",
                        entry.uri()
                    )));
                }
            }
        }

        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.uri().to_string(), i))
            .collect();

        Ok(Self {
            kind,
            entries,
            index,
        })
    }

    pub fn kind(&self) -> CheckKind {
        self.kind
    }

    pub fn lookup(&self, uri: &str) -> Option<&ExceptionEntry> {
        self.index.get(uri).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.index.contains_key(uri)
    }

    pub fn entries(&self) -> &[ExceptionEntry] {
        &self.entries
    }

    /// `(uri, correction)` pairs of the replace entries, in load order.
    pub fn replacements(&self) -> impl Iterator<Item = (&str, &Correction)> {
        self.entries.iter().filter_map(|e| match e {
            ExceptionEntry::Replace { uri, correction } => Some((uri.as_str(), correction)),
            ExceptionEntry::Remove { .. } => None,
        })
    }

    /// Uris of the remove entries, in load order.
    pub fn removals(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            ExceptionEntry::Remove { uri } => Some(uri.as_str()),
            ExceptionEntry::Replace { .. } => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One registry per check kind, for a single dataset.
#[derive(Debug, Clone)]
pub struct RegistrySet {
    registries: HashMap<CheckKind, ExceptionRegistry>,
}

impl Default for RegistrySet {
    fn default() -> Self {
        Self {
            registries: CheckKind::ALL
                .iter()
                .map(|&kind| (kind, ExceptionRegistry::empty(kind)))
                .collect(),
        }
    }
}

impl RegistrySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the registry of the kind it was loaded for.
    pub fn with(mut self, registry: ExceptionRegistry) -> Self {
        self.registries.insert(registry.kind(), registry);
        self
    }

    pub fn get(&self, kind: CheckKind) -> &ExceptionRegistry {
        // Every kind is populated at construction.
        &self.registries[&kind]
    }

    pub fn total_entries(&self) -> usize {
        self.registries.values().map(ExceptionRegistry::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const A: &str = "http://id.insee.fr/geo/commune/aaaaaaaa-0000-0000-0000-000000000000";
    const B: &str = "http://id.insee.fr/geo/commune/bbbbbbbb-0000-0000-0000-000000000000";

    #[test]
    fn test_lookup() {
        let registry = ExceptionRegistry::load(
            CheckKind::Code,
            vec![
                ExceptionEntry::replace(A, Correction::Code("75056".into())),
                ExceptionEntry::remove(B),
            ],
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(matches!(registry.lookup(A), Some(ExceptionEntry::Replace { .. })));
        assert!(matches!(registry.lookup(B), Some(ExceptionEntry::Remove { .. })));
        assert!(registry.lookup("other").is_none());
        assert_eq!(registry.removals().collect::<Vec<_>>(), vec![B]);
        assert_eq!(registry.replacements().count(), 1);
    }

    #[test]
    fn test_duplicate_uri_fails_at_load() {
        let err = ExceptionRegistry::load(
            CheckKind::StartDate,
            vec![
                ExceptionEntry::replace(A, Correction::StartDate(NaiveDate::from_ymd_opt(1950, 1, 1).unwrap())),
                ExceptionEntry::remove(A),
            ],
        )
        .unwrap_err();
        match err {
            GeoError::DuplicateExceptionKey {
                kind,
                uri,
                occurrences,
            } => {
                assert_eq!(kind, CheckKind::StartDate);
                assert_eq!(uri, A);
                assert_eq!(occurrences, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_uri_in_two_kinds_is_allowed() {
        let set = RegistrySet::new()
            .with(ExceptionRegistry::load(CheckKind::Code, vec![ExceptionEntry::remove(A)]).unwrap())
            .with(
                ExceptionRegistry::load(CheckKind::UriUniqueness, vec![ExceptionEntry::remove(A)])
                    .unwrap(),
            );
        assert!(set.get(CheckKind::Code).contains(A));
        assert!(set.get(CheckKind::UriUniqueness).contains(A));
        assert!(set.get(CheckKind::EndDate).is_empty());
        assert_eq!(set.total_entries(), 2);
    }

    #[test]
    fn test_mismatched_correction_is_rejected() {
        let err = ExceptionRegistry::load(
            CheckKind::QualifierCode,
            vec![ExceptionEntry::replace(A, Correction::Code("75056".into()))],
        )
        .unwrap_err();
        assert!(matches!(err, GeoError::Configuration(_)));
    }
}
