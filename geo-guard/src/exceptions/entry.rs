//! Exception entries and the corrections they carry.

use super::kind::CheckKind;
use crate::error::{GeoError, Result};
use crate::model::split_parent_uris;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Replacement values, one shape per check kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    Uri(String),
    Code(String),
    QualifierCode(String),
    StartDate(NaiveDate),
    EndDate(NaiveDate),
    Dates {
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    },
    CodeAndPeriod {
        code: String,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    },
    ParentUris(Vec<String>),
}

impl Correction {
    /// Whether this correction fits registries of `kind`.
    pub fn fits(&self, kind: CheckKind) -> bool {
        matches!(
            (kind, self),
            (CheckKind::UriFormat, Correction::Uri(_))
                | (CheckKind::Code, Correction::Code(_))
                | (CheckKind::QualifierCode, Correction::QualifierCode(_))
                | (CheckKind::StartDate, Correction::StartDate(_))
                | (CheckKind::EndDate, Correction::EndDate(_))
                | (CheckKind::DateConsistency, Correction::Dates { .. })
                | (CheckKind::CodeOverlap, Correction::CodeAndPeriod { .. })
                | (CheckKind::ParentUnicity, Correction::ParentUris(_))
        )
    }
}

/// A pre-approved correction keyed by record uri.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExceptionEntry {
    Replace { uri: String, correction: Correction },
    Remove { uri: String },
}

impl ExceptionEntry {
    pub fn replace(uri: impl Into<String>, correction: Correction) -> Self {
        ExceptionEntry::Replace {
            uri: uri.into(),
            correction,
        }
    }

    pub fn remove(uri: impl Into<String>) -> Self {
        ExceptionEntry::Remove { uri: uri.into() }
    }

    pub fn uri(&self) -> &str {
        match self {
            ExceptionEntry::Replace { uri, .. } | ExceptionEntry::Remove { uri } => uri,
        }
    }

    pub fn correction(&self) -> Option<&Correction> {
        match self {
            ExceptionEntry::Replace { correction, .. } => Some(correction),
            ExceptionEntry::Remove { .. } => None,
        }
    }
}

/// An exception as written in configuration files.
///
/// ```yaml
/// - action: replace
///   uri: http://id.insee.fr/geo/commune/...
///   insee_code: "75056"
/// - action: remove
///   uri: http://id.insee.fr/geo/commune/...
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExceptionSpec {
    Replace {
        uri: String,
        #[serde(flatten)]
        fields: ReplacementFields,
    },
    Remove {
        uri: String,
    },
}

/// Replacement columns of an [`ExceptionSpec`]; which ones are required
/// depends on the check kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplacementFields {
    pub new_uri: Option<String>,
    pub insee_code: Option<String>,
    pub article_code: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub parent_uri: Option<String>,
}

impl ExceptionSpec {
    /// Turns the configuration form into a typed entry for `kind`.
    pub fn into_entry(self, kind: CheckKind) -> Result<ExceptionEntry> {
        let (uri, fields) = match self {
            ExceptionSpec::Remove { uri } => return Ok(ExceptionEntry::Remove { uri }),
            ExceptionSpec::Replace { uri, fields } => (uri, fields),
        };
        let missing = |field: &str| {
            GeoError::Configuration(format!(
                "Exception '{uri}' of kind '{kind}' is missing field '{field}'"
            ))
        };
        let correction = match kind {
            CheckKind::UriFormat => Correction::Uri(fields.new_uri.ok_or_else(|| missing("new_uri"))?),
            CheckKind::UriUniqueness => {
                return Err(GeoError::Configuration(format!(
                    "Exception '{uri}': kind '{kind}' only accepts removals"
                )))
            }
            CheckKind::Code => {
                Correction::Code(fields.insee_code.ok_or_else(|| missing("insee_code"))?)
            }
            CheckKind::QualifierCode => Correction::QualifierCode(
                fields.article_code.ok_or_else(|| missing("article_code"))?,
            ),
            CheckKind::StartDate => {
                Correction::StartDate(fields.start_date.ok_or_else(|| missing("start_date"))?)
            }
            CheckKind::EndDate => {
                Correction::EndDate(fields.end_date.ok_or_else(|| missing("end_date"))?)
            }
            CheckKind::DateConsistency => Correction::Dates {
                start_date: fields.start_date.ok_or_else(|| missing("start_date"))?,
                end_date: fields.end_date,
            },
            CheckKind::CodeOverlap => Correction::CodeAndPeriod {
                code: fields.insee_code.ok_or_else(|| missing("insee_code"))?,
                start_date: fields.start_date.ok_or_else(|| missing("start_date"))?,
                end_date: fields.end_date,
            },
            CheckKind::ParentUnicity => {
                let joined = fields.parent_uri.ok_or_else(|| missing("parent_uri"))?;
                Correction::ParentUris(split_parent_uris(&joined))
            }
        };
        Ok(ExceptionEntry::Replace { uri, correction })
    }
}
