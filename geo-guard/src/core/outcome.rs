//! Outcomes of a single check invocation.

use crate::exceptions::CheckKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a fatal fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    /// The snapshot cannot be loaded with the declared schema
    Schema,
    /// Event distinctness, event/date co-presence and format rules without
    /// a correction path
    Structural,
    /// A correctable fault for which no exception is registered
    Correctable,
    /// Parent existence, overlap, gaps or containment
    Hierarchy,
    /// Event dates or code periods conflicting across datasets
    GlobalConsistency,
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultClass::Schema => "schema error",
            FaultClass::Structural => "structural fault",
            FaultClass::Correctable => "correctable fault",
            FaultClass::Hierarchy => "hierarchy fault",
            FaultClass::GlobalConsistency => "global consistency fault",
        };
        f.write_str(name)
    }
}

/// Everything needed to locate a fault in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Name of the failing check
    pub check: String,
    /// Description of the dataset the check ran on
    pub dataset: String,
    pub class: FaultClass,
    /// 1-based row number in the working snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(check: impl Into<String>, dataset: impl Into<String>, class: FaultClass) -> Self {
        Self {
            check: check.into(),
            dataset: dataset.into(),
            class,
            row: None,
            uri: None,
            value: None,
            message: String::new(),
        }
    }

    pub fn with_row(mut self, row: u64) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in check '{}' on {}", self.class, self.check, self.dataset)?;
        if let Some(row) = self.row {
            write!(f, " at row {row}")?;
        }
        if let Some(uri) = &self.uri {
            write!(f, " for uri {uri}")?;
        }
        if let Some(value) = &self.value {
            write!(f, " (value: {value})")?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// What a correction did to the working snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCorrection {
    pub kind: CheckKind,
    /// Offending uri whose registered exception triggered the rewrite
    pub trigger_uri: String,
    /// Uris whose fields were replaced
    pub replaced: Vec<String>,
    /// Uris whose rows were dropped
    pub removed: Vec<String>,
}

/// Result of running one check once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    /// A registered exception matched and the snapshot was rewritten
    Corrected(AppliedCorrection),
    Fatal(Box<Diagnostic>),
}

impl CheckOutcome {
    pub fn fatal(diagnostic: Diagnostic) -> Self {
        CheckOutcome::Fatal(Box::new(diagnostic))
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, CheckOutcome::Pass)
    }

    pub fn is_corrected(&self) -> bool {
        matches!(self, CheckOutcome::Corrected(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CheckOutcome::Fatal(_))
    }
}
