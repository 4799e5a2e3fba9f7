use serde::{Deserialize, Serialize};
use std::fmt;

/// The checks that accept pre-approved corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    UriFormat,
    UriUniqueness,
    Code,
    QualifierCode,
    StartDate,
    EndDate,
    DateConsistency,
    CodeOverlap,
    ParentUnicity,
}

impl CheckKind {
    pub const ALL: [CheckKind; 9] = [
        CheckKind::UriFormat,
        CheckKind::UriUniqueness,
        CheckKind::Code,
        CheckKind::QualifierCode,
        CheckKind::StartDate,
        CheckKind::EndDate,
        CheckKind::DateConsistency,
        CheckKind::CodeOverlap,
        CheckKind::ParentUnicity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::UriFormat => "uri_format",
            CheckKind::UriUniqueness => "uri_uniqueness",
            CheckKind::Code => "code",
            CheckKind::QualifierCode => "qualifier_code",
            CheckKind::StartDate => "start_date",
            CheckKind::EndDate => "end_date",
            CheckKind::DateConsistency => "date_consistency",
            CheckKind::CodeOverlap => "code_overlap",
            CheckKind::ParentUnicity => "parent_unicity",
        }
    }

    /// Whether entries of this kind may carry a replacement.
    pub fn allows_replace(self) -> bool {
        !matches!(self, CheckKind::UriUniqueness)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
