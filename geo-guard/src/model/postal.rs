//! The La Poste postal code base ("hexasmal").
//!
//! Unlike the administrative entities, postal rows carry no uri and no
//! validity period: one row links an INSEE commune code to one postal code
//! and delivery label. The supplier delivers it as a semicolon separated
//! file with its own header; the working snapshot uses the comma separated
//! layout of [`POSTAL_COLUMNS`].

use super::entity::PatternRule;
use crate::error::Result;
use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the postal view.
pub const POSTAL_VIEW: &str = "laposte_hexasmal";

/// Snapshot file name used under each stage directory.
pub const POSTAL_FILE: &str = "laposte_hexasmal.csv";

/// Description used in diagnostics.
pub const POSTAL_DESCRIPTION: &str = "La Poste Hexasmal";

/// Columns of the working snapshot, in file order.
pub const POSTAL_COLUMNS: [&str; 5] = [
    "insee_code",
    "label",
    "postal_code",
    "delivery_label",
    "associated_name",
];

/// Header of the file published by La Poste. Columns are read by position.
pub const POSTAL_RAW_HEADER: [&str; 5] = [
    "#Code_commune_INSEE",
    "Nom_de_la_commune",
    "Code_postal",
    "Libellé_d_acheminement",
    "Ligne_5",
];

/// Commune codes of the postal base, Monaco (99138) included.
pub const POSTAL_INSEE_CODE_PATTERN: &str = r"^((0[1-9]|[1-8][0-9]|9[0-8]|2[AB])[0-9]{3}|99138)$";

pub const POSTAL_CODE_PATTERN: &str = r"^[0-9]{5}$";

/// Arrow schema of the postal snapshots, every column nullable text.
pub fn postal_schema() -> SchemaRef {
    Arc::new(Schema::new(
        POSTAL_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ))
}

/// Format rules checked on the postal working snapshot, in order.
pub fn postal_pattern_rules() -> Vec<PatternRule> {
    vec![
        PatternRule {
            column: "insee_code",
            pattern: POSTAL_INSEE_CODE_PATTERN.to_string(),
        },
        PatternRule {
            column: "postal_code",
            pattern: POSTAL_CODE_PATTERN.to_string(),
        },
    ]
}

/// One row of the postal base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalRecord {
    pub insee_code: String,
    pub label: String,
    pub postal_code: String,
    pub delivery_label: String,
    pub associated_name: Option<String>,
}

/// Builds a batch with the postal schema.
pub fn postal_records_to_batch(records: &[PostalRecord]) -> Result<RecordBatch> {
    let text = |f: fn(&PostalRecord) -> Option<&str>| -> ArrayRef {
        Arc::new(records.iter().map(f).collect::<StringArray>())
    };
    let columns = vec![
        text(|r| Some(r.insee_code.as_str())),
        text(|r| Some(r.label.as_str())),
        text(|r| Some(r.postal_code.as_str())),
        text(|r| Some(r.delivery_label.as_str())),
        text(|r| r.associated_name.as_deref()),
    ];
    Ok(RecordBatch::try_new(postal_schema(), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use regex::Regex;

    #[test]
    fn test_schema_follows_columns() {
        let schema = postal_schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, POSTAL_COLUMNS);
        assert_eq!(POSTAL_RAW_HEADER.len(), POSTAL_COLUMNS.len());
    }

    #[test]
    fn test_code_patterns() {
        let insee = Regex::new(POSTAL_INSEE_CODE_PATTERN).unwrap();
        assert!(insee.is_match("75056"));
        assert!(insee.is_match("2A004"));
        assert!(insee.is_match("99138"));
        assert!(!insee.is_match("99100"));
        assert!(!insee.is_match("9705"));

        let postal = Regex::new(POSTAL_CODE_PATTERN).unwrap();
        assert!(postal.is_match("01400"));
        assert!(!postal.is_match("1400"));
    }

    #[test]
    fn test_batch_keeps_missing_associated_name_null() {
        let batch = postal_records_to_batch(&[PostalRecord {
            insee_code: "01001".into(),
            label: "L ABERGEMENT CLEMENCIAT".into(),
            postal_code: "01400".into(),
            delivery_label: "L ABERGEMENT CLEMENCIAT".into(),
            associated_name: None,
        }])
        .unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert!(batch.column(4).is_null(0));
    }
}
