//! Checks of the postal code base.
//!
//! The postal base has no exception registry: a malformed file or a code
//! that does not match its pattern always stops the collection.

use super::local::FirstRow;
use super::{CheckOutcome, Diagnostic, FaultClass};
use crate::core::store::write_snapshot;
use crate::core::GeoStore;
use crate::error::{GeoError, Result};
use crate::model::postal::{postal_schema, POSTAL_DESCRIPTION, POSTAL_RAW_HEADER, POSTAL_VIEW};
use crate::model::{PatternRule, SnapshotPaths};
use crate::security::SqlSecurity;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, instrument};

fn diagnostic(check: &str, class: FaultClass) -> Diagnostic {
    Diagnostic::new(check, POSTAL_DESCRIPTION, class)
}

/// Name under which the format check of `column` is reported.
pub fn pattern_check_name(column: &str) -> String {
    format!("postal_{column}_format")
}

fn check_raw_header(path: &Path) -> Result<()> {
    let mut first_line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first_line)?;
    let fields: Vec<&str> = first_line
        .trim_start_matches('\u{feff}')
        .trim_end_matches(['\r', '\n'])
        .split(';')
        .collect();
    if fields.len() != POSTAL_RAW_HEADER.len() {
        return Err(GeoError::Parse(format!(
            "{}: expected {} columns [{}], found [{}]",
            path.display(),
            POSTAL_RAW_HEADER.len(),
            POSTAL_RAW_HEADER.join(";"),
            fields.join(";")
        )));
    }
    Ok(())
}

fn read_raw(path: &Path, batch_size: usize) -> Result<Vec<arrow::record_batch::RecordBatch>> {
    check_raw_header(path)?;
    let reader = arrow::csv::ReaderBuilder::new(postal_schema())
        .with_header(true)
        .with_delimiter(b';')
        .with_batch_size(batch_size)
        .build(File::open(path)?)
        .map_err(|e| GeoError::Parse(format!("{}: {e}", path.display())))?;
    reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GeoError::Parse(format!("{}: {e}", path.display())))
}

/// Converts the raw postal file into the working snapshot and loads it.
///
/// An unreadable raw file is a fatal [`FaultClass::Schema`] fault.
#[instrument(skip(store, paths), fields(raw = %paths.raw.display()))]
pub async fn load_raw(store: &GeoStore, paths: &SnapshotPaths) -> Result<CheckOutcome> {
    let batches = match read_raw(&paths.raw, store.config().batch_size) {
        Ok(batches) => batches,
        Err(GeoError::Parse(message)) => {
            return Ok(CheckOutcome::fatal(diagnostic("parse", FaultClass::Schema).with_message(
                format!("the file may be corrupted or not in the expected format: {message}"),
            )))
        }
        Err(e) => return Err(e),
    };
    let rows = write_snapshot(&paths.cleaned, &postal_schema(), &batches)?;
    store
        .load_view(POSTAL_VIEW, &paths.cleaned, postal_schema())
        .await?;
    debug!(rows, "Postal snapshot loaded");
    Ok(CheckOutcome::Pass)
}

/// Reports the first row of the postal view whose `rule.column` does not
/// match `rule.pattern`.
#[instrument(skip(store, rule), fields(column = rule.column))]
pub async fn pattern(store: &GeoStore, rule: &PatternRule) -> Result<CheckOutcome> {
    let view = SqlSecurity::escape_identifier(POSTAL_VIEW)?;
    let column = SqlSecurity::escape_identifier(rule.column)?;
    let escaped = SqlSecurity::validate_regex_pattern(&rule.pattern)?;
    let sql = format!(
        "SELECT _row AS row_no, insee_code, {column} AS value FROM {view} \
         WHERE NOT (COALESCE({column}, '') ~ '{escaped}') ORDER BY _row LIMIT 1"
    );

    let check = pattern_check_name(rule.column);
    let Some(row) = FirstRow::fetch(store, &sql).await? else {
        info!(check = %check, "Successfully checked {check} of {POSTAL_DESCRIPTION}");
        return Ok(CheckOutcome::Pass);
    };
    let mut message = format!("{} does not match {}", rule.column, rule.pattern);
    if rule.column != "insee_code" {
        if let Some(code) = row.text("insee_code")? {
            message.push_str(&format!(" (commune {code})"));
        }
    }
    let diagnostic = row
        .locate(diagnostic(&check, FaultClass::Structural))?
        .with_value(row.text("value")?.unwrap_or_default())
        .with_message(message);
    Ok(CheckOutcome::fatal(diagnostic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::postal::{postal_pattern_rules, POSTAL_FILE};
    use tempfile::TempDir;

    const RAW_HEADER: &str =
        "#Code_commune_INSEE;Nom_de_la_commune;Code_postal;Libellé_d_acheminement;Ligne_5";

    fn raw(dir: &TempDir, content: &str) -> SnapshotPaths {
        let paths = SnapshotPaths::under(dir.path(), POSTAL_FILE);
        std::fs::create_dir_all(paths.raw.parent().unwrap()).unwrap();
        std::fs::write(&paths.raw, content).unwrap();
        paths
    }

    #[tokio::test]
    async fn test_raw_file_becomes_comma_separated_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = GeoStore::new().unwrap();
        let paths = raw(
            &dir,
            &format!(
                "{RAW_HEADER}\n01001;L ABERGEMENT CLEMENCIAT;01400;L ABERGEMENT CLEMENCIAT;\n\
                 01002;L ABERGEMENT DE VAREY;01640;L ABERGEMENT DE VAREY;\n"
            ),
        );

        assert!(load_raw(&store, &paths).await.unwrap().is_pass());
        let cleaned = std::fs::read_to_string(&paths.cleaned).unwrap();
        assert!(cleaned.starts_with("insee_code,label,postal_code,delivery_label,associated_name\n"));
        assert!(cleaned.contains("01002,L ABERGEMENT DE VAREY,01640,L ABERGEMENT DE VAREY,\n"));

        for rule in postal_pattern_rules() {
            assert!(pattern(&store, &rule).await.unwrap().is_pass());
        }
    }

    #[tokio::test]
    async fn test_wrong_column_count_is_a_schema_fault() {
        let dir = TempDir::new().unwrap();
        let store = GeoStore::new().unwrap();
        let paths = raw(&dir, "insee_code,postal_code\n01001,01400\n");

        let CheckOutcome::Fatal(diagnostic) = load_raw(&store, &paths).await.unwrap() else {
            panic!("expected a fatal outcome");
        };
        assert_eq!(diagnostic.class, FaultClass::Schema);
        assert_eq!(diagnostic.check, "parse");
        assert_eq!(diagnostic.dataset, POSTAL_DESCRIPTION);
    }

    #[tokio::test]
    async fn test_short_postal_code_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = GeoStore::new().unwrap();
        let paths = raw(
            &dir,
            &format!("{RAW_HEADER}\n01001;A;01400;A;\n01002;B;1640;B;\n"),
        );
        load_raw(&store, &paths).await.unwrap();

        let rules = postal_pattern_rules();
        assert!(pattern(&store, &rules[0]).await.unwrap().is_pass());
        let CheckOutcome::Fatal(diagnostic) = pattern(&store, &rules[1]).await.unwrap() else {
            panic!("expected a fatal outcome");
        };
        assert_eq!(diagnostic.check, "postal_postal_code_format");
        assert_eq!(diagnostic.row, Some(2));
        assert_eq!(diagnostic.value.as_deref(), Some("1640"));
        assert!(diagnostic.message.contains("commune 01002"));
    }
}
