//! Corrective rewrites of a working snapshot.
//!
//! A correction never edits rows in place. It selects the whole view again,
//! replacing corrected fields with `CASE WHEN uri = ... THEN ... ELSE column END`
//! and filtering removed uris out, then hands the statement to
//! [`GeoStore::rewrite`](crate::core::GeoStore::rewrite).

use crate::core::{AppliedCorrection, CheckOutcome, GeoStore, ROW_COLUMN};
use crate::error::Result;
use crate::exceptions::{Correction, ExceptionRegistry};
use crate::model::Dataset;
use crate::security::SqlSecurity;
use std::collections::BTreeMap;
use tracing::info;

/// A `SELECT` reproducing a snapshot with some fields replaced and some rows
/// dropped.
#[derive(Debug, Default)]
pub struct Rewrite {
    assignments: BTreeMap<&'static str, Vec<(String, String)>>,
    removals: Vec<String>,
}

impl Rewrite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `column` with the SQL expression `value` on rows of `uri`.
    pub fn assign(&mut self, uri: &str, column: &'static str, value: String) -> &mut Self {
        self.assignments
            .entry(column)
            .or_default()
            .push((uri.to_string(), value));
        self
    }

    pub fn remove(&mut self, uri: &str) -> &mut Self {
        self.removals.push(uri.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.removals.is_empty()
    }

    /// Adds the field assignments implied by a correction.
    pub fn apply(&mut self, uri: &str, correction: &Correction) -> Result<&mut Self> {
        match correction {
            Correction::Uri(new_uri) => {
                self.assign(uri, "uri", SqlSecurity::quote_literal(new_uri)?);
            }
            Correction::Code(code) => {
                self.assign(uri, "insee_code", SqlSecurity::quote_literal(code)?);
            }
            Correction::QualifierCode(code) => {
                self.assign(uri, "article_code", SqlSecurity::quote_literal(code)?);
            }
            Correction::StartDate(date) => {
                self.assign(uri, "start_date", SqlSecurity::date_literal(Some(*date)));
                self.assign(uri, "start_date_count", "1".to_string());
            }
            Correction::EndDate(date) => {
                self.assign(uri, "end_date", SqlSecurity::date_literal(Some(*date)));
                self.assign(uri, "end_date_count", "1".to_string());
            }
            Correction::Dates {
                start_date,
                end_date,
            } => {
                self.assign_period(uri, *start_date, *end_date);
            }
            Correction::CodeAndPeriod {
                code,
                start_date,
                end_date,
            } => {
                self.assign(uri, "insee_code", SqlSecurity::quote_literal(code)?);
                self.assign_period(uri, *start_date, *end_date);
            }
            Correction::ParentUris(parents) => {
                self.assign(uri, "parent_uri", SqlSecurity::quote_literal(&parents.join("|"))?);
                self.assign(uri, "parent_uri_count", parents.len().to_string());
            }
        }
        Ok(self)
    }

    // Closing a period keeps the end event; reopening it drops the end event
    // so that end date and end event stay co-present.
    fn assign_period(
        &mut self,
        uri: &str,
        start: chrono::NaiveDate,
        end: Option<chrono::NaiveDate>,
    ) {
        self.assign(uri, "start_date", SqlSecurity::date_literal(Some(start)));
        self.assign(uri, "start_date_count", "1".to_string());
        self.assign(uri, "end_date", SqlSecurity::date_literal(end));
        self.assign(uri, "end_date_count", i64::from(end.is_some()).to_string());
        if end.is_none() {
            self.assign(uri, "end_event_uri", "CAST(NULL AS VARCHAR)".to_string());
        }
    }

    /// Renders the statement over `view`, keeping file order.
    pub fn to_sql(&self, view: &str, columns: &[&'static str]) -> Result<String> {
        let view = SqlSecurity::escape_identifier(view)?;
        let mut select = Vec::with_capacity(columns.len());
        for column in columns {
            match self.assignments.get(column) {
                Some(branches) => {
                    let mut case = String::from("CASE");
                    for (uri, value) in branches {
                        case.push_str(&format!(
                            " WHEN uri = {} THEN {value}",
                            SqlSecurity::quote_literal(uri)?
                        ));
                    }
                    case.push_str(&format!(" ELSE {column} END AS {column}"));
                    select.push(case);
                }
                None => select.push(column.to_string()),
            }
        }

        let filter = if self.removals.is_empty() {
            String::new()
        } else {
            let uris = self
                .removals
                .iter()
                .map(|u| SqlSecurity::quote_literal(u))
                .collect::<Result<Vec<_>>>()?;
            format!(" WHERE COALESCE(uri, '') NOT IN ({})", uris.join(", "))
        };

        Ok(format!(
            "SELECT {} FROM {view}{filter} ORDER BY {ROW_COLUMN}",
            select.join(", ")
        ))
    }

    /// Rewrites the working snapshot of `dataset` and reloads its view.
    pub async fn execute(&self, store: &GeoStore, dataset: &Dataset) -> Result<usize> {
        let descriptor = dataset.descriptor();
        let sql = self.to_sql(descriptor.view_name, &descriptor.column_names())?;
        store
            .rewrite(
                descriptor.view_name,
                &sql,
                &dataset.paths.cleaned,
                descriptor.schema(),
            )
            .await
    }
}

/// Applies every entry of `registry` to the working snapshot at once.
///
/// Called once a check found an offending row whose uri has an entry, so a
/// single rewrite also settles the other registered faults of the same kind.
pub async fn apply_registry(
    store: &GeoStore,
    dataset: &Dataset,
    registry: &ExceptionRegistry,
    check: &str,
    trigger_uri: &str,
) -> Result<CheckOutcome> {
    let mut rewrite = Rewrite::new();
    let mut replaced = Vec::new();
    for (uri, correction) in registry.replacements() {
        rewrite.apply(uri, correction)?;
        replaced.push(uri.to_string());
    }
    let removed: Vec<String> = registry.removals().map(str::to_string).collect();
    for uri in &removed {
        rewrite.remove(uri);
    }

    let rows = rewrite.execute(store, dataset).await?;
    info!(
        check,
        dataset = dataset.description(),
        trigger_uri,
        replaced = replaced.len(),
        removed = removed.len(),
        rows,
        "Correction applied"
    );

    Ok(CheckOutcome::Corrected(AppliedCorrection {
        kind: registry.kind(),
        trigger_uri: trigger_uri.to_string(),
        replaced,
        removed,
    }))
}
