//! Row-level checks answered by a single query returning the first offending
//! row in file order.

use super::rewrite::apply_registry;
use super::{CheckContext, CheckOutcome, Diagnostic, FaultClass};
use crate::core::store::{date_values, int_values, string_values};
use crate::core::GeoStore;
use crate::error::{GeoError, Result};
use crate::exceptions::ExceptionRegistry;
use crate::model::DateWindow;
use crate::security::SqlSecurity;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use tracing::debug;

/// The first row of a query result.
pub(super) struct FirstRow(RecordBatch);

impl FirstRow {
    pub(super) async fn fetch(store: &GeoStore, sql: &str) -> Result<Option<Self>> {
        let batches = store.query(sql).await?;
        Ok(batches
            .into_iter()
            .find(|batch| batch.num_rows() > 0)
            .map(|batch| FirstRow(batch.slice(0, 1))))
    }

    pub(super) fn text(&self, column: &str) -> Result<Option<String>> {
        Ok(string_values(&self.0, column)?.into_iter().next().flatten())
    }

    pub(super) fn date(&self, column: &str) -> Result<Option<NaiveDate>> {
        Ok(date_values(&self.0, column)?.into_iter().next().flatten())
    }

    pub(super) fn int(&self, column: &str) -> Result<Option<i64>> {
        Ok(int_values(&self.0, column)?.into_iter().next().flatten())
    }

    /// Locates the row in a diagnostic, from the `row_no` and, when the
    /// query selects one, `uri` columns.
    pub(super) fn locate(&self, mut diagnostic: Diagnostic) -> Result<Diagnostic> {
        if let Some(row) = self.int("row_no")?.and_then(|r| u64::try_from(r).ok()) {
            diagnostic = diagnostic.with_row(row);
        }
        if self.0.column_by_name("uri").is_none() {
            return Ok(diagnostic);
        }
        if let Some(uri) = self.text("uri")? {
            diagnostic = diagnostic.with_uri(uri);
        }
        Ok(diagnostic)
    }
}

/// Corrects the fault when one of `candidates` has an entry in `registry`
/// and corrections are allowed; reports `diagnostic` otherwise.
pub(super) async fn settle(
    ctx: &CheckContext<'_>,
    registry: Option<&ExceptionRegistry>,
    allow_correction: bool,
    candidates: &[String],
    diagnostic: Diagnostic,
) -> Result<CheckOutcome> {
    if let (Some(registry), true) = (registry, allow_correction) {
        if let Some(uri) = candidates.iter().find(|uri| registry.contains(uri)) {
            return apply_registry(ctx.store, ctx.dataset, registry, &diagnostic.check, uri).await;
        }
    }
    Ok(CheckOutcome::fatal(diagnostic))
}

/// Correctable when the check has at least one exception to offer.
fn correctable_or(registry: Option<&ExceptionRegistry>, otherwise: FaultClass) -> FaultClass {
    if registry.is_some_and(|r| !r.is_empty()) {
        FaultClass::Correctable
    } else {
        otherwise
    }
}

/// Loads the working snapshot into the dataset view.
pub(super) async fn parse(ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
    let descriptor = ctx.dataset.descriptor();
    let loaded = ctx
        .store
        .load_view(
            descriptor.view_name,
            &ctx.dataset.paths.cleaned,
            descriptor.schema(),
        )
        .await;
    match loaded {
        Ok(rows) => {
            debug!(rows, view = descriptor.view_name, "Working snapshot loaded");
            Ok(CheckOutcome::Pass)
        }
        Err(GeoError::Parse(message)) => Ok(CheckOutcome::fatal(
            ctx.diagnostic("parse", FaultClass::Schema)
                .with_message(format!("the file may be corrupted or not in the expected format: {message}")),
        )),
        Err(e) => Err(e),
    }
}

pub(super) async fn pattern(
    ctx: &CheckContext<'_>,
    check: &str,
    column: &str,
    pattern: &str,
    registry: Option<&ExceptionRegistry>,
    allow_correction: bool,
) -> Result<CheckOutcome> {
    let view = SqlSecurity::escape_identifier(ctx.view())?;
    SqlSecurity::validate_identifier(column)?;
    let escaped = SqlSecurity::validate_regex_pattern(pattern)?;
    let sql = format!(
        "SELECT _row AS row_no, uri, {column} AS value FROM {view} \
         WHERE NOT (COALESCE({column}, '') ~ '{escaped}') ORDER BY _row LIMIT 1"
    );

    let Some(row) = FirstRow::fetch(ctx.store, &sql).await? else {
        return Ok(CheckOutcome::Pass);
    };
    let value = row.text("value")?;
    let diagnostic = row
        .locate(ctx.diagnostic(check, correctable_or(registry, FaultClass::Structural)))?
        .with_value(value.unwrap_or_default())
        .with_message(format!("{column} does not match {pattern}"));
    let uri = row.text("uri")?;
    settle(ctx, registry, allow_correction, uri.as_slice(), diagnostic).await
}

pub(super) async fn uri_uniqueness(
    ctx: &CheckContext<'_>,
    registry: &ExceptionRegistry,
    allow_correction: bool,
) -> Result<CheckOutcome> {
    let view = SqlSecurity::escape_identifier(ctx.view())?;
    let sql = format!(
        "SELECT MIN(_row) AS row_no, uri, COUNT(*) AS occurrences FROM {view} \
         GROUP BY uri HAVING COUNT(*) > 1 ORDER BY row_no LIMIT 1"
    );

    let Some(row) = FirstRow::fetch(ctx.store, &sql).await? else {
        return Ok(CheckOutcome::Pass);
    };
    let occurrences = row.int("occurrences")?.unwrap_or_default();
    let diagnostic = row
        .locate(ctx.diagnostic("uri_uniqueness", FaultClass::Correctable))?
        .with_value(occurrences.to_string())
        .with_message(format!("uri appears {occurrences} times"));
    let uri = row.text("uri")?;
    settle(ctx, Some(registry), allow_correction, uri.as_slice(), diagnostic).await
}

pub(super) async fn start_date(
    ctx: &CheckContext<'_>,
    window: &DateWindow,
    registry: &ExceptionRegistry,
    allow_correction: bool,
) -> Result<CheckOutcome> {
    let view = SqlSecurity::escape_identifier(ctx.view())?;
    let min = SqlSecurity::date_literal(Some(window.min));
    let max = SqlSecurity::date_literal(Some(window.max));
    let sql = format!(
        "SELECT _row AS row_no, uri, start_date, start_date_count FROM {view} \
         WHERE start_date IS NULL OR start_date < {min} OR start_date > {max} \
         OR COALESCE(start_date_count, 1) > 1 ORDER BY _row LIMIT 1"
    );

    let Some(row) = FirstRow::fetch(ctx.store, &sql).await? else {
        return Ok(CheckOutcome::Pass);
    };
    let date = row.date("start_date")?;
    let count = row.int("start_date_count")?.unwrap_or(1);
    let message = match date {
        None => "start date is empty".to_string(),
        Some(d) if d < window.min => {
            format!("start date {d} is older than the minimum date {}", window.min)
        }
        Some(d) if d > window.max => {
            format!("start date {d} is newer than the maximum date {}", window.max)
        }
        Some(_) => format!("start date is duplicated ({count} values extracted)"),
    };
    let mut diagnostic = row
        .locate(ctx.diagnostic("start_date", FaultClass::Correctable))?
        .with_message(message);
    if let Some(d) = date {
        diagnostic = diagnostic.with_value(d.to_string());
    }
    let uri = row.text("uri")?;
    settle(ctx, Some(registry), allow_correction, uri.as_slice(), diagnostic).await
}

pub(super) async fn end_date(
    ctx: &CheckContext<'_>,
    window: &DateWindow,
    registry: &ExceptionRegistry,
    allow_correction: bool,
) -> Result<CheckOutcome> {
    let view = SqlSecurity::escape_identifier(ctx.view())?;
    let min = SqlSecurity::date_literal(Some(window.min));
    let max = SqlSecurity::date_literal(Some(window.max));
    let sql = format!(
        "SELECT _row AS row_no, uri, end_date, end_date_count FROM {view} \
         WHERE end_date < {min} OR end_date > {max} \
         OR COALESCE(end_date_count, 0) > 1 ORDER BY _row LIMIT 1"
    );

    let Some(row) = FirstRow::fetch(ctx.store, &sql).await? else {
        return Ok(CheckOutcome::Pass);
    };
    let date = row.date("end_date")?;
    let count = row.int("end_date_count")?.unwrap_or_default();
    let message = match date {
        Some(d) if d < window.min => {
            format!("end date {d} is older than the minimum date {}", window.min)
        }
        Some(d) if d > window.max => {
            format!("end date {d} is newer than the maximum date {}", window.max)
        }
        _ => format!("end date is duplicated ({count} values extracted)"),
    };
    let mut diagnostic = row
        .locate(ctx.diagnostic("end_date", FaultClass::Correctable))?
        .with_message(message);
    if let Some(d) = date {
        diagnostic = diagnostic.with_value(d.to_string());
    }
    let uri = row.text("uri")?;
    settle(ctx, Some(registry), allow_correction, uri.as_slice(), diagnostic).await
}

pub(super) async fn events_distinct(ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
    let view = SqlSecurity::escape_identifier(ctx.view())?;
    let sql = format!(
        "SELECT _row AS row_no, uri, start_event_uri FROM {view} \
         WHERE start_event_uri = end_event_uri ORDER BY _row LIMIT 1"
    );

    let Some(row) = FirstRow::fetch(ctx.store, &sql).await? else {
        return Ok(CheckOutcome::Pass);
    };
    let diagnostic = row
        .locate(ctx.diagnostic("events_distinct", FaultClass::Structural))?
        .with_value(row.text("start_event_uri")?.unwrap_or_default())
        .with_message("start and end events are identical");
    Ok(CheckOutcome::fatal(diagnostic))
}

pub(super) async fn end_event_copresence(ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
    let view = SqlSecurity::escape_identifier(ctx.view())?;
    let sql = format!(
        "SELECT _row AS row_no, uri, end_event_uri, end_date FROM {view} \
         WHERE (end_event_uri IS NULL AND end_date IS NOT NULL) \
         OR (end_event_uri IS NOT NULL AND end_date IS NULL) ORDER BY _row LIMIT 1"
    );

    let Some(row) = FirstRow::fetch(ctx.store, &sql).await? else {
        return Ok(CheckOutcome::Pass);
    };
    let diagnostic = row.locate(ctx.diagnostic("end_event_consistency", FaultClass::Structural))?;
    let diagnostic = match (row.text("end_event_uri")?, row.date("end_date")?) {
        (Some(event), _) => diagnostic
            .with_value(event)
            .with_message("end event is set but end date is missing"),
        (None, Some(date)) => diagnostic
            .with_value(date.to_string())
            .with_message("end date is set but end event is missing"),
        (None, None) => diagnostic.with_message("end event and end date disagree"),
    };
    Ok(CheckOutcome::fatal(diagnostic))
}

pub(super) async fn date_consistency(
    ctx: &CheckContext<'_>,
    registry: &ExceptionRegistry,
    allow_correction: bool,
) -> Result<CheckOutcome> {
    let view = SqlSecurity::escape_identifier(ctx.view())?;
    let sql = format!(
        "SELECT _row AS row_no, uri, start_date, end_date FROM {view} \
         WHERE end_date < start_date ORDER BY _row LIMIT 1"
    );

    let Some(row) = FirstRow::fetch(ctx.store, &sql).await? else {
        return Ok(CheckOutcome::Pass);
    };
    let start = row.date("start_date")?.map(|d| d.to_string()).unwrap_or_default();
    let end = row.date("end_date")?.map(|d| d.to_string()).unwrap_or_default();
    let diagnostic = row
        .locate(ctx.diagnostic("date_consistency", FaultClass::Correctable))?
        .with_value(format!("{start} > {end}"))
        .with_message("end date is before start date");
    let uri = row.text("uri")?;
    settle(ctx, Some(registry), allow_correction, uri.as_slice(), diagnostic).await
}

pub(super) async fn parent_unicity(
    ctx: &CheckContext<'_>,
    registry: &ExceptionRegistry,
    allow_correction: bool,
) -> Result<CheckOutcome> {
    let view = SqlSecurity::escape_identifier(ctx.view())?;
    let sql = format!(
        "SELECT _row AS row_no, uri, parent_uri, parent_uri_count FROM {view} \
         WHERE COALESCE(parent_uri_count, 0) <> 1 ORDER BY _row LIMIT 1"
    );

    let Some(row) = FirstRow::fetch(ctx.store, &sql).await? else {
        return Ok(CheckOutcome::Pass);
    };
    let count = row.int("parent_uri_count")?.unwrap_or_default();
    let diagnostic = row
        .locate(ctx.diagnostic("parent_unicity", FaultClass::Correctable))?
        .with_value(row.text("parent_uri")?.unwrap_or_default())
        .with_message(format!("expected exactly one parent, found {count}"));
    let uri = row.text("uri")?;
    settle(ctx, Some(registry), allow_correction, uri.as_slice(), diagnostic).await
}
