//! Code overlap within a single dataset.

use super::local::settle;
use super::{CheckContext, CheckOutcome, FaultClass};
use crate::core::store::{date_values, int_values, string_values};
use crate::core::GeoStore;
use crate::error::Result;
use crate::exceptions::ExceptionRegistry;
use crate::temporal::{find_code_overlap, CodeOverlap, CodedPeriod, Interval};
use std::collections::HashMap;

/// Coded periods of `sql` along with the row number of each uri.
///
/// `sql` must return `uri`, `insee_code`, `start_date`, `end_date` and may
/// return `row_no`. Rows missing a uri, a code or a start date are skipped;
/// earlier checks of the catalog reject them.
pub(crate) async fn coded_periods(
    store: &GeoStore,
    sql: &str,
) -> Result<(Vec<CodedPeriod>, HashMap<String, u64>)> {
    let mut periods = Vec::new();
    let mut rows = HashMap::new();
    for batch in store.query(sql).await? {
        let uris = string_values(&batch, "uri")?;
        let codes = string_values(&batch, "insee_code")?;
        let starts = date_values(&batch, "start_date")?;
        let ends = date_values(&batch, "end_date")?;
        let row_numbers = if batch.column_by_name("row_no").is_some() {
            int_values(&batch, "row_no")?
        } else {
            vec![None; batch.num_rows()]
        };

        for i in 0..batch.num_rows() {
            let (Some(uri), Some(code), Some(start)) = (&uris[i], &codes[i], starts[i]) else {
                continue;
            };
            if let Some(row) = row_numbers[i].and_then(|r| u64::try_from(r).ok()) {
                rows.insert(uri.clone(), row);
            }
            periods.push(CodedPeriod {
                uri: uri.clone(),
                code: code.clone(),
                interval: Interval::new(start, ends[i]),
            });
        }
    }
    Ok((periods, rows))
}

pub(crate) fn describe(overlap: &CodeOverlap) -> String {
    format!(
        "code {} is used by {} {} and {} {} at the same time",
        overlap.code,
        overlap.first.uri,
        overlap.first.interval,
        overlap.second.uri,
        overlap.second.interval
    )
}

pub(super) async fn code_overlap(
    ctx: &CheckContext<'_>,
    registry: &ExceptionRegistry,
    allow_correction: bool,
) -> Result<CheckOutcome> {
    let view = crate::security::SqlSecurity::escape_identifier(ctx.view())?;
    let sql = format!(
        "SELECT _row AS row_no, uri, insee_code, start_date, end_date FROM {view} ORDER BY _row"
    );
    let (periods, rows) = coded_periods(ctx.store, &sql).await?;

    let Some(overlap) = find_code_overlap(&periods) else {
        return Ok(CheckOutcome::Pass);
    };

    let mut diagnostic = ctx
        .diagnostic("code_overlap", FaultClass::Correctable)
        .with_uri(overlap.first.uri.clone())
        .with_value(format!("{} / {}", overlap.first.uri, overlap.second.uri))
        .with_message(describe(&overlap));
    if let Some(row) = rows.get(&overlap.first.uri) {
        diagnostic = diagnostic.with_row(*row);
    }
    let candidates = [overlap.first.uri.clone(), overlap.second.uri.clone()];
    settle(ctx, Some(registry), allow_correction, &candidates, diagnostic).await
}
