//! Consistency checks across every cleaned dataset of a collection.
//!
//! Both checks are fatal on failure: no exception applies across datasets.

use super::overlap::{coded_periods, describe};
use super::{CheckOutcome, Diagnostic, FaultClass};
use crate::core::store::{date_values, string_values};
use crate::core::GeoStore;
use crate::error::{GeoError, Result};
use crate::model::Dataset;
use crate::security::SqlSecurity;
use crate::temporal::find_code_overlap;
use tracing::{info, instrument};

const SCOPE: &str = "all datasets";

fn cleaned_views(datasets: &[Dataset]) -> Result<Vec<String>> {
    if datasets.is_empty() {
        return Err(GeoError::Configuration(
            "global checks need at least one dataset".to_string(),
        ));
    }
    datasets
        .iter()
        .map(|dataset| {
            if !dataset.is_cleaned() {
                return Err(GeoError::Internal(format!(
                    "{} is {} and cannot take part in global checks",
                    dataset.description(),
                    dataset.state()
                )));
            }
            SqlSecurity::escape_identifier(dataset.view_name())
        })
        .collect()
}

/// Every event uri used as a start or end event maps to a single date.
#[instrument(skip_all, fields(datasets = datasets.len()))]
pub async fn check_event_consistency(store: &GeoStore, datasets: &[Dataset]) -> Result<CheckOutcome> {
    let events = cleaned_views(datasets)?
        .iter()
        .map(|view| {
            format!(
                "SELECT start_event_uri AS event_uri, start_date AS event_date FROM {view} \
                 UNION ALL SELECT end_event_uri AS event_uri, end_date AS event_date FROM {view} \
                 WHERE COALESCE(end_event_uri, '') <> ''"
            )
        })
        .collect::<Vec<_>>()
        .join(" UNION ALL ");

    let sql = format!(
        "SELECT event_uri FROM ({events}) AS events GROUP BY event_uri \
         HAVING COUNT(DISTINCT event_date) > 1 ORDER BY event_uri LIMIT 1"
    );
    let conflicting = store
        .query(&sql)
        .await?
        .iter()
        .map(|batch| string_values(batch, "event_uri"))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .flatten()
        .next();

    let Some(event) = conflicting else {
        info!("Successfully checked that each event is linked to a single date");
        return Ok(CheckOutcome::Pass);
    };

    let sql = format!(
        "SELECT DISTINCT event_date FROM ({events}) AS events \
         WHERE event_uri = {} AND event_date IS NOT NULL ORDER BY event_date",
        SqlSecurity::quote_literal(&event)?
    );
    let mut dates = Vec::new();
    for batch in store.query(&sql).await? {
        dates.extend(date_values(&batch, "event_date")?.into_iter().flatten());
    }
    dates.sort();
    let dates = dates.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");

    Ok(CheckOutcome::fatal(
        Diagnostic::new("event_consistency", SCOPE, FaultClass::GlobalConsistency)
            .with_uri(event)
            .with_value(dates.clone())
            .with_message(format!("event has multiple dates: {dates}")),
    ))
}

/// No two records of any class share a code over intersecting periods.
#[instrument(skip_all, fields(datasets = datasets.len()))]
pub async fn check_global_code_overlap(
    store: &GeoStore,
    datasets: &[Dataset],
) -> Result<CheckOutcome> {
    let sql = cleaned_views(datasets)?
        .iter()
        .map(|view| format!("SELECT uri, insee_code, start_date, end_date FROM {view}"))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");
    let (periods, _) = coded_periods(store, &sql).await?;

    match find_code_overlap(&periods) {
        None => {
            info!("Successfully checked code overlap across all datasets");
            Ok(CheckOutcome::Pass)
        }
        Some(overlap) => Ok(CheckOutcome::fatal(
            Diagnostic::new("global_code_overlap", SCOPE, FaultClass::GlobalConsistency)
                .with_uri(overlap.first.uri.clone())
                .with_value(format!("{} / {}", overlap.first.uri, overlap.second.uri))
                .with_message(describe(&overlap)),
        )),
    }
}
