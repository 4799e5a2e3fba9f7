//! Parent checks of child classes.
//!
//! Children and parents are small enough to be fetched and compared in
//! memory. Parent rows are looked up across every candidate parent view; a
//! parent uri matching several rows contributes all their periods.

use super::{CheckContext, CheckOutcome, Diagnostic, FaultClass};
use crate::core::store::{date_values, int_values, string_values};
use crate::error::{GeoError, Result};
use crate::model::{split_parent_uris, EntityClass};
use crate::security::SqlSecurity;
use crate::temporal::{covers, find_gap, find_pairwise_overlap, Interval};
use std::collections::HashMap;

struct Child {
    row: Option<u64>,
    uri: Option<String>,
    parents: Vec<String>,
    interval: Option<Interval>,
}

struct Family {
    children: Vec<Child>,
    parents: HashMap<String, Vec<Interval>>,
}

impl Family {
    async fn load(ctx: &CheckContext<'_>, parent_classes: &[EntityClass]) -> Result<Self> {
        let view = SqlSecurity::escape_identifier(ctx.view())?;
        let sql = format!(
            "SELECT _row AS row_no, uri, parent_uri, start_date, end_date FROM {view} ORDER BY _row"
        );
        let mut children = Vec::new();
        for batch in ctx.store.query(&sql).await? {
            let rows = int_values(&batch, "row_no")?;
            let uris = string_values(&batch, "uri")?;
            let parent_lists = string_values(&batch, "parent_uri")?;
            let starts = date_values(&batch, "start_date")?;
            let ends = date_values(&batch, "end_date")?;
            for i in 0..batch.num_rows() {
                children.push(Child {
                    row: rows[i].and_then(|r| u64::try_from(r).ok()),
                    uri: uris[i].clone(),
                    parents: parent_lists[i]
                        .as_deref()
                        .map(split_parent_uris)
                        .unwrap_or_default(),
                    interval: starts[i].map(|start| Interval::new(start, ends[i])),
                });
            }
        }

        let mut selects = Vec::with_capacity(parent_classes.len());
        for class in parent_classes {
            let name = class.descriptor().view_name;
            if !ctx.store.has_view(name)? {
                return Err(GeoError::Internal(format!(
                    "parent view '{name}' of {} is not loaded",
                    ctx.dataset.description()
                )));
            }
            selects.push(format!(
                "SELECT uri, start_date, end_date FROM {}",
                SqlSecurity::escape_identifier(name)?
            ));
        }

        let mut parents: HashMap<String, Vec<Interval>> = HashMap::new();
        if !selects.is_empty() {
            for batch in ctx.store.query(&selects.join(" UNION ALL ")).await? {
                let uris = string_values(&batch, "uri")?;
                let starts = date_values(&batch, "start_date")?;
                let ends = date_values(&batch, "end_date")?;
                for i in 0..batch.num_rows() {
                    if let (Some(uri), Some(start)) = (&uris[i], starts[i]) {
                        parents
                            .entry(uri.clone())
                            .or_default()
                            .push(Interval::new(start, ends[i]));
                    }
                }
            }
        }

        Ok(Self { children, parents })
    }

    /// Periods of the declared parents of `child`, tagged with the parent uri.
    fn periods_of(&self, child: &Child) -> Vec<(String, Interval)> {
        child
            .parents
            .iter()
            .flat_map(|uri| {
                self.parents
                    .get(uri)
                    .into_iter()
                    .flatten()
                    .map(move |interval| (uri.clone(), *interval))
            })
            .collect()
    }
}

fn locate(diagnostic: Diagnostic, child: &Child) -> Diagnostic {
    let diagnostic = match child.row {
        Some(row) => diagnostic.with_row(row),
        None => diagnostic,
    };
    match &child.uri {
        Some(uri) => diagnostic.with_uri(uri.clone()),
        None => diagnostic,
    }
}

pub(super) async fn existence(
    ctx: &CheckContext<'_>,
    parent_classes: &[EntityClass],
) -> Result<CheckOutcome> {
    let family = Family::load(ctx, parent_classes).await?;
    for child in &family.children {
        if let Some(missing) = child.parents.iter().find(|p| !family.parents.contains_key(*p)) {
            let diagnostic = locate(ctx.diagnostic("parent_existence", FaultClass::Hierarchy), child)
                .with_value(missing.clone())
                .with_message("parent uri does not exist in any parent dataset");
            return Ok(CheckOutcome::fatal(diagnostic));
        }
    }
    Ok(CheckOutcome::Pass)
}

pub(super) async fn period_overlap(
    ctx: &CheckContext<'_>,
    parent_classes: &[EntityClass],
) -> Result<CheckOutcome> {
    let family = Family::load(ctx, parent_classes).await?;
    for child in &family.children {
        let periods = family.periods_of(child);
        let intervals: Vec<Interval> = periods.iter().map(|(_, i)| *i).collect();
        if let Some((a, b)) = find_pairwise_overlap(&intervals) {
            let diagnostic =
                locate(ctx.diagnostic("parent_period_overlap", FaultClass::Hierarchy), child)
                    .with_value(format!("{} / {}", periods[a].0, periods[b].0))
                    .with_message(format!(
                        "parent periods {} and {} overlap",
                        periods[a].1, periods[b].1
                    ));
            return Ok(CheckOutcome::fatal(diagnostic));
        }
    }
    Ok(CheckOutcome::Pass)
}

pub(super) async fn period_gaps(
    ctx: &CheckContext<'_>,
    parent_classes: &[EntityClass],
) -> Result<CheckOutcome> {
    let family = Family::load(ctx, parent_classes).await?;
    for child in &family.children {
        let intervals: Vec<Interval> = family.periods_of(child).into_iter().map(|(_, i)| i).collect();
        if let Some((from, to)) = find_gap(&intervals) {
            let diagnostic =
                locate(ctx.diagnostic("parent_period_gaps", FaultClass::Hierarchy), child)
                    .with_value(child.parents.join("|"))
                    .with_message(format!("parents leave {from} to {to} uncovered"));
            return Ok(CheckOutcome::fatal(diagnostic));
        }
    }
    Ok(CheckOutcome::Pass)
}

pub(super) async fn period_containment(
    ctx: &CheckContext<'_>,
    parent_classes: &[EntityClass],
) -> Result<CheckOutcome> {
    let family = Family::load(ctx, parent_classes).await?;
    for child in &family.children {
        let Some(own) = child.interval else {
            continue;
        };
        let intervals: Vec<Interval> = family.periods_of(child).into_iter().map(|(_, i)| i).collect();
        if !covers(&intervals, &own) {
            let diagnostic =
                locate(ctx.diagnostic("parent_period_containment", FaultClass::Hierarchy), child)
                    .with_value(own.to_string())
                    .with_message(format!(
                        "period is not covered by its parents {}",
                        intervals
                            .iter()
                            .map(Interval::to_string)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
            return Ok(CheckOutcome::fatal(diagnostic));
        }
    }
    Ok(CheckOutcome::Pass)
}
