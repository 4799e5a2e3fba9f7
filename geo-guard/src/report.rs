//! Summary of a collection run.

use crate::error::Result;
use crate::replay::ReplayReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Outcome of a successful collection: one [`ReplayReport`] per dataset in
/// collection order, the global checks that passed and the postal base.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub timestamp: DateTime<Utc>,
    pub datasets: Vec<ReplayReport>,
    pub global_checks: Vec<String>,
    pub postal: Option<PostalReport>,
    pub duration_ms: u64,
}

/// The postal code base once amended and checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostalReport {
    pub rows: usize,
    pub added: usize,
    pub removed: usize,
    pub checks: Vec<String>,
}

impl CollectionReport {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            datasets: Vec::new(),
            global_checks: Vec::new(),
            postal: None,
            duration_ms: 0,
        }
    }

    pub fn total_invocations(&self) -> usize {
        self.datasets.iter().map(|d| d.invocations).sum()
    }

    pub fn total_corrections(&self) -> usize {
        self.datasets.iter().map(|d| d.corrections.len()).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for CollectionReport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CollectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Collection completed at {}", self.timestamp.to_rfc3339())?;
        writeln!(
            f,
            "   Datasets: {}, check invocations: {}, corrections: {}, time: {}ms",
            self.datasets.len(),
            self.total_invocations(),
            self.total_corrections(),
            self.duration_ms
        )?;
        for dataset in &self.datasets {
            writeln!(
                f,
                "   - {}: {} checks, {} invocations, {} corrections ({}ms)",
                dataset.dataset,
                dataset.steps,
                dataset.invocations,
                dataset.corrections.len(),
                dataset.duration_ms
            )?;
            for record in &dataset.corrections {
                writeln!(
                    f,
                    "       step {} {}: {} replaced, {} removed (triggered by {})",
                    record.step,
                    record.check,
                    record.correction.replaced.len(),
                    record.correction.removed.len(),
                    record.correction.trigger_uri
                )?;
            }
        }
        if !self.global_checks.is_empty() {
            writeln!(f, "   Global checks passed: {}", self.global_checks.join(", "))?;
        }
        if let Some(postal) = &self.postal {
            writeln!(
                f,
                "   Postal base: {} rows ({} added, {} communes replaced), checks passed: {}",
                postal.rows,
                postal.added,
                postal.removed,
                postal.checks.join(", ")
            )?;
        }
        Ok(())
    }
}
