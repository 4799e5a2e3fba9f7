//! Fixed-point execution of a check catalog.
//!
//! A correction rewrites the working snapshot, which may invalidate checks
//! that already passed. The controller therefore restarts from the first
//! step after every correction made on a step's first visit, and replays the
//! steps it had already cleared. On replay a step must pass, possibly after a
//! correction; a fault that survives with corrections disabled means the
//! registries fight each other, and the run stops.
//!
//! ```text
//! first visit (last_step < current_step)
//!     Pass      -> last_step = current_step, current_step += 1
//!     Corrected -> last_step = current_step, current_step = 0
//!     Fatal     -> abort
//! replay (last_step >= current_step)
//!     Pass                -> current_step += 1
//!     Corrected | Fatal   -> rerun without corrections; Pass advances, anything else aborts
//! ```

use crate::checks::{Check, CheckContext, CheckOutcome};
use crate::core::{AppliedCorrection, GeoStore};
use crate::error::{GeoError, Result};
use crate::logging::{truncate_field, LogConfig};
use crate::model::{Dataset, DatasetState, EntityClass};
use crate::{log_check, perf_debug};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// One step the controller can drive.
///
/// Implemented by [`Check`]; tests implement it with scripted doubles.
#[async_trait]
pub trait ReplayStep: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &CheckContext<'_>, allow_correction: bool) -> Result<CheckOutcome>;
}

#[async_trait]
impl ReplayStep for Check<'_> {
    fn name(&self) -> &str {
        Check::name(self)
    }

    async fn run(&self, ctx: &CheckContext<'_>, allow_correction: bool) -> Result<CheckOutcome> {
        Check::run(self, ctx, allow_correction).await
    }
}

/// A correction applied while replaying a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionRecord {
    /// 1-based position of the step in the catalog
    pub step: usize,
    pub check: String,
    pub correction: AppliedCorrection,
}

/// Summary of a dataset driven to the cleaned state.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub dataset: String,
    pub class: EntityClass,
    /// Number of steps in the catalog
    pub steps: usize,
    /// Step visits, replays included
    pub steps_executed: usize,
    /// Check invocations, verification reruns included
    pub invocations: usize,
    pub corrections: Vec<CorrectionRecord>,
    pub duration_ms: u64,
}

impl ReplayReport {
    fn new(dataset: &Dataset, steps: usize) -> Self {
        Self {
            dataset: dataset.description().to_string(),
            class: dataset.class,
            steps,
            steps_executed: 0,
            invocations: 0,
            corrections: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty()
    }
}

/// Drives a catalog to unanimous success.
#[derive(Debug, Clone, Default)]
pub struct ReplayController {
    log: LogConfig,
}

impl ReplayController {
    pub fn new(log: LogConfig) -> Self {
        Self { log }
    }

    /// Runs `steps` against `dataset` until every step passes in order.
    ///
    /// On success the dataset is moved to [`DatasetState::Cleaned`]. A fatal
    /// outcome aborts with [`GeoError::CheckFailed`]; a step that cannot pass
    /// again on replay aborts with [`GeoError::ControlFlowInvariant`].
    #[instrument(skip_all, fields(dataset = dataset.description(), steps = steps.len()))]
    pub async fn replay<S: ReplayStep>(
        &self,
        steps: &[S],
        store: &GeoStore,
        dataset: &mut Dataset,
    ) -> Result<ReplayReport> {
        let started = Instant::now();
        let mut report = ReplayReport::new(dataset, steps.len());
        {
            let ctx = CheckContext::new(store, dataset);
            self.drive(steps, &ctx, &mut report).await?;
        }
        dataset.advance(DatasetState::Cleaned);
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            dataset = %report.dataset,
            steps_executed = report.steps_executed,
            corrections = report.corrections.len(),
            duration_ms = report.duration_ms,
            "Dataset cleaned"
        );
        Ok(report)
    }

    async fn drive<S: ReplayStep>(
        &self,
        steps: &[S],
        ctx: &CheckContext<'_>,
        report: &mut ReplayReport,
    ) -> Result<()> {
        let mut current_step = 0usize;
        let mut last_step: Option<usize> = None;

        while let Some(step) = steps.get(current_step) {
            let replaying = last_step.is_some_and(|last| last >= current_step);
            log_check!(
                self.log,
                step = current_step + 1,
                check = step.name(),
                replaying,
                "Running check"
            );
            report.steps_executed += 1;
            report.invocations += 1;
            let outcome = step.run(ctx, true).await?;

            if !replaying {
                match outcome {
                    CheckOutcome::Pass => {
                        last_step = Some(current_step);
                        current_step += 1;
                    }
                    CheckOutcome::Corrected(correction) => {
                        self.record(report, current_step, step.name(), correction);
                        last_step = Some(current_step);
                        current_step = 0;
                    }
                    CheckOutcome::Fatal(diagnostic) => {
                        return Err(GeoError::CheckFailed(diagnostic));
                    }
                }
                continue;
            }

            match outcome {
                CheckOutcome::Pass => {}
                CheckOutcome::Corrected(correction) => {
                    self.record(report, current_step, step.name(), correction);
                    self.verify(step, ctx, current_step, report).await?;
                }
                CheckOutcome::Fatal(diagnostic) => {
                    perf_debug!(self.log, %diagnostic, "Replayed step failed with corrections enabled");
                    self.verify(step, ctx, current_step, report).await?;
                }
            }
            current_step += 1;
        }
        Ok(())
    }

    /// Reruns a replayed step with corrections disabled; it must pass.
    async fn verify<S: ReplayStep>(
        &self,
        step: &S,
        ctx: &CheckContext<'_>,
        index: usize,
        report: &mut ReplayReport,
    ) -> Result<()> {
        report.invocations += 1;
        match step.run(ctx, false).await? {
            CheckOutcome::Pass => Ok(()),
            other => {
                let message = match other {
                    CheckOutcome::Fatal(diagnostic) => diagnostic.to_string(),
                    _ => "the step keeps rewriting the snapshot".to_string(),
                };
                warn!(step = index + 1, check = step.name(), "Replayed step no longer passes");
                Err(GeoError::control_flow(
                    index + 1,
                    step.name(),
                    ctx.dataset.description(),
                    message,
                ))
            }
        }
    }

    fn record(
        &self,
        report: &mut ReplayReport,
        index: usize,
        check: &str,
        correction: AppliedCorrection,
    ) {
        if self.log.log_corrections {
            info!(
                step = index + 1,
                check,
                trigger_uri = %truncate_field(&correction.trigger_uri, self.log.max_field_length),
                replaced = ?correction.replaced,
                removed = ?correction.removed,
                "Exception applied, restarting checks"
            );
        }
        report.corrections.push(CorrectionRecord {
            step: index + 1,
            check: check.to_string(),
            correction,
        });
    }
}
