//! The check catalog.
//!
//! A [`Check`] is a stateless predicate over the working snapshot of one
//! dataset, optionally paired with a registry of pre-approved corrections.
//! Running it yields a [`CheckOutcome`]: the snapshot passed, it was
//! corrected (and rewritten), or it holds a fault nothing can fix. The
//! ordered list of checks for an entity class comes from [`catalog_for`].
//!
//! ```rust,no_run
//! use geo_guard::checks::{catalog_for, CheckContext};
//! use geo_guard::core::GeoStore;
//! use geo_guard::exceptions::RegistrySet;
//! use geo_guard::model::{Dataset, DateWindow, EntityClass, SnapshotPaths};
//!
//! # async fn example() -> geo_guard::error::Result<()> {
//! let store = GeoStore::new()?;
//! let dataset = Dataset::new(
//!     EntityClass::District,
//!     SnapshotPaths::under("download/insee", &EntityClass::District.file_name()),
//! );
//! let registries = RegistrySet::new();
//! let ctx = CheckContext::new(&store, &dataset);
//!
//! for check in catalog_for(EntityClass::District, &registries, DateWindow::until_today()) {
//!     let outcome = check.run(&ctx, true).await?;
//!     println!("{}: {outcome:?}", check.name());
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod global;
mod hierarchy;
mod local;
mod overlap;
pub mod postal;
pub mod rewrite;

pub use crate::core::{CheckOutcome, Diagnostic, FaultClass};
pub use catalog::catalog_for;
pub use global::{check_event_consistency, check_global_code_overlap};

use crate::core::GeoStore;
use crate::error::Result;
use crate::exceptions::ExceptionRegistry;
use crate::model::{Dataset, DateWindow, EntityClass};
use tracing::{info, instrument};

/// What a check runs against.
#[derive(Clone, Copy)]
pub struct CheckContext<'a> {
    pub store: &'a GeoStore,
    pub dataset: &'a Dataset,
}

impl<'a> CheckContext<'a> {
    pub fn new(store: &'a GeoStore, dataset: &'a Dataset) -> Self {
        Self { store, dataset }
    }

    pub(crate) fn view(&self) -> &'static str {
        self.dataset.view_name()
    }

    pub(crate) fn diagnostic(&self, check: &str, class: FaultClass) -> Diagnostic {
        Diagnostic::new(check, self.dataset.description(), class)
    }
}

/// One entry of the check catalog.
///
/// Checks borrow their exception registry for the lifetime `'r`; they never
/// modify it.
#[derive(Debug, Clone)]
pub enum Check<'r> {
    /// Loads the working snapshot with the declared schema.
    Parse,
    /// Every value of `column` matches `pattern`. Null counts as empty.
    Pattern {
        name: String,
        column: &'static str,
        pattern: String,
        registry: Option<&'r ExceptionRegistry>,
    },
    UriUniqueness {
        registry: &'r ExceptionRegistry,
    },
    StartDate {
        window: DateWindow,
        registry: &'r ExceptionRegistry,
    },
    EndDate {
        window: DateWindow,
        registry: &'r ExceptionRegistry,
    },
    EventsDistinct,
    EndEventCoPresence,
    DateConsistency {
        registry: &'r ExceptionRegistry,
    },
    CodeOverlap {
        registry: &'r ExceptionRegistry,
    },
    ParentExistence {
        parents: &'static [EntityClass],
    },
    ParentPeriodOverlap {
        parents: &'static [EntityClass],
    },
    ParentPeriodNoGaps {
        parents: &'static [EntityClass],
    },
    ParentPeriodContainment {
        parents: &'static [EntityClass],
    },
    ParentUnicity {
        registry: &'r ExceptionRegistry,
    },
}

impl<'r> Check<'r> {
    /// A format check on `column`, named after the column.
    pub fn pattern(
        column: &'static str,
        pattern: impl Into<String>,
        registry: Option<&'r ExceptionRegistry>,
    ) -> Self {
        let name = match column {
            "uri" => "uri_format".to_string(),
            "insee_code" => "code_format".to_string(),
            "article_code" => "qualifier_code_format".to_string(),
            "parent_uri" => "parent_uri_format".to_string(),
            other => format!("{other}_format"),
        };
        Check::Pattern {
            name,
            column,
            pattern: pattern.into(),
            registry,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Check::Parse => "parse",
            Check::Pattern { name, .. } => name,
            Check::UriUniqueness { .. } => "uri_uniqueness",
            Check::StartDate { .. } => "start_date",
            Check::EndDate { .. } => "end_date",
            Check::EventsDistinct => "events_distinct",
            Check::EndEventCoPresence => "end_event_consistency",
            Check::DateConsistency { .. } => "date_consistency",
            Check::CodeOverlap { .. } => "code_overlap",
            Check::ParentExistence { .. } => "parent_existence",
            Check::ParentPeriodOverlap { .. } => "parent_period_overlap",
            Check::ParentPeriodNoGaps { .. } => "parent_period_gaps",
            Check::ParentPeriodContainment { .. } => "parent_period_containment",
            Check::ParentUnicity { .. } => "parent_unicity",
        }
    }

    /// The registry consulted when the check fails, if any.
    pub fn registry(&self) -> Option<&'r ExceptionRegistry> {
        match self {
            Check::Pattern { registry, .. } => *registry,
            Check::UriUniqueness { registry }
            | Check::StartDate { registry, .. }
            | Check::EndDate { registry, .. }
            | Check::DateConsistency { registry }
            | Check::CodeOverlap { registry }
            | Check::ParentUnicity { registry } => Some(registry),
            _ => None,
        }
    }

    /// Runs the check once.
    ///
    /// With `allow_correction`, a fault whose uri has an entry in the
    /// registry is corrected by rewriting the snapshot with every entry of
    /// that registry. Without it, any fault is reported as fatal.
    #[instrument(skip(self, ctx), fields(check = self.name(), dataset = ctx.dataset.description()))]
    pub async fn run(&self, ctx: &CheckContext<'_>, allow_correction: bool) -> Result<CheckOutcome> {
        let name = self.name();
        let outcome = match self {
            Check::Parse => local::parse(ctx).await?,
            Check::Pattern {
                column,
                pattern,
                registry,
                ..
            } => local::pattern(ctx, name, column, pattern, *registry, allow_correction).await?,
            Check::UriUniqueness { registry } => {
                local::uri_uniqueness(ctx, registry, allow_correction).await?
            }
            Check::StartDate { window, registry } => {
                local::start_date(ctx, window, registry, allow_correction).await?
            }
            Check::EndDate { window, registry } => {
                local::end_date(ctx, window, registry, allow_correction).await?
            }
            Check::EventsDistinct => local::events_distinct(ctx).await?,
            Check::EndEventCoPresence => local::end_event_copresence(ctx).await?,
            Check::DateConsistency { registry } => {
                local::date_consistency(ctx, registry, allow_correction).await?
            }
            Check::CodeOverlap { registry } => {
                overlap::code_overlap(ctx, registry, allow_correction).await?
            }
            Check::ParentExistence { parents } => hierarchy::existence(ctx, parents).await?,
            Check::ParentPeriodOverlap { parents } => {
                hierarchy::period_overlap(ctx, parents).await?
            }
            Check::ParentPeriodNoGaps { parents } => hierarchy::period_gaps(ctx, parents).await?,
            Check::ParentPeriodContainment { parents } => {
                hierarchy::period_containment(ctx, parents).await?
            }
            Check::ParentUnicity { registry } => {
                local::parent_unicity(ctx, registry, allow_correction).await?
            }
        };

        if outcome.is_pass() {
            info!(
                check = name,
                dataset = ctx.dataset.description(),
                "Successfully checked {name} of {}",
                ctx.dataset.description()
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exceptions::CheckKind;

    #[test]
    fn test_pattern_names() {
        assert_eq!(Check::pattern("uri", "^x$", None).name(), "uri_format");
        assert_eq!(Check::pattern("insee_code", "^x$", None).name(), "code_format");
        assert_eq!(
            Check::pattern("iso3166alpha2_code", "^x$", None).name(),
            "iso3166alpha2_code_format"
        );
    }

    #[test]
    fn test_registry_accessor() {
        let registry = ExceptionRegistry::empty(CheckKind::StartDate);
        let check = Check::StartDate {
            window: DateWindow::until_today(),
            registry: &registry,
        };
        assert_eq!(check.registry().map(ExceptionRegistry::kind), Some(CheckKind::StartDate));
        assert!(Check::EventsDistinct.registry().is_none());
    }
}
