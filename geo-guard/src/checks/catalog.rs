//! Ordered check catalog of each entity class.

use super::Check;
use crate::exceptions::{CheckKind, RegistrySet};
use crate::model::{DateWindow, EntityClass};

/// Builds the checks of `class` in the order they must pass.
///
/// Checks borrow their registries from `registries`. Classes with parents
/// get the parent checks; single-parent classes also get parent unicity.
pub fn catalog_for(class: EntityClass, registries: &RegistrySet, window: DateWindow) -> Vec<Check<'_>> {
    let descriptor = class.descriptor();
    let mut checks = vec![
        Check::Parse,
        Check::pattern(
            "uri",
            descriptor.uri_pattern(),
            Some(registries.get(CheckKind::UriFormat)),
        ),
        Check::UriUniqueness {
            registry: registries.get(CheckKind::UriUniqueness),
        },
    ];

    for rule in descriptor.pattern_rules() {
        let registry = match rule.column {
            "insee_code" => Some(registries.get(CheckKind::Code)),
            "article_code" => Some(registries.get(CheckKind::QualifierCode)),
            _ => None,
        };
        checks.push(Check::pattern(rule.column, rule.pattern, registry));
    }

    checks.extend([
        Check::StartDate {
            window,
            registry: registries.get(CheckKind::StartDate),
        },
        Check::EndDate {
            window,
            registry: registries.get(CheckKind::EndDate),
        },
        Check::EventsDistinct,
        Check::EndEventCoPresence,
        Check::DateConsistency {
            registry: registries.get(CheckKind::DateConsistency),
        },
        Check::CodeOverlap {
            registry: registries.get(CheckKind::CodeOverlap),
        },
    ]);

    if let Some(pattern) = descriptor.parent_uri_pattern() {
        let parents = descriptor.parent_classes;
        checks.extend([
            Check::pattern("parent_uri", pattern, None),
            Check::ParentExistence { parents },
            Check::ParentPeriodOverlap { parents },
            Check::ParentPeriodNoGaps { parents },
            Check::ParentPeriodContainment { parents },
        ]);
    }

    // Last in the catalog: a duplicated parent whose periods overlap stops at
    // parent_period_overlap before its unicity exception can apply.
    if descriptor.single_parent {
        checks.push(Check::ParentUnicity {
            registry: registries.get(CheckKind::ParentUnicity),
        });
    }

    checks
}
