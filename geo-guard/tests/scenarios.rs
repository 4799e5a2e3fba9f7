//! End-to-end collection scenarios over temporary CSV snapshots.

mod common;

use async_trait::async_trait;
use common::{date, record, uri, with_parents, World};
use geo_guard::checks::{catalog_for, CheckContext, CheckOutcome, Diagnostic, FaultClass};
use geo_guard::config::{AcquisitionConfig, DatasetExceptions, ExceptionsConfig};
use geo_guard::core::{AppliedCorrection, GeoStore};
use geo_guard::error::{GeoError, Result};
use geo_guard::exceptions::{CheckKind, ExceptionSpec, ReplacementFields};
use geo_guard::model::{Dataset, DatasetState, EntityClass, SnapshotPaths, POSTAL_FILE};
use geo_guard::pipeline::Collector;
use geo_guard::replay::{ReplayController, ReplayStep};
use std::sync::Mutex;

fn commune(n: u32, start: chrono::NaiveDate, end: Option<chrono::NaiveDate>) -> geo_guard::model::GeographicRecord {
    with_parents(
        record(EntityClass::Commune, n, "75056", start, end),
        &[uri(EntityClass::Department, 1)],
    )
}

async fn collect_communes(world: &World, collector: &Collector) -> Result<Dataset> {
    let root = world.work.path();
    collector.collect(EntityClass::Department, root).await?;
    collector.collect(EntityClass::OverseasCollectivity, root).await?;
    let (communes, _) = collector.collect(EntityClass::Commune, root).await?;
    Ok(communes)
}

#[tokio::test]
async fn test_adjacent_code_periods_pass() {
    let world = World::new();
    world.publish_parents();
    world.publish(
        EntityClass::Commune,
        &[
            commune(1, date(1943, 1, 1), Some(date(2019, 12, 31))),
            commune(2, date(2020, 1, 1), None),
        ],
    );
    let collector = world.collector(ExceptionsConfig::default());

    let communes = collect_communes(&world, &collector).await.unwrap();
    assert_eq!(communes.state(), DatasetState::Cleaned);
}

#[tokio::test]
async fn test_overlapping_code_periods_abort_without_exception() {
    let world = World::new();
    world.publish_parents();
    world.publish(
        EntityClass::Commune,
        &[
            commune(1, date(1943, 1, 1), Some(date(2019, 12, 31))),
            commune(2, date(2019, 6, 1), None),
        ],
    );
    let collector = world.collector(ExceptionsConfig::default());

    let err = collect_communes(&world, &collector).await.unwrap_err();
    let diagnostic = err.diagnostic().expect("a check diagnostic");
    assert_eq!(diagnostic.check, "code_overlap");
    assert_eq!(diagnostic.class, FaultClass::Correctable);
    assert_eq!(diagnostic.row, Some(1));
    assert_eq!(diagnostic.uri.as_deref(), Some(uri(EntityClass::Commune, 1).as_str()));
}

#[tokio::test]
async fn test_overlap_exception_corrects_and_cleaned_snapshot_is_stable() {
    let world = World::new();
    world.publish_parents();
    world.publish(
        EntityClass::Commune,
        &[
            commune(1, date(1943, 1, 1), Some(date(2019, 12, 31))),
            commune(2, date(2019, 6, 1), None),
        ],
    );
    let mut exceptions = ExceptionsConfig::default();
    exceptions.datasets.insert(
        EntityClass::Commune,
        DatasetExceptions {
            code_overlap: vec![ExceptionSpec::Replace {
                uri: uri(EntityClass::Commune, 2),
                fields: ReplacementFields {
                    insee_code: Some("75056".to_string()),
                    start_date: Some(date(2020, 1, 1)),
                    ..ReplacementFields::default()
                },
            }],
            ..DatasetExceptions::default()
        },
    );
    let registries = exceptions.registries(EntityClass::Commune).unwrap();
    let collector = world.collector(exceptions);

    let root = world.work.path();
    collector.collect(EntityClass::Department, root).await.unwrap();
    collector.collect(EntityClass::OverseasCollectivity, root).await.unwrap();
    let (mut communes, report) = collector.collect(EntityClass::Commune, root).await.unwrap();

    assert_eq!(report.corrections.len(), 1);
    let correction = &report.corrections[0];
    assert_eq!(correction.check, "code_overlap");
    assert_eq!(correction.correction.kind, CheckKind::CodeOverlap);
    assert_eq!(correction.correction.replaced, vec![uri(EntityClass::Commune, 2)]);

    let cleaned = std::fs::read_to_string(&communes.paths.cleaned).unwrap();
    assert!(cleaned.contains("2020-01-01"));
    assert!(!cleaned.contains("2019-06-01"));

    let catalog = catalog_for(EntityClass::Commune, &registries, collector.window());
    let rerun = ReplayController::default()
        .replay(&catalog, collector.store(), &mut communes)
        .await
        .unwrap();
    assert!(rerun.is_clean());
    assert_eq!(rerun.steps_executed, catalog.len());
}

#[tokio::test]
async fn test_child_starting_before_its_parent_aborts() {
    let world = World::new();
    world.publish(
        EntityClass::Department,
        &[record(EntityClass::Department, 1, "75", date(1960, 1, 1), None)],
    );
    world.publish(EntityClass::OverseasCollectivity, &[]);
    world.publish(
        EntityClass::Commune,
        &[commune(1, date(1943, 1, 1), Some(date(1999, 12, 31)))],
    );
    let collector = world.collector(ExceptionsConfig::default());

    let err = collect_communes(&world, &collector).await.unwrap_err();
    let diagnostic = err.diagnostic().expect("a check diagnostic");
    assert_eq!(diagnostic.check, "parent_period_containment");
    assert_eq!(diagnostic.class, FaultClass::Hierarchy);
    assert_eq!(diagnostic.row, Some(1));
}

#[tokio::test]
async fn test_duplicate_exception_rejected_before_fetching() {
    let world = World::new();
    let duplicate = uri(EntityClass::Commune, 7);
    let mut exceptions = ExceptionsConfig::default();
    exceptions.datasets.insert(
        EntityClass::Commune,
        DatasetExceptions {
            start_date: vec![
                ExceptionSpec::Remove {
                    uri: duplicate.clone(),
                },
                ExceptionSpec::Replace {
                    uri: duplicate.clone(),
                    fields: ReplacementFields {
                        start_date: Some(date(1950, 1, 1)),
                        ..ReplacementFields::default()
                    },
                },
            ],
            ..DatasetExceptions::default()
        },
    );

    let result = Collector::new(
        Box::new(world.supplier()),
        AcquisitionConfig::default(),
        exceptions,
    );
    let Err(GeoError::DuplicateExceptionKey { kind, uri, occurrences }) = result else {
        panic!("expected a duplicate exception key");
    };
    assert_eq!(kind, CheckKind::StartDate);
    assert_eq!(uri, duplicate);
    assert_eq!(occurrences, 2);
    assert!(!world.working_directory().exists());
}

/// A step whose outcome depends on how often it ran and whether
/// corrections are allowed.
struct Scripted {
    name: &'static str,
    calls: Mutex<usize>,
    behaviour: fn(usize, bool) -> CheckOutcome,
}

impl Scripted {
    fn new(name: &'static str, behaviour: fn(usize, bool) -> CheckOutcome) -> Self {
        Self {
            name,
            calls: Mutex::new(0),
            behaviour,
        }
    }
}

#[async_trait]
impl ReplayStep for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, _ctx: &CheckContext<'_>, allow_correction: bool) -> Result<CheckOutcome> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        Ok((self.behaviour)(call, allow_correction))
    }
}

fn passes(_: usize, _: bool) -> CheckOutcome {
    CheckOutcome::Pass
}

fn corrects_once(call: usize, _: bool) -> CheckOutcome {
    if call == 1 {
        CheckOutcome::Corrected(AppliedCorrection {
            kind: CheckKind::StartDate,
            trigger_uri: "http://id.insee.fr/geo/commune/a".to_string(),
            replaced: vec!["http://id.insee.fr/geo/commune/a".to_string()],
            removed: Vec::new(),
        })
    } else {
        CheckOutcome::Pass
    }
}

fn breaks_after_first_pass(call: usize, _: bool) -> CheckOutcome {
    if call == 1 {
        CheckOutcome::Pass
    } else {
        CheckOutcome::fatal(Diagnostic::new("uri_uniqueness", "Communes", FaultClass::Correctable))
    }
}

#[tokio::test]
async fn test_replayed_step_that_cannot_pass_aborts() {
    let store = GeoStore::new().unwrap();
    let mut dataset = Dataset::new(
        EntityClass::Commune,
        SnapshotPaths::under(std::env::temp_dir(), &EntityClass::Commune.file_name()),
    );
    let steps = [
        Scripted::new("parse", passes),
        Scripted::new("uri_uniqueness", breaks_after_first_pass),
        Scripted::new("code_format", passes),
        Scripted::new("start_date", passes),
        Scripted::new("end_date", corrects_once),
        Scripted::new("code_overlap", passes),
    ];

    let err = ReplayController::default()
        .replay(&steps, &store, &mut dataset)
        .await
        .unwrap_err();
    let GeoError::ControlFlowInvariant { step, check, .. } = err else {
        panic!("expected a control-flow invariant violation, got {err}");
    };
    assert_eq!(step, 2);
    assert_eq!(check, "uri_uniqueness");
    assert_eq!(*steps[1].calls.lock().unwrap(), 3);
    assert_eq!(*steps[5].calls.lock().unwrap(), 0);
    assert!(!dataset.is_cleaned());
}

#[tokio::test]
async fn test_full_collection() {
    let world = World::new();
    world.publish_all();
    let collector = world.collector(ExceptionsConfig::default());
    let working_directory = world.working_directory();

    let report = collector.run(&working_directory, false).await.unwrap();
    assert_eq!(report.datasets.len(), 6);
    assert_eq!(report.total_corrections(), 0);
    assert_eq!(report.global_checks, vec!["event_consistency", "global_code_overlap"]);
    let order: Vec<EntityClass> = report.datasets.iter().map(|d| d.class).collect();
    assert_eq!(order, EntityClass::COLLECTION_ORDER.to_vec());
    for class in EntityClass::COLLECTION_ORDER {
        let paths = SnapshotPaths::under(&working_directory, &class.file_name());
        assert!(paths.raw.exists());
        assert!(paths.additions.exists());
        assert!(paths.removals.exists());
        assert!(paths.cleaned.exists());
    }
    assert!(report.to_string().contains("Datasets: 6"));

    let postal = report.postal.as_ref().expect("a postal report");
    assert_eq!(postal.rows, 2);
    assert_eq!(
        postal.checks,
        vec!["postal_insee_code_format", "postal_postal_code_format"]
    );
    let postal_paths = SnapshotPaths::under(&working_directory, POSTAL_FILE);
    assert!(postal_paths.raw.exists());
    assert!(postal_paths.cleaned.exists());

    let again = world.collector(ExceptionsConfig::default());
    assert!(matches!(
        again.run(&working_directory, false).await,
        Err(GeoError::Configuration(_))
    ));
    assert!(again.run(&working_directory, true).await.is_ok());
}

#[tokio::test]
async fn test_event_with_two_dates_fails_global_check() {
    let world = World::new();
    world.publish_all();
    let district = record(EntityClass::District, 1, "98411", date(2007, 2, 22), None);
    let mut country = record(EntityClass::Country, 1, "99100", date(1943, 1, 1), None);
    country.start_event_uri = district.start_event_uri.clone();
    world.publish(EntityClass::Country, &[country]);
    let collector = world.collector(ExceptionsConfig::default());

    let err = collector.run(&world.working_directory(), false).await.unwrap_err();
    let diagnostic = err.diagnostic().expect("a check diagnostic");
    assert_eq!(diagnostic.check, "event_consistency");
    assert_eq!(diagnostic.class, FaultClass::GlobalConsistency);
    assert_eq!(diagnostic.value.as_deref(), Some("1943-01-01, 2007-02-22"));
}

#[tokio::test]
async fn test_postal_base_runs_after_global_checks() {
    let world = World::new();
    world.publish_all();
    world.publish_postal(&[("75056", "75001"), ("9A001", "75002")]);
    let collector = world.collector(ExceptionsConfig::default());

    let err = collector.run(&world.working_directory(), false).await.unwrap_err();
    let diagnostic = err.diagnostic().expect("a check diagnostic");
    assert_eq!(diagnostic.check, "postal_insee_code_format");
    assert_eq!(diagnostic.row, Some(2));
    assert_eq!(diagnostic.value.as_deref(), Some("9A001"));

    let arrondissements = SnapshotPaths::under(
        world.working_directory(),
        &EntityClass::MunicipalArrondissement.file_name(),
    );
    assert!(arrondissements.cleaned.exists());
}

#[tokio::test]
async fn test_overlapping_duplicated_parents_stop_before_unicity() {
    let world = World::new();
    world.publish_parents();
    let paris = uri(EntityClass::Commune, 1);
    let lyon = uri(EntityClass::Commune, 2);
    world.publish(
        EntityClass::Commune,
        &[
            commune(1, date(1943, 1, 1), None),
            with_parents(
                record(EntityClass::Commune, 2, "69123", date(1943, 1, 1), None),
                &[uri(EntityClass::Department, 1)],
            ),
        ],
    );
    let arrondissement = with_parents(
        record(EntityClass::MunicipalArrondissement, 1, "75101", date(1943, 1, 1), None),
        &[paris.clone(), lyon],
    );
    world.publish(EntityClass::MunicipalArrondissement, &[arrondissement.clone()]);

    let mut exceptions = ExceptionsConfig::default();
    exceptions.datasets.insert(
        EntityClass::MunicipalArrondissement,
        DatasetExceptions {
            parent_unicity: vec![ExceptionSpec::Replace {
                uri: arrondissement.uri.clone(),
                fields: ReplacementFields {
                    parent_uri: Some(paris),
                    ..ReplacementFields::default()
                },
            }],
            ..DatasetExceptions::default()
        },
    );
    let collector = world.collector(exceptions);

    let root = world.work.path();
    collector.collect(EntityClass::Department, root).await.unwrap();
    collector.collect(EntityClass::OverseasCollectivity, root).await.unwrap();
    collector.collect(EntityClass::Commune, root).await.unwrap();
    let err = collector
        .collect(EntityClass::MunicipalArrondissement, root)
        .await
        .unwrap_err();
    let diagnostic = err.diagnostic().expect("a check diagnostic");
    assert_eq!(diagnostic.check, "parent_period_overlap");
    assert_eq!(diagnostic.class, FaultClass::Hierarchy);
    assert_eq!(diagnostic.uri.as_deref(), Some(arrondissement.uri.as_str()));
}
