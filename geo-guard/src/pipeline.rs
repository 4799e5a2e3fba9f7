//! Full collection of the reference data.
//!
//! For each entity class, parents first, the [`Collector`] fetches the raw
//! snapshot, merges the configured amendments into a working snapshot,
//! replays the check catalog on it and keeps the cleaned result. Once every
//! dataset is cleaned the global checks run across all of them. The La Poste
//! postal code base comes last: its amendments are merged by commune code and
//! its code formats checked. The first fatal fault aborts the collection.

use crate::checks::postal::{self, pattern_check_name};
use crate::checks::{catalog_for, check_event_consistency, check_global_code_overlap, Diagnostic, FaultClass};
use crate::config::{AcquisitionConfig, ExceptionsConfig};
use crate::core::store::write_snapshot;
use crate::core::{CheckOutcome, GeoStore};
use crate::error::{ErrorContext, GeoError, Result};
use crate::log_data_op;
use crate::logging::LogConfig;
use crate::model::postal::{postal_pattern_rules, postal_records_to_batch, postal_schema};
use crate::model::{
    records_to_batch, Dataset, DatasetState, DateWindow, EntityClass, SnapshotPaths, POSTAL_FILE,
    POSTAL_VIEW,
};
use crate::replay::{ReplayController, ReplayReport};
use crate::report::{CollectionReport, PostalReport};
use crate::security::SqlSecurity;
use crate::supplier::Supplier;
use arrow::array::StringArray;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Creates the working directory.
///
/// An existing directory is only reused when `overwrite` is set, in which
/// case its content is deleted first.
pub fn prepare_working_directory(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() {
        if !overwrite {
            return Err(GeoError::Configuration(format!(
                "Working directory {} already exists; pass the overwrite flag to replace it",
                path.display()
            )));
        }
        info!(path = %path.display(), "Removing existing working directory");
        std::fs::remove_dir_all(path)?;
    }
    std::fs::create_dir_all(path)?;
    Ok(())
}

fn removal_schema() -> SchemaRef {
    key_schema("uri")
}

fn key_schema(column: &str) -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new(column, DataType::Utf8, false)]))
}

/// Runs a whole collection against one supplier.
pub struct Collector {
    supplier: Box<dyn Supplier>,
    acquisition: AcquisitionConfig,
    exceptions: ExceptionsConfig,
    window: DateWindow,
    store: GeoStore,
    log: LogConfig,
}

impl Collector {
    /// Validates both configurations and creates a fresh store.
    pub fn new(
        supplier: Box<dyn Supplier>,
        acquisition: AcquisitionConfig,
        exceptions: ExceptionsConfig,
    ) -> Result<Self> {
        acquisition.validate()?;
        let window = acquisition.date_window()?;
        exceptions.validate(&window)?;
        Ok(Self {
            supplier,
            acquisition,
            exceptions,
            window,
            store: GeoStore::new()?,
            log: LogConfig::default(),
        })
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn with_store(mut self, store: GeoStore) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &GeoStore {
        &self.store
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    /// Collects every dataset under `working_directory`.
    #[instrument(skip(self), fields(working_directory = %working_directory.display()))]
    pub async fn run(&self, working_directory: &Path, overwrite: bool) -> Result<CollectionReport> {
        let started = Instant::now();
        prepare_working_directory(working_directory, overwrite)?;

        let mut report = CollectionReport::new();
        let mut datasets = Vec::with_capacity(EntityClass::COLLECTION_ORDER.len());
        for class in EntityClass::COLLECTION_ORDER {
            let (dataset, replay) = self.collect(class, working_directory).await?;
            report.datasets.push(replay);
            datasets.push(dataset);
        }

        require_pass(check_event_consistency(&self.store, &datasets).await?)?;
        report.global_checks.push("event_consistency".to_string());
        require_pass(check_global_code_overlap(&self.store, &datasets).await?)?;
        report.global_checks.push("global_code_overlap".to_string());

        report.postal = Some(self.collect_postal(working_directory).await?);

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            datasets = report.datasets.len(),
            corrections = report.total_corrections(),
            duration_ms = report.duration_ms,
            "Collection completed"
        );
        Ok(report)
    }

    /// Fetches, amends and cleans the dataset of `class`.
    #[instrument(skip(self, root), fields(dataset = class.descriptor().description))]
    pub async fn collect(&self, class: EntityClass, root: &Path) -> Result<(Dataset, ReplayReport)> {
        let mut dataset = Dataset::new(class, SnapshotPaths::under(root, &class.file_name()));

        let query = self.acquisition.query_for(class)?;
        let body = self.supplier.fetch_dataset(class, Some(&query)).await?;
        self.write_raw(&dataset.paths.raw, &body).await?;

        self.apply_amendments(&mut dataset).await?;

        let registries = self.exceptions.registries(class)?;
        let catalog = catalog_for(class, &registries, self.window);
        let replay = ReplayController::new(self.log.clone())
            .replay(&catalog, &self.store, &mut dataset)
            .await?;
        Ok((dataset, replay))
    }

    async fn write_raw(&self, path: &Path, body: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("writing raw snapshot {}", path.display()))?;
        log_data_op!(
            self.log,
            path = %path.display(),
            bytes = body.len(),
            "Raw snapshot written"
        );
        Ok(())
    }

    /// Fetches the postal code base, merges its amendments and checks the
    /// format of its codes.
    ///
    /// Every published row of an amended commune is dropped; the amendment
    /// rows follow the remaining published rows.
    #[instrument(skip(self, root))]
    pub async fn collect_postal(&self, root: &Path) -> Result<PostalReport> {
        let paths = SnapshotPaths::under(root, POSTAL_FILE);
        let body = self.supplier.fetch_postal().await?;
        self.write_raw(&paths.raw, &body).await?;
        require_pass(postal::load_raw(&self.store, &paths).await?)?;

        let amendments = &self.exceptions.laposte;
        let added = amendments.records();
        let removed = amendments.removed_codes();
        let schema = postal_schema();
        write_snapshot(&paths.additions, &schema, &[postal_records_to_batch(&added)?])?;
        let removals_schema = key_schema("insee_code");
        let removals = RecordBatch::try_new(
            removals_schema.clone(),
            vec![Arc::new(StringArray::from(removed.clone()))],
        )?;
        write_snapshot(&paths.removals, &removals_schema, &[removals])?;

        let additions_view = format!("{POSTAL_VIEW}_add_or_replace");
        let removals_view = format!("{POSTAL_VIEW}_remove");
        self.store
            .load_view(&additions_view, &paths.additions, schema.clone())
            .await?;
        self.store
            .load_view(&removals_view, &paths.removals, removals_schema)
            .await?;

        let columns = schema
            .fields()
            .iter()
            .map(|f| SqlSecurity::escape_identifier(f.name()))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let view = SqlSecurity::escape_identifier(POSTAL_VIEW)?;
        let additions_view = SqlSecurity::escape_identifier(&additions_view)?;
        let removals_view = SqlSecurity::escape_identifier(&removals_view)?;
        let sql = format!(
            "SELECT {columns}, 0 AS merge_source, _row AS merge_order FROM {view} \
             WHERE COALESCE(insee_code, '') NOT IN (SELECT insee_code FROM {removals_view}) \
             UNION ALL \
             SELECT {columns}, 1 AS merge_source, _row AS merge_order FROM {additions_view} \
             ORDER BY merge_source, merge_order"
        );
        let rows = self
            .store
            .rewrite(POSTAL_VIEW, &sql, &paths.cleaned, schema)
            .await?;
        log_data_op!(
            self.log,
            added = added.len(),
            removed = removed.len(),
            rows,
            "Postal amendments applied"
        );

        let mut checks = Vec::new();
        for rule in postal_pattern_rules() {
            require_pass(postal::pattern(&self.store, &rule).await?)?;
            checks.push(pattern_check_name(rule.column));
        }
        Ok(PostalReport {
            rows,
            added: added.len(),
            removed: removed.len(),
            checks,
        })
    }

    /// Writes the amendment snapshots and merges them with the raw snapshot
    /// into the working snapshot.
    ///
    /// Raw rows whose uri is removed or added are dropped; added records
    /// follow the remaining raw rows.
    pub async fn apply_amendments(&self, dataset: &mut Dataset) -> Result<usize> {
        let descriptor = dataset.descriptor();
        let schema = descriptor.schema();
        let amendments = self.exceptions.amendments(dataset.class);

        let additions = records_to_batch(descriptor, &amendments.add_or_replace)?;
        write_snapshot(&dataset.paths.additions, &schema, &[additions])?;
        let removals = RecordBatch::try_new(
            removal_schema(),
            vec![Arc::new(StringArray::from(amendments.remove.clone()))],
        )?;
        write_snapshot(&dataset.paths.removals, &removal_schema(), &[removals])?;

        let raw_view = format!("{}_raw", descriptor.view_name);
        let additions_view = format!("{}_add_or_replace", descriptor.view_name);
        let removals_view = format!("{}_remove", descriptor.view_name);
        self.store
            .load_view(&raw_view, &dataset.paths.raw, schema.clone())
            .await
            .map_err(|e| match e {
                GeoError::Parse(message) => GeoError::check_failed(
                    Diagnostic::new("parse", descriptor.description, FaultClass::Schema)
                        .with_message(message),
                ),
                other => other,
            })?;
        self.store
            .load_view(&additions_view, &dataset.paths.additions, schema.clone())
            .await?;
        self.store
            .load_view(&removals_view, &dataset.paths.removals, removal_schema())
            .await?;

        let columns = descriptor
            .column_names()
            .iter()
            .map(|c| SqlSecurity::escape_identifier(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let raw_view = SqlSecurity::escape_identifier(&raw_view)?;
        let additions_view = SqlSecurity::escape_identifier(&additions_view)?;
        let removals_view = SqlSecurity::escape_identifier(&removals_view)?;
        let sql = format!(
            "SELECT {columns}, 0 AS merge_source, _row AS merge_order FROM {raw_view} \
             WHERE COALESCE(uri, '') NOT IN (SELECT uri FROM {removals_view}) \
             AND COALESCE(uri, '') NOT IN (SELECT uri FROM {additions_view} WHERE uri IS NOT NULL) \
             UNION ALL \
             SELECT {columns}, 1 AS merge_source, _row AS merge_order FROM {additions_view} \
             ORDER BY merge_source, merge_order"
        );
        let rows = self
            .store
            .rewrite(descriptor.view_name, &sql, &dataset.paths.cleaned, schema)
            .await?;

        dataset.advance(DatasetState::ExceptionApplied);
        log_data_op!(
            self.log,
            dataset = descriptor.description,
            added = amendments.add_or_replace.len(),
            removed = amendments.remove.len(),
            rows,
            "Amendments applied"
        );
        Ok(rows)
    }
}

fn require_pass(outcome: CheckOutcome) -> Result<()> {
    match outcome {
        CheckOutcome::Pass => Ok(()),
        CheckOutcome::Fatal(diagnostic) => Err(GeoError::CheckFailed(diagnostic)),
        CheckOutcome::Corrected(correction) => Err(GeoError::Internal(format!(
            "global checks never correct, but {} reported a correction",
            correction.kind
        ))),
    }
}
