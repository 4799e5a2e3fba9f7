//! Configuration files.
//!
//! Two files drive a collection: the acquisition configuration (supplier
//! settings, date window, optional query files overriding the bundled
//! queries) and the exceptions configuration (amendments and per-check
//! registries per dataset, amendments of the postal base). Both are
//! read from `.json`, `.yaml` or `.yml` files and fully validated on load, so
//! a bad configuration fails before any data is fetched.

use crate::error::{GeoError, Result};
use crate::exceptions::{
    Amendments, CheckKind, ExceptionRegistry, ExceptionSpec, PostalAmendments, RegistrySet,
};
use crate::model::{historical_minimum, DateWindow, EntityClass};
use crate::supplier::{bundled_query, RetryPolicy};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Endpoint of the reference SPARQL service.
pub const DEFAULT_ENDPOINT: &str = "http://rdf.insee.fr/sparql";

/// Download service of the La Poste postal code base.
pub const DEFAULT_POSTAL_ENDPOINT: &str =
    "https://datanova.laposte.fr/data-fair/api/v1/datasets/laposte-hexasmal/raw";

/// HTTP supplier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupplierConfig {
    pub endpoint_url: String,
    pub backoff_factor: f64,
    pub max_retries: u32,
    pub connect_timeout_secs: f64,
    pub read_timeout_secs: f64,
}

impl Default for SupplierConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT.to_string(),
            backoff_factor: 0.5,
            max_retries: 5,
            connect_timeout_secs: 3.0,
            read_timeout_secs: 15.0,
        }
    }
}

impl SupplierConfig {
    /// Default settings of the postal base download.
    pub fn postal() -> Self {
        PostalSupplierConfig::default().settings()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_factor: self.backoff_factor,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        seconds(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        seconds(self.read_timeout_secs)
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.endpoint_url.trim().is_empty() {
            return Err(GeoError::Configuration(format!(
                "{section}.endpoint_url must not be empty"
            )));
        }
        for (name, value) in [
            ("backoff_factor", self.backoff_factor),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("read_timeout_secs", self.read_timeout_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(GeoError::Configuration(format!(
                    "{section}.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Settings of the postal base download; same fields as [`SupplierConfig`]
/// with the La Poste service as default endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PostalSupplierConfig {
    pub endpoint_url: String,
    pub backoff_factor: f64,
    pub max_retries: u32,
    pub connect_timeout_secs: f64,
    pub read_timeout_secs: f64,
}

impl Default for PostalSupplierConfig {
    fn default() -> Self {
        let SupplierConfig {
            backoff_factor,
            max_retries,
            connect_timeout_secs,
            read_timeout_secs,
            ..
        } = SupplierConfig::default();
        Self {
            endpoint_url: DEFAULT_POSTAL_ENDPOINT.to_string(),
            backoff_factor,
            max_retries,
            connect_timeout_secs,
            read_timeout_secs,
        }
    }
}

impl PostalSupplierConfig {
    pub fn settings(&self) -> SupplierConfig {
        SupplierConfig {
            endpoint_url: self.endpoint_url.clone(),
            backoff_factor: self.backoff_factor,
            max_retries: self.max_retries,
            connect_timeout_secs: self.connect_timeout_secs,
            read_timeout_secs: self.read_timeout_secs,
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Bounds of admissible dates. Unset bounds default to 1943-01-01 and today.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DateWindowConfig {
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
}

impl DateWindowConfig {
    pub fn resolve(&self) -> Result<DateWindow> {
        let today = DateWindow::until_today();
        let window = DateWindow::new(
            self.min_date.unwrap_or_else(historical_minimum),
            self.max_date.unwrap_or(today.max),
        );
        if window.min > window.max {
            return Err(GeoError::Configuration(format!(
                "date_window.min_date {} is after max_date {}",
                window.min, window.max
            )));
        }
        Ok(window)
    }
}

/// Settings of the acquisition step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionConfig {
    pub supplier: SupplierConfig,
    pub laposte: PostalSupplierConfig,
    pub date_window: DateWindowConfig,
    /// Query files replacing the bundled queries. Relative paths are
    /// resolved against the directory of the configuration file.
    pub queries: BTreeMap<EntityClass, PathBuf>,
}

impl AcquisitionConfig {
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Self = load_file(path)?;
        if let Some(base) = path.parent() {
            for query in config.queries.values_mut() {
                if query.is_relative() {
                    *query = base.join(&*query);
                }
            }
        }
        config.validate()?;
        debug!(queries = config.queries.len(), "Acquisition configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.supplier.validate("supplier")?;
        self.laposte.settings().validate("laposte")?;
        self.date_window.resolve()?;
        Ok(())
    }

    pub fn date_window(&self) -> Result<DateWindow> {
        self.date_window.resolve()
    }

    /// Text of the query of `class`: the configured file, or the bundled
    /// query when none is configured.
    pub fn query_for(&self, class: EntityClass) -> Result<String> {
        let Some(path) = self.queries.get(&class) else {
            return Ok(bundled_query(class).to_string());
        };
        std::fs::read_to_string(path).map_err(|e| {
            GeoError::Configuration(format!(
                "Failed to read query file {} of {}: {e}",
                path.display(),
                class.descriptor().description
            ))
        })
    }
}

/// Exceptions of one dataset, grouped by the check they apply to.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetExceptions {
    pub amendments: Amendments,
    pub uri_format: Vec<ExceptionSpec>,
    pub uri_uniqueness: Vec<ExceptionSpec>,
    pub code: Vec<ExceptionSpec>,
    pub qualifier_code: Vec<ExceptionSpec>,
    pub start_date: Vec<ExceptionSpec>,
    pub end_date: Vec<ExceptionSpec>,
    pub date_consistency: Vec<ExceptionSpec>,
    pub code_overlap: Vec<ExceptionSpec>,
    pub parent_unicity: Vec<ExceptionSpec>,
}

impl DatasetExceptions {
    fn specs(&self, kind: CheckKind) -> &[ExceptionSpec] {
        match kind {
            CheckKind::UriFormat => &self.uri_format,
            CheckKind::UriUniqueness => &self.uri_uniqueness,
            CheckKind::Code => &self.code,
            CheckKind::QualifierCode => &self.qualifier_code,
            CheckKind::StartDate => &self.start_date,
            CheckKind::EndDate => &self.end_date,
            CheckKind::DateConsistency => &self.date_consistency,
            CheckKind::CodeOverlap => &self.code_overlap,
            CheckKind::ParentUnicity => &self.parent_unicity,
        }
    }

    /// Builds one registry per check kind.
    pub fn registries(&self) -> Result<RegistrySet> {
        let mut set = RegistrySet::new();
        for kind in CheckKind::ALL {
            let entries = self
                .specs(kind)
                .iter()
                .cloned()
                .map(|spec| spec.into_entry(kind))
                .collect::<Result<Vec<_>>>()?;
            if !entries.is_empty() {
                set = set.with(ExceptionRegistry::load(kind, entries)?);
            }
        }
        Ok(set)
    }
}

/// Exceptions of every dataset, keyed by dataset name (`communes`, `pays`, ...),
/// and the amendments of the postal base under `laposte`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExceptionsConfig {
    #[serde(default)]
    pub laposte: PostalAmendments,
    #[serde(flatten)]
    pub datasets: BTreeMap<EntityClass, DatasetExceptions>,
}

impl ExceptionsConfig {
    /// Loads and validates an exceptions file against `window`.
    #[instrument(skip(path, window), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>, window: &DateWindow) -> Result<Self> {
        let config: Self = load_file(path.as_ref())?;
        config.validate(window)?;
        Ok(config)
    }

    /// Checks every registry and every amendment.
    pub fn validate(&self, window: &DateWindow) -> Result<()> {
        for (class, exceptions) in &self.datasets {
            exceptions.registries()?;
            exceptions
                .amendments
                .validate(class.descriptor(), window)?;
        }
        self.laposte.validate()
    }

    pub fn registries(&self, class: EntityClass) -> Result<RegistrySet> {
        match self.datasets.get(&class) {
            Some(exceptions) => exceptions.registries(),
            None => Ok(RegistrySet::new()),
        }
    }

    pub fn amendments(&self, class: EntityClass) -> Amendments {
        self.datasets
            .get(&class)
            .map(|e| e.amendments.clone())
            .unwrap_or_default()
    }
}

fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        GeoError::Configuration(format!("Failed to read {}: {e}", path.display()))
    })?;
    let invalid = |e: &dyn std::fmt::Display| {
        GeoError::Configuration(format!("Invalid configuration file {}: {e}", path.display()))
    };
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| invalid(&e)),
        Some("yaml" | "yml") => serde_yaml::from_str(&content).map_err(|e| invalid(&e)),
        _ => Err(GeoError::Configuration(format!(
            "Unsupported configuration format for {}: expected .json, .yaml or .yml",
            path.display()
        ))),
    }
}
