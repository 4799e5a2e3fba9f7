//! Snapshot fixtures for tests.
//!
//! Builds well-formed records of every class and writes them as working
//! snapshots under a temporary directory. Uris and event uris are derived
//! from a class and a number, so two fixtures never share an event by
//! accident.

use crate::core::store::write_snapshot;
use crate::core::GeoStore;
use crate::error::Result;
use crate::model::postal::POSTAL_RAW_HEADER;
use crate::model::{records_to_batch, Dataset, EntityClass, GeographicRecord, SnapshotPaths};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tempfile::TempDir;

/// Header of a district snapshot.
pub const DISTRICT_HEADER: &str = "uri,insee_code,label,article_code,start_event_uri,end_event_uri,start_date,end_date,start_date_count,end_date_count";

#[allow(clippy::expect_used)]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("Fixture dates should be valid")
}

fn uuid(n: u32) -> String {
    format!("{n:08x}-0000-4000-8000-{n:012x}")
}

/// Uri of the `n`-th fixture entity of `class`.
pub fn uri(class: EntityClass, n: u32) -> String {
    format!("http://id.insee.fr/geo/{}/{}", class.descriptor().uri_segment, uuid(n))
}

pub fn event_uri(n: u32) -> String {
    format!("http://id.insee.fr/geo/evenementGeographique/{}", uuid(n))
}

fn event_base(class: EntityClass) -> u32 {
    let position = EntityClass::COLLECTION_ORDER
        .iter()
        .position(|c| *c == class)
        .unwrap_or_default();
    (position as u32 + 1) * 100_000
}

/// A valid record without parents. Start and end events are unique to the
/// record; the end event is set when `end` is.
pub fn record(
    class: EntityClass,
    n: u32,
    code: &str,
    start: NaiveDate,
    end: Option<NaiveDate>,
) -> GeographicRecord {
    let descriptor = class.descriptor();
    let base = event_base(class) + 2 * n;
    GeographicRecord {
        uri: uri(class, n),
        code: code.to_string(),
        label: format!("{} {n}", descriptor.description),
        qualifier_code: "0".to_string(),
        parent_uris: Vec::new(),
        start_event_uri: event_uri(base),
        end_event_uri: end.map(|_| event_uri(base + 1)),
        start_date: start,
        end_date: end,
        extra: descriptor
            .extra_columns
            .iter()
            .map(|(name, _)| (name.to_string(), None))
            .collect::<BTreeMap<_, _>>(),
    }
}

pub fn with_parents(mut record: GeographicRecord, parents: &[String]) -> GeographicRecord {
    record.parent_uris = parents.to_vec();
    record
}

/// A published postal base with one line per `(insee_code, postal_code)`.
pub fn postal_raw(lines: &[(&str, &str)]) -> String {
    let mut raw = format!("{}\n", POSTAL_RAW_HEADER.join(";"));
    for (code, postal_code) in lines {
        raw.push_str(&format!("{code};COMMUNE {code};{postal_code};COMMUNE {code};\n"));
    }
    raw
}

/// One district line matching [`DISTRICT_HEADER`]. Empty `end` leaves the
/// end event and end date empty.
pub fn district_csv(n: u32, code: &str, start: &str, end: &str, start_count: i64) -> String {
    let base = event_base(EntityClass::District) + 2 * n;
    let (end_event, end_count) = if end.is_empty() {
        (String::new(), 0)
    } else {
        (event_uri(base + 1), 1)
    };
    format!(
        "{},{code},District {n},0,{},{end_event},{start},{end},{start_count},{end_count}",
        uri(EntityClass::District, n),
        event_uri(base),
    )
}

/// Serializes records the way the supplier delivers them.
pub fn records_csv(class: EntityClass, records: &[GeographicRecord]) -> Result<Vec<u8>> {
    let batch = records_to_batch(class.descriptor(), records)?;
    let mut buffer = Vec::new();
    {
        let mut writer = arrow::csv::WriterBuilder::new()
            .with_header(true)
            .build(&mut buffer);
        writer.write(&batch)?;
    }
    Ok(buffer)
}

/// A temporary working directory and a store.
pub struct SnapshotFixture {
    pub dir: TempDir,
    pub store: GeoStore,
}

impl SnapshotFixture {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
            store: GeoStore::new()?,
        })
    }

    /// A raw dataset of `class` laid out under the fixture directory.
    pub fn dataset(&self, class: EntityClass) -> Dataset {
        Dataset::new(class, SnapshotPaths::under(self.dir.path(), &class.file_name()))
    }

    /// Writes `content` as the working snapshot without loading it.
    pub fn write_csv(&self, class: EntityClass, content: &str) -> Result<Dataset> {
        let dataset = self.dataset(class);
        if let Some(parent) = dataset.paths.cleaned.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dataset.paths.cleaned, content)?;
        Ok(dataset)
    }

    /// Writes `content` as the working snapshot and loads its view.
    pub async fn load_csv(&self, class: EntityClass, content: &str) -> Result<Dataset> {
        let dataset = self.write_csv(class, content)?;
        self.load(&dataset).await?;
        Ok(dataset)
    }

    /// Writes records as the working snapshot and loads its view.
    pub async fn load_records(
        &self,
        class: EntityClass,
        records: &[GeographicRecord],
    ) -> Result<Dataset> {
        let dataset = self.dataset(class);
        let descriptor = class.descriptor();
        let batch = records_to_batch(descriptor, records)?;
        write_snapshot(&dataset.paths.cleaned, &descriptor.schema(), &[batch])?;
        self.load(&dataset).await?;
        Ok(dataset)
    }

    async fn load(&self, dataset: &Dataset) -> Result<usize> {
        let descriptor = dataset.descriptor();
        self.store
            .load_view(descriptor.view_name, &dataset.paths.cleaned, descriptor.schema())
            .await
    }
}
