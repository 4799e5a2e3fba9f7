//! Snapshot builders shared by the integration tests.
#![allow(dead_code)]

use geo_guard::config::{AcquisitionConfig, ExceptionsConfig};
use geo_guard::core::store::write_snapshot;
use geo_guard::model::{records_to_batch, EntityClass, GeographicRecord};
pub use geo_guard::test_fixtures::{date, event_uri, postal_raw, record, uri, with_parents};
use geo_guard::pipeline::Collector;
use geo_guard::supplier::FileSupplier;
use std::path::PathBuf;
use tempfile::TempDir;

/// Supplier snapshots and a working directory, both temporary.
pub struct World {
    pub source: TempDir,
    pub work: TempDir,
}

impl World {
    pub fn new() -> Self {
        Self {
            source: TempDir::new().unwrap(),
            work: TempDir::new().unwrap(),
        }
    }

    pub fn supplier(&self) -> FileSupplier {
        FileSupplier::new(self.source.path())
    }

    /// Stores `records` as the supplier snapshot of `class`.
    pub fn publish(&self, class: EntityClass, records: &[GeographicRecord]) {
        let descriptor = class.descriptor();
        let batch = records_to_batch(descriptor, records).unwrap();
        write_snapshot(&self.supplier().path_for(class), &descriptor.schema(), &[batch]).unwrap();
    }

    /// Publishes one department and one overseas collectivity, both valid
    /// since 1943.
    pub fn publish_parents(&self) {
        self.publish(
            EntityClass::Department,
            &[record(EntityClass::Department, 1, "75", date(1943, 1, 1), None)],
        );
        self.publish(
            EntityClass::OverseasCollectivity,
            &[record(EntityClass::OverseasCollectivity, 1, "975", date(1943, 1, 1), None)],
        );
    }

    /// Stores `lines` as the supplier postal base.
    pub fn publish_postal(&self, lines: &[(&str, &str)]) {
        std::fs::write(self.supplier().postal_path(), postal_raw(lines)).unwrap();
    }

    /// Publishes a consistent snapshot of every class and a postal base.
    pub fn publish_all(&self) {
        self.publish_parents();
        self.publish_postal(&[("75056", "75001"), ("75056", "75002")]);
        self.publish(
            EntityClass::District,
            &[record(EntityClass::District, 1, "98411", date(2007, 2, 22), None)],
        );
        self.publish(
            EntityClass::Country,
            &[record(EntityClass::Country, 1, "99100", date(1943, 1, 1), None)],
        );
        self.publish(
            EntityClass::Commune,
            &[with_parents(
                record(EntityClass::Commune, 1, "75056", date(1943, 1, 1), None),
                &[uri(EntityClass::Department, 1)],
            )],
        );
        self.publish(
            EntityClass::MunicipalArrondissement,
            &[with_parents(
                record(EntityClass::MunicipalArrondissement, 1, "75101", date(1943, 1, 1), None),
                &[uri(EntityClass::Commune, 1)],
            )],
        );
    }

    pub fn collector(&self, exceptions: ExceptionsConfig) -> Collector {
        Collector::new(
            Box::new(self.supplier()),
            AcquisitionConfig::default(),
            exceptions,
        )
        .unwrap()
    }

    /// A working directory that does not exist yet.
    pub fn working_directory(&self) -> PathBuf {
        self.work.path().join("insee")
    }
}
