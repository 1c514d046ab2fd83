//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use crate::recording::RecordingStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tamanu_core::{catalog, Config, Model, SchemaRegistry, SyncDatabase};

/// A catalog database over a [`RecordingStore`].
pub struct TestDatabase {
    /// The database handle.
    pub db: SyncDatabase,
    /// The store behind it, for seeding and call inspection.
    pub store: Arc<RecordingStore>,
}

impl TestDatabase {
    /// Creates a database with the full Tamanu catalog.
    pub fn catalog() -> Self {
        let registry = catalog::tamanu_catalog().expect("catalog schemas are consistent");
        Self::with_registry(registry)
    }

    /// Creates a database with custom schemas.
    pub fn with_registry(registry: SchemaRegistry) -> Self {
        Self::with_store(Arc::new(RecordingStore::new()), registry)
    }

    /// Creates a catalog database over a prepared store.
    pub fn with_store(store: Arc<RecordingStore>, registry: SchemaRegistry) -> Self {
        let db = SyncDatabase::new(store.clone(), registry, Config::default());
        Self { db, store }
    }

    /// Returns the model of `table`, panicking for unknown tables.
    pub fn model(&self, table: &str) -> Model {
        self.db.model(table).expect("table is registered")
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = SyncDatabase;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a fresh catalog database.
///
/// # Example
///
/// ```rust
/// use tamanu_testkit::with_test_db;
///
/// with_test_db(|db| {
///     assert!((**db).model("encounters").is_ok());
/// });
/// ```
pub fn with_test_db<F, R>(f: F) -> R
where
    F: FnOnce(&TestDatabase) -> R,
{
    let test_db = TestDatabase::catalog();
    f(&test_db)
}

/// Writes a JSON dump into `dir` and returns its path.
pub fn write_dump(dir: &Path, name: &str, dump: &serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    let text = serde_json::to_string_pretty(dump).expect("dump serializes");
    std::fs::write(&path, text).expect("dump is writable");
    path
}

/// Record builders for catalog types.
pub mod records {
    use tamanu_codec::Value;
    use tamanu_core::{SyncRecord, SyncableRecord};
    use tamanu_storage::Row;

    /// A patient.
    pub fn patient(id: &str, first_name: &str) -> SyncableRecord {
        SyncableRecord::with_id(id)
            .with("firstName", first_name)
            .with("displayId", format!("TEST-{id}"))
    }

    /// A clinic encounter of `patient_id`.
    pub fn encounter(id: &str, patient_id: &str) -> SyncableRecord {
        SyncableRecord::with_id(id)
            .with("encounterType", "clinic")
            .with("startDate", "2024-05-01 09:00:00")
            .with("patientId", patient_id)
    }

    /// A vitals reading within `encounter_id`.
    pub fn vitals(id: &str, encounter_id: &str, weight: f64) -> SyncableRecord {
        SyncableRecord::with_id(id)
            .with("dateRecorded", "2024-05-01 09:05:00")
            .with("weight", weight)
            .with("encounterId", encounter_id)
    }

    /// A lab request within `encounter_id`.
    pub fn lab_request(id: &str, encounter_id: &str) -> SyncableRecord {
        SyncableRecord::with_id(id)
            .with("status", "reception_pending")
            .with("encounterId", encounter_id)
    }

    /// A lab test of `lab_request_id`.
    pub fn lab_test(id: &str, lab_request_id: &str) -> SyncableRecord {
        SyncableRecord::with_id(id)
            .with("status", "reception_pending")
            .with("labRequestId", lab_request_id)
    }

    /// A downloaded reference data record.
    pub fn reference_data(id: &str, code: &str, kind: &str) -> SyncRecord {
        let mut data = Row::new();
        data.insert("id".into(), Value::from(id));
        data.insert("code".into(), Value::from(code));
        data.insert("name".into(), Value::from(code.to_uppercase()));
        data.insert("type".into(), Value::from(kind));
        SyncRecord {
            data,
            is_deleted: false,
        }
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use chrono::Utc;
    use tamanu_core::RecordId;

    /// Creates a catalog database holding `count` pending encounters of one
    /// patient, with ids `E000`, `E001`, ...
    pub fn pending_encounters(count: usize) -> TestDatabase {
        let test_db = TestDatabase::catalog();
        let encounters = test_db.model("encounters");
        for i in 0..count {
            let mut record = records::encounter(&format!("E{i:03}"), "P1");
            encounters.create(&mut record).expect("encounter is created");
        }
        test_db
    }

    /// Stores an encounter, a lab request and a lab test, all confirmed
    /// uploaded: `E1 <- L1 <- T1`.
    pub fn uploaded_lab_chain() -> TestDatabase {
        let test_db = TestDatabase::catalog();
        let chain = [
            ("encounters", records::encounter("E1", "P1")),
            ("lab_requests", records::lab_request("L1", "E1")),
            ("lab_tests", records::lab_test("T1", "L1")),
        ];
        for (table, mut record) in chain {
            let model = test_db.model(table);
            model.create(&mut record).expect("record is created");
            model
                .mark_uploaded(&[record.id.clone()], Utc::now())
                .expect("record is confirmed");
        }
        test_db
    }

    /// Returns the ids of `table` currently marked for upload.
    pub fn pending_ids(test_db: &TestDatabase, table: &str) -> Vec<RecordId> {
        let model = test_db.model(table);
        crate::drain_upload_queue(&model, table, 1_000).expect("queue drains")
    }
}
