//! Per-type entity operations.
//!
//! A [`Model`] binds one [`EntitySchema`] to the database it lives in. All
//! sync metadata handling goes through it: upload flags, field ticks, parent
//! marking and the pull-merge path.

mod import;
mod parent;
mod upload;

pub use import::ImportOutcome;
pub use parent::ParentRef;
pub use upload::UploadQuery;

use crate::database::SyncDatabase;
use crate::direction::SyncDirection;
use crate::error::CoreResult;
use crate::export::ExportPlan;
use crate::field_ticks::{compute_updated_at_by_field, resolved_column_value};
use crate::record::{columns, RecordId, SyncableRecord};
use crate::schema::EntitySchema;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tamanu_storage::{Criteria, Query, RelationKind, Row};
use tracing::debug;

/// Operations on the records of one entity type.
///
/// Models are cheap to clone and can be shared across threads.
#[derive(Clone)]
pub struct Model {
    db: SyncDatabase,
    schema: Arc<EntitySchema>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("table", &self.schema.table())
            .field("direction", &self.schema.direction())
            .finish()
    }
}

impl Model {
    pub(crate) fn new(db: SyncDatabase, schema: Arc<EntitySchema>) -> Self {
        Self { db, schema }
    }

    /// The type's schema.
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// The type's table.
    pub fn table(&self) -> &str {
        self.schema.table()
    }

    /// The type's sync direction.
    pub fn sync_direction(&self) -> SyncDirection {
        self.schema.direction()
    }

    /// Columns left out of exports.
    pub fn excluded_sync_columns(&self) -> &[String] {
        self.schema.excluded_columns()
    }

    /// Relations embedded into uploads.
    pub fn included_sync_relations(&self) -> &[String] {
        self.schema.included_relation_names()
    }

    /// Page size of the upload-candidate query.
    pub fn upload_limit(&self) -> usize {
        self.schema
            .upload_limit_override()
            .unwrap_or(self.db.config().default_upload_limit)
    }

    /// The type's export plan.
    ///
    /// # Errors
    ///
    /// Returns an error if an included relation targets an unknown type.
    pub fn export_plan(&self) -> CoreResult<ExportPlan> {
        ExportPlan::for_schema(&self.schema, self.db.registry())
    }

    /// Reads a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stored row is malformed.
    pub fn find_one(&self, id: &str) -> CoreResult<Option<SyncableRecord>> {
        self.db
            .store()
            .find_one(self.table(), id)?
            .map(|row| SyncableRecord::from_row(self.table(), row))
            .transpose()
    }

    /// Reads a record by id with its included sync relations loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stored row is malformed.
    pub fn find_one_for_export(&self, id: &str) -> CoreResult<Option<SyncableRecord>> {
        let query = Query::table(self.table())
            .criteria(Criteria::by_id(id))
            .limit(1)
            .with_relations(self.schema.included_relations());
        self.db
            .store()
            .query(&query)?
            .into_iter()
            .next()
            .map(|row| SyncableRecord::from_row(self.table(), row))
            .transpose()
    }

    /// Counts the type's records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn count(&self) -> CoreResult<usize> {
        Ok(self.db.store().count(self.table(), &Criteria::all())?)
    }

    /// Counts the type's records awaiting upload.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn count_marked_for_upload(&self) -> CoreResult<usize> {
        let criteria = Criteria::all().eq(columns::MARKED_FOR_UPLOAD, true);
        Ok(self.db.store().count(self.table(), &criteria)?)
    }

    /// Stores a new record.
    ///
    /// Assigns an id if the record has none, stamps `createdAt` and
    /// `updatedAt`, forces `markedForUpload` and stamps field ticks.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken or the store fails.
    pub fn create(&self, record: &mut SyncableRecord) -> CoreResult<()> {
        if record.id.is_empty() {
            record.id = RecordId::generate();
        }
        let now = Utc::now();
        record.created_at = Some(now);
        record.updated_at = Some(now);
        record.marked_for_upload = true;
        self.sync_foreign_keys(record);
        self.stamp_field_ticks(record, None)?;

        let row = self.persisted_row(record);
        let table = self.table();
        self.db
            .locks()
            .run_exclusive(table, || self.db.store().insert(table, row))?;
        debug!(table, id = %record.id, "record created");
        Ok(())
    }

    /// Persists local changes to a record, creating it if it is not stored.
    ///
    /// Field ticks are recomputed against the stored version, then the
    /// in-memory flag is set and the whole row is written under the type
    /// lock. A failed write leaves the in-memory record marked.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn save(&self, record: &mut SyncableRecord) -> CoreResult<()> {
        let previous = if record.id.is_empty() {
            None
        } else {
            self.find_one(record.id.as_str())?
        };
        let Some(previous) = previous else {
            return self.create(record);
        };

        record.updated_at = Some(Utc::now());
        record.created_at = record.created_at.or(previous.created_at);
        self.sync_foreign_keys(record);
        self.stamp_field_ticks(record, Some(&previous))?;
        record.marked_for_upload = true;

        let row = self.persisted_row(record);
        let table = self.table();
        let criteria = Criteria::by_id(record.id.as_str());
        self.db
            .locks()
            .run_exclusive(table, || self.db.store().update(table, &criteria, &row))?;
        debug!(table, id = %record.id, "record saved");
        Ok(())
    }

    /// Deletes a record. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn remove(&self, id: &str) -> CoreResult<bool> {
        let removed = self.db.store().delete(self.table(), &Criteria::by_id(id))?;
        debug!(table = self.table(), id, removed, "record removed");
        Ok(removed > 0)
    }

    /// Copies the id of each embedded belongs-to object into its foreign key.
    fn sync_foreign_keys(&self, record: &mut SyncableRecord) {
        for relation in self.schema.relations() {
            if let RelationKind::BelongsTo { foreign_key } = &relation.kind {
                if record.fields.contains_key(&relation.name) {
                    let value = resolved_column_value(&self.schema, record, foreign_key);
                    record.fields.insert(foreign_key.clone(), value);
                }
            }
        }
    }

    fn stamp_field_ticks(
        &self,
        record: &mut SyncableRecord,
        previous: Option<&SyncableRecord>,
    ) -> CoreResult<()> {
        if !self.sync_direction().tracks_field_changes() {
            return Ok(());
        }
        let tick = self.db.sync_ticks().current()?;
        if let Some(text) = compute_updated_at_by_field(&self.schema, record, previous, tick)? {
            record.updated_at_by_field = Some(text);
        }
        Ok(())
    }

    /// The record's declared columns. Loaded relations and unknown fields
    /// are dropped.
    fn persisted_row(&self, record: &SyncableRecord) -> Row {
        record
            .to_row()
            .into_iter()
            .filter(|(column, _)| self.schema.has_column(column))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use crate::types::SyncTick;
    use crate::Config;
    use tamanu_codec::Value;
    use tamanu_storage::{InMemoryStore, RecordStore};

    fn db() -> SyncDatabase {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntitySchema::new("encounters", SyncDirection::Bidirectional)
                    .columns(["encounterType", "reasonForEncounter"])
                    .belongs_to("patient", "patients", "patientId"),
            )
            .unwrap();
        registry
            .register(EntitySchema::new("patients", SyncDirection::Bidirectional).columns(["firstName"]))
            .unwrap();
        registry
            .register(EntitySchema::new("notes", SyncDirection::PushToCentral).columns(["content"]))
            .unwrap();
        SyncDatabase::new(Arc::new(InMemoryStore::new()), registry, Config::default())
    }

    #[test]
    fn create_stamps_and_marks() {
        let db = db();
        db.sync_ticks().set_current(SyncTick(3)).unwrap();
        let encounters = db.model("encounters").unwrap();

        let mut record = SyncableRecord::with_id("").with("encounterType", "clinic");
        record.marked_for_upload = false;
        encounters.create(&mut record).unwrap();

        assert!(!record.id.is_empty());
        assert!(record.created_at.is_some());
        assert!(record.marked_for_upload);
        let stored = encounters.find_one(record.id.as_str()).unwrap().unwrap();
        assert!(stored.marked_for_upload);
        assert_eq!(stored.field_ticks().get("encounterType"), Some(&3));
        assert_eq!(stored.field_ticks().get("id"), Some(&3));
    }

    #[test]
    fn create_rejects_duplicate_ids() {
        let db = db();
        let notes = db.model("notes").unwrap();
        notes.create(&mut SyncableRecord::with_id("N1")).unwrap();
        assert!(notes.create(&mut SyncableRecord::with_id("N1")).is_err());
    }

    #[test]
    fn save_remarks_uploaded_record() {
        let db = db();
        let notes = db.model("notes").unwrap();
        let mut record = SyncableRecord::with_id("N1").with("content", "draft");
        notes.create(&mut record).unwrap();
        notes.mark_uploaded(&[record.id.clone()], Utc::now()).unwrap();
        assert!(!notes.find_one("N1").unwrap().unwrap().marked_for_upload);

        let mut record = notes.find_one("N1").unwrap().unwrap();
        record.set("content", "final");
        notes.save(&mut record).unwrap();

        let stored = notes.find_one("N1").unwrap().unwrap();
        assert!(stored.marked_for_upload);
        assert!(stored.uploaded_at.is_some());
        assert_eq!(stored.get("content"), Some(&Value::from("final")));
        // push-only types keep no field ticks
        assert!(stored.updated_at_by_field.is_none());
    }

    #[test]
    fn save_without_stored_row_creates() {
        let db = db();
        let notes = db.model("notes").unwrap();
        let mut record = SyncableRecord::with_id("N2");
        notes.save(&mut record).unwrap();
        assert_eq!(notes.count().unwrap(), 1);
    }

    #[test]
    fn save_advances_only_changed_ticks() {
        let db = db();
        let encounters = db.model("encounters").unwrap();
        db.sync_ticks().set_current(SyncTick(5)).unwrap();
        let mut record = SyncableRecord::with_id("E1")
            .with("encounterType", "clinic")
            .with("reasonForEncounter", "cough");
        encounters.create(&mut record).unwrap();

        db.sync_ticks().set_current(SyncTick(7)).unwrap();
        let mut record = encounters.find_one("E1").unwrap().unwrap();
        record.set("reasonForEncounter", "fever");
        encounters.save(&mut record).unwrap();

        let ticks = encounters.find_one("E1").unwrap().unwrap().field_ticks();
        assert_eq!(ticks.get("encounterType"), Some(&5));
        assert_eq!(ticks.get("reasonForEncounter"), Some(&7));
    }

    #[test]
    fn embedded_parent_object_becomes_foreign_key() {
        let db = db();
        let encounters = db.model("encounters").unwrap();
        let mut record = SyncableRecord::with_id("E1").with(
            "patient",
            Value::object([("id", Value::from("P1")), ("firstName", Value::from("Ana"))]),
        );
        encounters.create(&mut record).unwrap();

        let row = db.store().find_one("encounters", "E1").unwrap().unwrap();
        assert_eq!(row.get("patientId"), Some(&Value::from("P1")));
        assert!(!row.contains_key("patient"));
    }

    #[test]
    fn remove_reports_existence() {
        let db = db();
        let notes = db.model("notes").unwrap();
        notes.create(&mut SyncableRecord::with_id("N1")).unwrap();
        assert!(notes.remove("N1").unwrap());
        assert!(!notes.remove("N1").unwrap());
    }

    #[test]
    fn upload_limit_prefers_schema_override() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntitySchema::new("vitals", SyncDirection::Bidirectional).upload_limit(20))
            .unwrap();
        registry
            .register(EntitySchema::new("notes", SyncDirection::Bidirectional))
            .unwrap();
        let db = SyncDatabase::new(
            Arc::new(InMemoryStore::new()),
            registry,
            Config::default().default_upload_limit(50),
        );
        assert_eq!(db.model("vitals").unwrap().upload_limit(), 20);
        assert_eq!(db.model("notes").unwrap().upload_limit(), 50);
    }
}
