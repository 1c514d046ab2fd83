//! Marking parents for upload when a child changes.

use super::Model;
use crate::error::CoreResult;
use crate::record::{RecordId, SyncableRecord};
use crate::schema::RELATION_ID_SUFFIX;
use std::collections::HashSet;
use tamanu_codec::Value;
use tamanu_storage::RelationKind;
use tracing::debug;

/// How a child refers to its parent in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// The parent field holds the parent's id.
    ById(RecordId),
    /// The parent field holds the loaded parent object.
    ByObject(RecordId),
    /// The parent field is empty or unrecognisable.
    Unresolved,
}

impl ParentRef {
    /// Classifies the value of a parent field.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Text(id)) if !id.is_empty() => ParentRef::ById(RecordId::from(id.as_str())),
            Some(object @ Value::Object(_)) => match object.object_id() {
                Some(id) if !id.is_empty() => ParentRef::ByObject(RecordId::from(id)),
                _ => ParentRef::Unresolved,
            },
            _ => ParentRef::Unresolved,
        }
    }

    /// The parent id, if resolved.
    pub fn id(&self) -> Option<&RecordId> {
        match self {
            ParentRef::ById(id) | ParentRef::ByObject(id) => Some(id),
            ParentRef::Unresolved => None,
        }
    }
}

impl Model {
    /// Marks the parent of `record` for upload.
    ///
    /// `parent_field` names the relation on this type (`encounter`). Its
    /// value is used when it holds an id or the parent object; otherwise
    /// the foreign key is read from the record, then from the stored row.
    /// After marking, the parent's own upload parent is marked in turn, up
    /// the chain. A parent that cannot be resolved is skipped silently.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent_type` is unknown or the store fails.
    pub fn mark_parent_for_upload(
        &self,
        record: &SyncableRecord,
        parent_type: &str,
        parent_field: &str,
    ) -> CoreResult<()> {
        let parent = self.db.model(parent_type)?;

        let parent_ref = ParentRef::from_value(record.get(parent_field));
        let parent_id = match parent_ref.id() {
            Some(id) => Some(id.clone()),
            None => self.lookup_parent_id(record, parent_field)?,
        };
        let Some(parent_id) = parent_id else {
            debug!(
                table = self.table(),
                id = %record.id,
                parent_field,
                "parent not resolvable, nothing to mark"
            );
            return Ok(());
        };

        let mut visited = HashSet::new();
        visited.insert((self.table().to_string(), record.id.clone()));
        parent.mark_upwards(parent_id, &mut visited)
    }

    /// Reads the parent id through the foreign key behind `parent_field`.
    fn lookup_parent_id(
        &self,
        record: &SyncableRecord,
        parent_field: &str,
    ) -> CoreResult<Option<RecordId>> {
        let foreign_key = match self.schema.relation(parent_field).map(|r| &r.kind) {
            Some(RelationKind::BelongsTo { foreign_key }) => foreign_key.clone(),
            _ => format!("{parent_field}{RELATION_ID_SUFFIX}"),
        };

        if let ParentRef::ById(id) = ParentRef::from_value(record.get(&foreign_key)) {
            return Ok(Some(id));
        }
        let stored = self.db.store().find_one(self.table(), record.id.as_str())?;
        Ok(stored
            .as_ref()
            .and_then(|row| row.get(&foreign_key))
            .and_then(|value| ParentRef::from_value(Some(value)).id().cloned()))
    }

    /// Marks `id`, then follows upload parents until a type has none.
    fn mark_upwards(
        &self,
        id: RecordId,
        visited: &mut HashSet<(String, RecordId)>,
    ) -> CoreResult<()> {
        let max_depth = self.db.config().max_parent_depth;
        let mut model = self.clone();
        let mut id = id;

        for _ in 0..max_depth {
            if !visited.insert((model.table().to_string(), id.clone())) {
                debug!(table = model.table(), %id, "upload parent cycle, stopping");
                return Ok(());
            }
            model.mark_for_upload(id.as_str())?;

            let Some(relation) = model.schema.upload_parent_relation() else {
                return Ok(());
            };
            let RelationKind::BelongsTo { foreign_key } = &relation.kind else {
                return Ok(());
            };
            let next_model = model.db.model(&relation.target_table)?;
            let next_id = model
                .db
                .store()
                .find_one(model.table(), id.as_str())?
                .and_then(|row| ParentRef::from_value(row.get(foreign_key)).id().cloned());

            let Some(next_id) = next_id else {
                return Ok(());
            };
            model = next_model;
            id = next_id;
        }
        debug!(table = model.table(), %id, max_depth, "upload parent chain truncated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, SchemaRegistry};
    use crate::{Config, SyncDatabase, SyncDirection};
    use chrono::Utc;
    use std::sync::Arc;
    use tamanu_storage::InMemoryStore;

    fn db() -> SyncDatabase {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntitySchema::new("encounters", SyncDirection::Bidirectional))
            .unwrap();
        registry
            .register(
                EntitySchema::new("lab_requests", SyncDirection::Bidirectional)
                    .belongs_to("encounter", "encounters", "encounterId")
                    .upload_parent("encounter"),
            )
            .unwrap();
        registry
            .register(
                EntitySchema::new("lab_tests", SyncDirection::Bidirectional)
                    .belongs_to("labRequest", "lab_requests", "labRequestId")
                    .upload_parent("labRequest"),
            )
            .unwrap();
        SyncDatabase::new(Arc::new(InMemoryStore::new()), registry, Config::default())
    }

    /// Stores `E1 <- L1 <- T1`, all confirmed uploaded.
    fn seeded() -> SyncDatabase {
        let db = db();
        let encounters = db.model("encounters").unwrap();
        let requests = db.model("lab_requests").unwrap();
        let tests = db.model("lab_tests").unwrap();
        encounters.create(&mut SyncableRecord::with_id("E1")).unwrap();
        requests
            .create(&mut SyncableRecord::with_id("L1").with("encounterId", "E1"))
            .unwrap();
        tests
            .create(&mut SyncableRecord::with_id("T1").with("labRequestId", "L1"))
            .unwrap();
        for (model, id) in [(&encounters, "E1"), (&requests, "L1"), (&tests, "T1")] {
            model.mark_uploaded(&[RecordId::from(id)], Utc::now()).unwrap();
        }
        db
    }

    fn marked(db: &SyncDatabase, table: &str, id: &str) -> bool {
        db.model(table)
            .unwrap()
            .find_one(id)
            .unwrap()
            .unwrap()
            .marked_for_upload
    }

    #[test]
    fn parent_ref_shapes() {
        assert_eq!(
            ParentRef::from_value(Some(&Value::from("E1"))),
            ParentRef::ById("E1".into())
        );
        assert_eq!(
            ParentRef::from_value(Some(&Value::object([("id", Value::from("E1"))]))),
            ParentRef::ByObject("E1".into())
        );
        assert_eq!(ParentRef::from_value(Some(&Value::Integer(4))), ParentRef::Unresolved);
        assert_eq!(ParentRef::from_value(Some(&Value::from(""))), ParentRef::Unresolved);
        assert_eq!(ParentRef::from_value(None), ParentRef::Unresolved);
    }

    #[test]
    fn marks_parent_by_id() {
        let db = seeded();
        let requests = db.model("lab_requests").unwrap();
        let record = SyncableRecord::with_id("L1").with("encounter", "E1");
        requests
            .mark_parent_for_upload(&record, "encounters", "encounter")
            .unwrap();
        assert!(marked(&db, "encounters", "E1"));
    }

    #[test]
    fn marks_parent_by_object() {
        let db = seeded();
        let requests = db.model("lab_requests").unwrap();
        let record = SyncableRecord::with_id("L1")
            .with("encounter", Value::object([("id", Value::from("E1"))]));
        requests
            .mark_parent_for_upload(&record, "encounters", "encounter")
            .unwrap();
        assert!(marked(&db, "encounters", "E1"));
    }

    #[test]
    fn falls_back_to_stored_foreign_key() {
        let db = seeded();
        let requests = db.model("lab_requests").unwrap();
        let record = SyncableRecord::with_id("L1");
        requests
            .mark_parent_for_upload(&record, "encounters", "encounter")
            .unwrap();
        assert!(marked(&db, "encounters", "E1"));
    }

    #[test]
    fn recurses_up_the_chain() {
        let db = seeded();
        let tests = db.model("lab_tests").unwrap();
        let record = tests.find_one("T1").unwrap().unwrap();
        tests
            .mark_parent_for_upload(&record, "lab_requests", "labRequest")
            .unwrap();
        assert!(marked(&db, "lab_requests", "L1"));
        assert!(marked(&db, "encounters", "E1"));
        assert!(!marked(&db, "lab_tests", "T1"));
    }

    #[test]
    fn unresolvable_parent_is_noop() {
        let db = seeded();
        let requests = db.model("lab_requests").unwrap();
        let record = SyncableRecord::with_id("unsaved");
        requests
            .mark_parent_for_upload(&record, "encounters", "encounter")
            .unwrap();
        assert!(!marked(&db, "encounters", "E1"));
    }

    #[test]
    fn unknown_parent_type_is_an_error() {
        let db = seeded();
        let requests = db.model("lab_requests").unwrap();
        let record = SyncableRecord::with_id("L1");
        assert!(requests
            .mark_parent_for_upload(&record, "facilities", "facility")
            .is_err());
    }

    #[test]
    fn cycles_terminate() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntitySchema::new("notes", SyncDirection::Bidirectional)
                    .belongs_to("parentNote", "notes", "parentNoteId")
                    .upload_parent("parentNote"),
            )
            .unwrap();
        let db = SyncDatabase::new(Arc::new(InMemoryStore::new()), registry, Config::default());
        let notes = db.model("notes").unwrap();
        notes
            .create(&mut SyncableRecord::with_id("A").with("parentNoteId", "B"))
            .unwrap();
        notes
            .create(&mut SyncableRecord::with_id("B").with("parentNoteId", "A"))
            .unwrap();
        notes
            .mark_uploaded(&[RecordId::from("A"), RecordId::from("B")], Utc::now())
            .unwrap();
        let child = SyncableRecord::with_id("C").with("parentNote", "A");

        notes.mark_parent_for_upload(&child, "notes", "parentNote").unwrap();
        assert!(marked(&db, "notes", "A"));
        assert!(marked(&db, "notes", "B"));
    }
}
