//! The upload-marking contract and the upload-candidate query.

use super::Model;
use crate::channel::Channel;
use crate::error::CoreResult;
use crate::record::{columns, RecordId, SyncableRecord};
use crate::types::{timestamp_to_value, Timestamp};
use tamanu_codec::Value;
use tamanu_storage::{Criteria, Query, Row};
use tracing::debug;

/// Parameters of [`Model::find_marked_for_upload`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadQuery {
    /// Channel the page is uploaded on.
    pub channel: String,
    /// Page size; the type's upload limit when unset.
    pub limit: Option<usize>,
    /// Only ids strictly greater than this are returned.
    pub after: Option<RecordId>,
}

impl UploadQuery {
    /// Queries the first page of `channel`.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            limit: None,
            after: None,
        }
    }

    /// Sets the page size.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resumes after `id`.
    #[must_use]
    pub fn after(mut self, id: impl Into<RecordId>) -> Self {
        self.after = Some(id.into());
        self
    }
}

impl Model {
    /// Flags a record as needing upload.
    ///
    /// The write holds the type's exclusive lock, so concurrent marks on
    /// the same type are applied one after another. Returns false if no
    /// record has that id.
    ///
    /// # Errors
    ///
    /// Store failures are returned unchanged; the lock is released either way.
    pub fn mark_for_upload(&self, id: &str) -> CoreResult<bool> {
        let mut partial = Row::new();
        partial.insert(columns::MARKED_FOR_UPLOAD.into(), Value::Bool(true));

        let table = self.table();
        let changed = self.db.locks().run_exclusive(table, || {
            self.db.store().update(table, &Criteria::by_id(id), &partial)
        })?;
        debug!(table, id, changed, "marked for upload");
        Ok(changed > 0)
    }

    /// Confirms an upload: clears the flag and stamps `uploadedAt` on every
    /// listed record in one store call.
    ///
    /// Returns the number of records changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn mark_uploaded(&self, ids: &[RecordId], uploaded_at: Timestamp) -> CoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut partial = Row::new();
        partial.insert(columns::MARKED_FOR_UPLOAD.into(), Value::Bool(false));
        partial.insert(columns::UPLOADED_AT.into(), timestamp_to_value(uploaded_at));

        let criteria = Criteria::by_ids(ids.iter().map(RecordId::as_str));
        let changed = self.db.store().update(self.table(), &criteria, &partial)?;
        debug!(table = self.table(), requested = ids.len(), changed, "marked uploaded");
        Ok(changed)
    }

    /// Returns one page of records awaiting upload, ascending by id, with
    /// the type's included sync relations loaded.
    ///
    /// Types that do not push return an empty page. Passing the last id of
    /// a page as `after` yields the next page; the cursor is a pure
    /// inequality, so it stays valid even if that record is deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn find_marked_for_upload(&self, query: &UploadQuery) -> CoreResult<Vec<SyncableRecord>> {
        if !self.sync_direction().pushes() {
            debug!(
                table = self.table(),
                direction = %self.sync_direction(),
                "type does not push, no upload candidates"
            );
            return Ok(Vec::new());
        }

        let mut criteria = Criteria::all().eq(columns::MARKED_FOR_UPLOAD, true);
        if let Some(after) = &query.after {
            criteria = criteria.gt(columns::ID, after.as_str());
        }
        let channel = Channel::parse(&query.channel);
        if let (Some(patient_id), Some(scope)) =
            (channel.patient_id(), self.schema.channel_scope_column())
        {
            criteria = criteria.eq(scope, patient_id);
        }

        let store_query = Query::table(self.table())
            .criteria(criteria)
            .order_by_id()
            .limit(query.limit.unwrap_or_else(|| self.upload_limit()))
            .with_relations(self.schema.included_relations());

        self.db
            .store()
            .query(&store_query)?
            .into_iter()
            .map(|row| SyncableRecord::from_row(self.table(), row))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, SchemaRegistry};
    use crate::{Config, SyncDatabase, SyncDirection};
    use chrono::Utc;
    use std::sync::Arc;
    use tamanu_storage::{InMemoryStore, RecordStore};

    fn db() -> SyncDatabase {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntitySchema::new("encounters", SyncDirection::Bidirectional)
                    .columns(["encounterType"])
                    .belongs_to("patient", "patients", "patientId")
                    .has_many("vitals", "vitals", "encounterId")
                    .include_relations(["vitals"])
                    .channel_scope("patientId"),
            )
            .unwrap();
        registry
            .register(
                EntitySchema::new("vitals", SyncDirection::Bidirectional)
                    .columns(["weight"])
                    .belongs_to("encounter", "encounters", "encounterId"),
            )
            .unwrap();
        registry
            .register(EntitySchema::new("reference_data", SyncDirection::PullFromCentral))
            .unwrap();
        SyncDatabase::new(Arc::new(InMemoryStore::new()), registry, Config::default())
    }

    fn ids(records: &[SyncableRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn pages_ascending_by_id() {
        let db = db();
        let encounters = db.model("encounters").unwrap();
        for id in ["E3", "E1", "E5", "E2", "E4"] {
            encounters.create(&mut SyncableRecord::with_id(id)).unwrap();
        }

        let first = encounters
            .find_marked_for_upload(&UploadQuery::new("encounter").limit(2))
            .unwrap();
        assert_eq!(ids(&first), vec!["E1", "E2"]);

        let second = encounters
            .find_marked_for_upload(&UploadQuery::new("encounter").limit(2).after("E2"))
            .unwrap();
        assert_eq!(ids(&second), vec!["E3", "E4"]);
    }

    #[test]
    fn cursor_survives_deleted_row() {
        let db = db();
        let encounters = db.model("encounters").unwrap();
        for id in ["E1", "E2", "E3"] {
            encounters.create(&mut SyncableRecord::with_id(id)).unwrap();
        }
        encounters.remove("E2").unwrap();

        let page = encounters
            .find_marked_for_upload(&UploadQuery::new("encounter").after("E2"))
            .unwrap();
        assert_eq!(ids(&page), vec!["E3"]);
    }

    #[test]
    fn mark_uploaded_removes_from_query() {
        let db = db();
        let encounters = db.model("encounters").unwrap();
        encounters.create(&mut SyncableRecord::with_id("E1")).unwrap();
        encounters.create(&mut SyncableRecord::with_id("E2")).unwrap();

        let uploaded_at = Utc::now();
        let changed = encounters
            .mark_uploaded(&[RecordId::from("E1")], uploaded_at)
            .unwrap();
        assert_eq!(changed, 1);

        let page = encounters
            .find_marked_for_upload(&UploadQuery::new("encounter"))
            .unwrap();
        assert_eq!(ids(&page), vec!["E2"]);

        let stored = encounters.find_one("E1").unwrap().unwrap();
        assert!(!stored.marked_for_upload);
        assert_eq!(
            stored.uploaded_at.map(|t| t.timestamp_millis()),
            Some(uploaded_at.timestamp_millis())
        );
    }

    #[test]
    fn mark_uploaded_with_no_ids_is_noop() {
        let db = db();
        let encounters = db.model("encounters").unwrap();
        assert_eq!(encounters.mark_uploaded(&[], Utc::now()).unwrap(), 0);
    }

    #[test]
    fn mark_for_upload_reports_missing() {
        let db = db();
        let encounters = db.model("encounters").unwrap();
        encounters.create(&mut SyncableRecord::with_id("E1")).unwrap();
        encounters
            .mark_uploaded(&[RecordId::from("E1")], Utc::now())
            .unwrap();

        assert!(encounters.mark_for_upload("E1").unwrap());
        assert!(encounters.find_one("E1").unwrap().unwrap().marked_for_upload);
        assert!(!encounters.mark_for_upload("nope").unwrap());
        assert!(!db.locks().is_locked("encounters"));
    }

    #[test]
    fn pull_only_types_have_no_candidates() {
        let db = db();
        let mut row = Row::new();
        row.insert("id".into(), Value::from("R1"));
        row.insert("markedForUpload".into(), Value::Bool(true));
        db.store().insert("reference_data", row).unwrap();

        let reference = db.model("reference_data").unwrap();
        let page = reference
            .find_marked_for_upload(&UploadQuery::new("reference_data"))
            .unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn patient_channels_filter_by_scope() {
        let db = db();
        let encounters = db.model("encounters").unwrap();
        encounters
            .create(&mut SyncableRecord::with_id("E1").with("patientId", "P1"))
            .unwrap();
        encounters
            .create(&mut SyncableRecord::with_id("E2").with("patientId", "P2"))
            .unwrap();

        let page = encounters
            .find_marked_for_upload(&UploadQuery::new("patient/P2/encounter"))
            .unwrap();
        assert_eq!(ids(&page), vec!["E2"]);

        let all = encounters
            .find_marked_for_upload(&UploadQuery::new("encounter"))
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn included_relations_are_loaded() {
        let db = db();
        let encounters = db.model("encounters").unwrap();
        let vitals = db.model("vitals").unwrap();
        encounters.create(&mut SyncableRecord::with_id("E1")).unwrap();
        vitals
            .create(&mut SyncableRecord::with_id("V1").with("encounterId", "E1"))
            .unwrap();

        let page = encounters
            .find_marked_for_upload(&UploadQuery::new("encounter"))
            .unwrap();
        let loaded = page[0].get("vitals").and_then(Value::as_array).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].object_id(), Some("V1"));
    }
}
