//! The pull-merge path: writing records received from central.

use super::Model;
use crate::error::{CoreError, CoreResult};
use crate::export::SyncRecord;
use crate::record::{columns, SyncableRecord};
use chrono::Utc;
use tamanu_codec::Value;
use tamanu_storage::{Criteria, RelationKind};
use tracing::debug;

/// What importing one record did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// A new record was stored.
    Created,
    /// An existing record was overwritten.
    Updated,
    /// The record was deleted centrally and removed locally.
    Deleted,
}

impl Model {
    /// Writes a downloaded record.
    ///
    /// Deleted records are removed. Others are upserted with
    /// `markedForUpload = false` so they are not echoed back, and every set
    /// tracked field is stamped with the current tick. Embedded has-many
    /// relations the type includes are imported into their own types.
    ///
    /// # Errors
    ///
    /// Returns an error if the type does not pull, the record has no id, or
    /// the store fails.
    pub fn import_record(&self, incoming: &SyncRecord) -> CoreResult<ImportOutcome> {
        if !self.sync_direction().pulls() {
            return Err(CoreError::DirectionMismatch {
                table: self.table().to_string(),
                direction: self.sync_direction(),
                operation: "import",
            });
        }
        let Some(id) = incoming.id() else {
            return Err(CoreError::invalid_record(
                self.table(),
                "incoming record has no id",
            ));
        };

        if incoming.is_deleted {
            self.remove(id)?;
            return Ok(ImportOutcome::Deleted);
        }

        let mut record = SyncableRecord::from_row(self.table(), incoming.data.clone())?;
        record.marked_for_upload = false;
        record.updated_at = Some(Utc::now());
        self.sync_foreign_keys(&mut record);
        self.stamp_field_ticks(&mut record, None)?;
        let children = self.embedded_children(&record);

        let mut row = self.persisted_row(&record);
        row.insert(columns::MARKED_FOR_UPLOAD.into(), Value::Bool(false));

        let table = self.table();
        let store = self.db.store();
        let outcome = self.db.locks().run_exclusive(table, || -> CoreResult<_> {
            if store.update(table, &Criteria::by_id(id), &row)? > 0 {
                return Ok(ImportOutcome::Updated);
            }
            row.entry(columns::CREATED_AT.into())
                .or_insert_with(|| record.value_of(columns::UPDATED_AT));
            store.insert(table, row)?;
            Ok(ImportOutcome::Created)
        })?;
        debug!(table, id, ?outcome, "record imported");

        for (child_model, child) in children {
            child_model.import_record(&child)?;
        }
        Ok(outcome)
    }

    /// Collects included has-many rows embedded in `record`, with their
    /// foreign key pointing at it.
    fn embedded_children(&self, record: &SyncableRecord) -> Vec<(Model, SyncRecord)> {
        let mut children = Vec::new();
        for relation in self.schema.included_relations() {
            let RelationKind::HasMany { foreign_key } = &relation.kind else {
                continue;
            };
            let Some(Value::Array(rows)) = record.get(&relation.name) else {
                continue;
            };
            let child_model = match self.db.model(&relation.target_table) {
                Ok(model) if model.sync_direction().pulls() => model,
                _ => {
                    debug!(
                        table = self.table(),
                        relation = %relation.name,
                        "embedded relation not importable, skipping"
                    );
                    continue;
                }
            };
            for child in rows.iter().filter_map(Value::as_object) {
                let mut data = child.clone();
                data.insert(foreign_key.clone(), record.value_of(columns::ID));
                children.push((
                    child_model.clone(),
                    SyncRecord {
                        data,
                        is_deleted: false,
                    },
                ));
            }
        }
        children
    }
}
