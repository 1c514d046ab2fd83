//! The syncable record every persisted entity is stored as.

pub mod columns;
mod id;

pub use id::RecordId;

use crate::error::{CoreError, CoreResult};
use crate::field_ticks::{parse_field_ticks, FieldTicks};
use crate::types::{timestamp_from_value, timestamp_to_value, Timestamp};
use tamanu_codec::Value;
use tamanu_storage::Row;

/// A persisted clinical entity: base sync columns plus dynamic fields.
///
/// `fields` holds every non-base column, and after a query with eager
/// loading also the loaded relations (an object for belongs-to, an array
/// for has-many). Relation fields are never written back as columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncableRecord {
    /// Unique identifier, immutable once stored.
    pub id: RecordId,
    /// Set when the record is first stored.
    pub created_at: Option<Timestamp>,
    /// Set on every local save.
    pub updated_at: Option<Timestamp>,
    /// True while local changes await upload.
    pub marked_for_upload: bool,
    /// Time of the last confirmed upload.
    pub uploaded_at: Option<Timestamp>,
    /// Soft-delete time.
    pub deleted_at: Option<Timestamp>,
    /// Serialized field-to-tick map, kept as the exact stored text.
    pub updated_at_by_field: Option<String>,
    /// All other columns and loaded relations.
    pub fields: Row,
}

impl Default for SyncableRecord {
    fn default() -> Self {
        Self::with_id(RecordId::default())
    }
}

impl SyncableRecord {
    /// Creates an unsaved record with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(RecordId::generate())
    }

    /// Creates an unsaved record with the given id.
    pub fn with_id(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            created_at: None,
            updated_at: None,
            marked_for_upload: true,
            uploaded_at: None,
            deleted_at: None,
            updated_at_by_field: None,
            fields: Row::new(),
        }
    }

    /// Sets a field, builder style.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets a field.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Reads a dynamic field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Reads any column, base columns included. Unset columns read as null.
    pub fn value_of(&self, column: &str) -> Value {
        match column {
            columns::ID => Value::Text(self.id.as_str().to_string()),
            columns::CREATED_AT => self.created_at.map_or(Value::Null, timestamp_to_value),
            columns::UPDATED_AT => self.updated_at.map_or(Value::Null, timestamp_to_value),
            columns::MARKED_FOR_UPLOAD => Value::Bool(self.marked_for_upload),
            columns::UPLOADED_AT => self.uploaded_at.map_or(Value::Null, timestamp_to_value),
            columns::DELETED_AT => self.deleted_at.map_or(Value::Null, timestamp_to_value),
            columns::UPDATED_AT_BY_FIELD => self.updated_at_by_field.clone().into(),
            _ => self.fields.get(column).cloned().unwrap_or_default(),
        }
    }

    /// Returns true if the record is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Parses the field tick map. Unreadable text reads as empty.
    pub fn field_ticks(&self) -> FieldTicks {
        parse_field_ticks(self.updated_at_by_field.as_deref())
    }

    /// Builds a record from a stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row has no text id.
    pub fn from_row(table: &str, mut row: Row) -> CoreResult<Self> {
        let id = match row.remove(columns::ID) {
            Some(Value::Text(id)) => RecordId::from(id),
            _ => return Err(CoreError::invalid_record(table, "row has no text id")),
        };

        let mut take_ts = |column: &str| row.remove(column).as_ref().and_then(timestamp_from_value);
        let created_at = take_ts(columns::CREATED_AT);
        let updated_at = take_ts(columns::UPDATED_AT);
        let uploaded_at = take_ts(columns::UPLOADED_AT);
        let deleted_at = take_ts(columns::DELETED_AT);

        let marked_for_upload = match row.remove(columns::MARKED_FOR_UPLOAD) {
            Some(Value::Bool(flag)) => flag,
            Some(Value::Integer(flag)) => flag != 0,
            _ => true,
        };
        let updated_at_by_field = match row.remove(columns::UPDATED_AT_BY_FIELD) {
            Some(Value::Text(text)) => Some(text),
            _ => None,
        };

        Ok(Self {
            id,
            created_at,
            updated_at,
            marked_for_upload,
            uploaded_at,
            deleted_at,
            updated_at_by_field,
            fields: row,
        })
    }

    /// Flattens the record into a row.
    ///
    /// Unset optional base columns are omitted so that a partial update
    /// leaves their stored values alone.
    pub fn to_row(&self) -> Row {
        let mut row = self.fields.clone();
        row.insert(columns::ID.into(), self.value_of(columns::ID));
        row.insert(
            columns::MARKED_FOR_UPLOAD.into(),
            Value::Bool(self.marked_for_upload),
        );
        for column in [
            columns::CREATED_AT,
            columns::UPDATED_AT,
            columns::UPLOADED_AT,
            columns::DELETED_AT,
            columns::UPDATED_AT_BY_FIELD,
        ] {
            let value = self.value_of(column);
            if !value.is_null() {
                row.insert(column.into(), value);
            }
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn new_record_is_marked() {
        let record = SyncableRecord::new();
        assert!(record.marked_for_upload);
        assert!(!record.id.is_empty());
        assert!(record.updated_at_by_field.is_none());
    }

    #[test]
    fn row_roundtrip_separates_base_columns() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut record = SyncableRecord::with_id("E1")
            .with("encounterType", "clinic")
            .with("patientId", "P1");
        record.created_at = Some(ts);
        record.marked_for_upload = false;
        record.updated_at_by_field = Some(r#"{"encounterType":3}"#.into());

        let row = record.to_row();
        assert_eq!(row.get("id"), Some(&Value::from("E1")));
        assert_eq!(row.get("markedForUpload"), Some(&Value::Bool(false)));
        assert!(!row.contains_key("uploadedAt"));

        let back = SyncableRecord::from_row("encounters", row).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.fields.len(), 2);
    }

    #[test]
    fn integer_flags_are_accepted() {
        let mut row = Row::new();
        row.insert("id".into(), "A".into());
        row.insert("markedForUpload".into(), Value::Integer(0));
        let record = SyncableRecord::from_row("vitals", row).unwrap();
        assert!(!record.marked_for_upload);
    }

    #[test]
    fn missing_id_is_rejected() {
        let err = SyncableRecord::from_row("vitals", Row::new()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRecord { .. }));
    }

    #[test]
    fn value_of_reads_base_and_dynamic_columns() {
        let record = SyncableRecord::with_id("X").with("weight", 3);
        assert_eq!(record.value_of("id"), Value::from("X"));
        assert_eq!(record.value_of("weight"), Value::Integer(3));
        assert_eq!(record.value_of("height"), Value::Null);
        assert_eq!(record.value_of("uploadedAt"), Value::Null);
    }

    #[test]
    fn malformed_ticks_read_as_empty() {
        let mut record = SyncableRecord::with_id("X");
        record.updated_at_by_field = Some("not json".into());
        assert!(record.field_ticks().is_empty());
    }
}
