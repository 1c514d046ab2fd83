//! Field-level change tracking for bidirectional types.
//!
//! Each bidirectional record keeps `updatedAtByField`, a JSON map from field
//! name to the sync tick at which that field last changed locally. Central
//! uses it to merge concurrent edits field by field.

use crate::error::CoreResult;
use crate::record::{columns, SyncableRecord};
use crate::schema::EntitySchema;
use crate::types::SyncTick;
use std::collections::BTreeMap;
use tamanu_codec::{parse_json_column, to_json_text, Value};
use tamanu_storage::values_equal;
use tracing::debug;

/// Field name to the tick it last changed at.
pub type FieldTicks = BTreeMap<String, u64>;

/// Parses stored tick text. Missing or malformed text reads as empty.
pub fn parse_field_ticks(text: Option<&str>) -> FieldTicks {
    parse_json_column(columns::UPDATED_AT_BY_FIELD, text)
}

/// The value a column will be persisted with.
///
/// A foreign key column backed by a belongs-to relation takes the id of the
/// related object when the record holds it (as an embedded object or a
/// plain id in the relation field). Otherwise the column value is used.
pub fn resolved_column_value(
    schema: &EntitySchema,
    record: &SyncableRecord,
    column: &str,
) -> Value {
    if let Some(relation) = schema.belongs_to_by_foreign_key(column) {
        match record.fields.get(&relation.name) {
            Some(Value::Text(id)) => return Value::Text(id.clone()),
            Some(related @ Value::Object(_)) => {
                if let Some(id) = related.object_id() {
                    return Value::Text(id.to_string());
                }
            }
            _ => {}
        }
    }
    record.value_of(column)
}

/// Computes the `updatedAtByField` text to persist for `record`.
///
/// `previous` is the currently stored version, if any. Returns `None` when
/// the stored text must be left untouched: the type does not track fields,
/// or nothing produced a tick.
///
/// - Without a previous version, or when the record carries tick text that
///   differs from the stored text (it came from central), every tracked
///   field that is set gets `tick`. Nothing is compared.
/// - Otherwise the stored map is kept and only fields whose value differs
///   from the stored value get `tick`. If that changes nothing, the stored
///   text is returned byte for byte.
///
/// # Errors
///
/// Returns an error if the map cannot be serialized.
pub fn compute_updated_at_by_field(
    schema: &EntitySchema,
    record: &SyncableRecord,
    previous: Option<&SyncableRecord>,
    tick: SyncTick,
) -> CoreResult<Option<String>> {
    if !schema.direction().tracks_field_changes() {
        return Ok(None);
    }

    let tracked = schema.tracked_columns();
    let previous = previous.filter(|p| p.updated_at_by_field == record.updated_at_by_field);

    let Some(previous) = previous else {
        let ticks: FieldTicks = tracked
            .into_iter()
            .filter(|column| !resolved_column_value(schema, record, column).is_null())
            .map(|column| (column, tick.as_u64()))
            .collect();
        if ticks.is_empty() {
            return Ok(None);
        }
        debug!(table = schema.table(), id = %record.id, fields = ticks.len(), "stamped all set fields");
        return Ok(Some(to_json_text(&ticks)?));
    };

    let stored = previous.field_ticks();
    let mut ticks = stored.clone();
    for column in tracked {
        let old = previous.value_of(&column);
        let new = resolved_column_value(schema, record, &column);
        if !values_equal(&old, &new) {
            ticks.insert(column, tick.as_u64());
        }
    }

    if ticks.is_empty() {
        return Ok(None);
    }
    if ticks == stored {
        return Ok(previous.updated_at_by_field.clone());
    }
    debug!(table = schema.table(), id = %record.id, %tick, "field ticks advanced");
    Ok(Some(to_json_text(&ticks)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::SyncDirection;
    use proptest::prelude::*;

    fn schema() -> EntitySchema {
        EntitySchema::new("encounters", SyncDirection::Bidirectional)
            .columns(["a", "b", "markedForSync"])
            .belongs_to("patient", "patients", "patientId")
    }

    fn stored(ticks: &str) -> SyncableRecord {
        let mut record = SyncableRecord::with_id("E1")
            .with("a", 1)
            .with("b", 2)
            .with("patientId", "X");
        record.updated_at_by_field = Some(ticks.to_string());
        record
    }

    #[test]
    fn changed_field_gets_new_tick() {
        let previous = stored(r#"{"a":5,"b":5}"#);
        let mut record = previous.clone();
        record.set("a", 10);

        let text = compute_updated_at_by_field(&schema(), &record, Some(&previous), SyncTick(7))
            .unwrap()
            .unwrap();
        let ticks = parse_field_ticks(Some(&text));
        assert_eq!(ticks.get("a"), Some(&7));
        assert_eq!(ticks.get("b"), Some(&5));
        assert_eq!(ticks.len(), 2);
    }

    #[test]
    fn no_op_save_keeps_text_identical() {
        // Deliberately odd spacing: the stored bytes must survive as-is.
        let previous = stored(r#"{ "b": 5, "a": 5 }"#);
        let record = previous.clone();

        let text = compute_updated_at_by_field(&schema(), &record, Some(&previous), SyncTick(9))
            .unwrap();
        assert_eq!(text.as_deref(), Some(r#"{ "b": 5, "a": 5 }"#));
    }

    #[test]
    fn related_object_compares_by_id() {
        let previous = stored(r#"{"a":5}"#);
        let mut record = previous.clone();
        record.fields.remove("patientId");
        record.set("patient", Value::object([("id", Value::from("X"))]));

        let text = compute_updated_at_by_field(&schema(), &record, Some(&previous), SyncTick(8))
            .unwrap();
        assert_eq!(text.as_deref(), Some(r#"{"a":5}"#));

        record.set("patient", Value::object([("id", Value::from("Y"))]));
        let text = compute_updated_at_by_field(&schema(), &record, Some(&previous), SyncTick(8))
            .unwrap()
            .unwrap();
        assert_eq!(parse_field_ticks(Some(&text)).get("patientId"), Some(&8));
    }

    #[test]
    fn new_record_stamps_set_fields_only() {
        let record = SyncableRecord::with_id("E2").with("a", 1).with("b", Value::Null);
        let text = compute_updated_at_by_field(&schema(), &record, None, SyncTick(3))
            .unwrap()
            .unwrap();
        let ticks = parse_field_ticks(Some(&text));
        assert_eq!(ticks.keys().collect::<Vec<_>>(), vec!["a", "id"]);
        assert!(ticks.values().all(|t| *t == 3));
    }

    #[test]
    fn foreign_ticks_take_trusted_path() {
        let previous = stored(r#"{"a":5,"b":5}"#);
        let mut record = previous.clone();
        record.updated_at_by_field = Some(r#"{"a":1}"#.into());

        let text = compute_updated_at_by_field(&schema(), &record, Some(&previous), SyncTick(4))
            .unwrap()
            .unwrap();
        let ticks = parse_field_ticks(Some(&text));
        assert_eq!(ticks.get("a"), Some(&4));
        assert_eq!(ticks.get("b"), Some(&4));
        assert_eq!(ticks.get("patientId"), Some(&4));
    }

    #[test]
    fn plumbing_columns_are_never_tracked() {
        let previous = stored(r#"{"a":5}"#);
        let mut record = previous.clone();
        record.set("markedForSync", true);
        record.marked_for_upload = false;

        let text = compute_updated_at_by_field(&schema(), &record, Some(&previous), SyncTick(6))
            .unwrap();
        assert_eq!(text.as_deref(), Some(r#"{"a":5}"#));
    }

    #[test]
    fn untracked_directions_leave_ticks_alone() {
        let schema = EntitySchema::new("vitals", SyncDirection::PushToCentral).columns(["a"]);
        let record = SyncableRecord::with_id("V1").with("a", 1);
        let text = compute_updated_at_by_field(&schema, &record, None, SyncTick(3)).unwrap();
        assert!(text.is_none());
    }

    #[test]
    fn malformed_stored_ticks_restart_from_empty() {
        let previous = stored("{not json");
        let mut record = previous.clone();
        record.set("b", 3);

        let text = compute_updated_at_by_field(&schema(), &record, Some(&previous), SyncTick(2))
            .unwrap()
            .unwrap();
        assert_eq!(text, r#"{"b":2}"#);
    }

    proptest! {
        #[test]
        fn unchanged_fields_keep_their_ticks(
            a in 0i64..5,
            b in 0i64..5,
            new_a in 0i64..5,
            tick in 10u64..100,
        ) {
            let mut previous = SyncableRecord::with_id("E1").with("a", a).with("b", b);
            previous.updated_at_by_field = Some(r#"{"a":1,"b":2}"#.into());
            let mut record = previous.clone();
            record.set("a", new_a);

            let text = compute_updated_at_by_field(&schema(), &record, Some(&previous), SyncTick(tick))
                .unwrap()
                .unwrap();
            let ticks = parse_field_ticks(Some(&text));
            prop_assert_eq!(ticks.get("b"), Some(&2));
            let expected_a = if a == new_a { 1 } else { tick };
            prop_assert_eq!(ticks.get("a"), Some(&expected_a));
            if a == new_a {
                prop_assert_eq!(text, r#"{"a":1,"b":2}"#);
            }
        }
    }
}
