//! In-memory record store.

use crate::backend::RecordStore;
use crate::error::{StorageError, StorageResult};
use crate::query::{
    compare_values, row_id, values_equal, Criteria, Query, RelationKind, RelationSpec, Row,
    SortOrder, ID_COLUMN,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Read;
use tamanu_codec::Value;

type Table = BTreeMap<String, Row>;

/// An in-memory record store.
///
/// Rows are kept per table in id order, so id-ascending queries are a plain
/// scan. Suitable for:
/// - Unit and integration tests
/// - Loading a JSON dump for inspection tooling
/// - Ephemeral databases that don't need persistence
///
/// # Thread Safety
///
/// Every trait method takes the internal lock once, so each call is atomic
/// with respect to other calls.
///
/// # Example
///
/// ```rust
/// use tamanu_storage::{Criteria, InMemoryStore, RecordStore, Row};
/// use tamanu_codec::Value;
///
/// let store = InMemoryStore::new();
/// let mut row = Row::new();
/// row.insert("id".into(), Value::from("P1"));
/// row.insert("markedForUpload".into(), Value::Bool(true));
/// store.insert("patients", row).unwrap();
///
/// let mut partial = Row::new();
/// partial.insert("markedForUpload".into(), Value::Bool(false));
/// let changed = store.update("patients", &Criteria::by_id("P1"), &partial).unwrap();
/// assert_eq!(changed, 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<BTreeMap<String, Table>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON dump of the form `{ "<table>": [ {row}, ... ] }`.
    ///
    /// # Errors
    ///
    /// Returns an error if the dump is not valid JSON, has the wrong shape,
    /// or contains rows without ids or with duplicate ids.
    pub fn from_json_reader<R: Read>(reader: R) -> StorageResult<Self> {
        let dump: serde_json::Value = serde_json::from_reader(reader)
            .map_err(|e| StorageError::invalid_data(format!("dump is not valid JSON: {e}")))?;
        let tables = dump
            .as_object()
            .ok_or_else(|| StorageError::invalid_data("dump must be an object of tables"))?;

        let store = Self::new();
        for (table, rows) in tables {
            let rows = rows.as_array().ok_or_else(|| {
                StorageError::invalid_data(format!("table {table} must be an array of rows"))
            })?;
            for row in rows {
                match Value::from(row.clone()) {
                    Value::Object(row) => store.insert(table, row)?,
                    _ => {
                        return Err(StorageError::invalid_data(format!(
                            "table {table} contains a non-object row"
                        )))
                    }
                }
            }
            // keep empty tables visible to `tables()`
            store.tables.write().entry(table.clone()).or_default();
        }

        tracing::debug!(tables = tables.len(), "loaded JSON dump");
        Ok(store)
    }

    /// Serializes every table as a JSON dump readable by [`Self::from_json_reader`].
    pub fn to_json(&self) -> serde_json::Value {
        let tables = self.tables.read();
        let dump = tables
            .iter()
            .map(|(name, rows)| {
                let rows = rows
                    .values()
                    .map(|row| serde_json::Value::from(Value::Object(row.clone())))
                    .collect();
                (name.clone(), serde_json::Value::Array(rows))
            })
            .collect();
        serde_json::Value::Object(dump)
    }

    /// Returns the names of all tables that have been written to.
    pub fn tables(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Returns the number of rows in a table.
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    /// Returns true if no table holds any row.
    pub fn is_empty(&self) -> bool {
        self.tables.read().values().all(BTreeMap::is_empty)
    }

    /// Removes every row from every table.
    pub fn clear(&self) {
        self.tables.write().clear();
    }

    fn load_relation(tables: &BTreeMap<String, Table>, row: &Row, relation: &RelationSpec) -> Value {
        let Some(target) = tables.get(&relation.target_table) else {
            return match relation.kind {
                RelationKind::BelongsTo { .. } => Value::Null,
                RelationKind::HasMany { .. } => Value::Array(Vec::new()),
            };
        };

        match &relation.kind {
            RelationKind::BelongsTo { foreign_key } => row
                .get(foreign_key)
                .and_then(Value::as_text)
                .and_then(|id| target.get(id))
                .map_or(Value::Null, |related| Value::Object(related.clone())),
            RelationKind::HasMany { foreign_key } => {
                let Some(id) = row.get(ID_COLUMN) else {
                    return Value::Array(Vec::new());
                };
                let children = target
                    .values()
                    .filter(|child| {
                        child
                            .get(foreign_key)
                            .is_some_and(|fk| values_equal(fk, id))
                    })
                    .map(|child| Value::Object(child.clone()))
                    .collect();
                Value::Array(children)
            }
        }
    }
}

impl RecordStore for InMemoryStore {
    fn find_one(&self, table: &str, id: &str) -> StorageResult<Option<Row>> {
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    fn insert(&self, table: &str, row: Row) -> StorageResult<()> {
        let id = row_id(&row)
            .ok_or_else(|| StorageError::MissingId {
                table: table.to_string(),
            })?
            .to_string();

        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(&id) {
            return Err(StorageError::DuplicateId {
                table: table.to_string(),
                id,
            });
        }
        rows.insert(id, row);
        Ok(())
    }

    fn update(&self, table: &str, criteria: &Criteria, partial: &Row) -> StorageResult<usize> {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };

        let mut changed = 0;
        for row in rows.values_mut().filter(|row| criteria.matches(row)) {
            for (column, value) in partial {
                if column != ID_COLUMN {
                    row.insert(column.clone(), value.clone());
                }
            }
            changed += 1;
        }
        Ok(changed)
    }

    fn delete(&self, table: &str, criteria: &Criteria) -> StorageResult<usize> {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };

        let before = rows.len();
        rows.retain(|_, row| !criteria.matches(row));
        Ok(before - rows.len())
    }

    fn query(&self, query: &Query) -> StorageResult<Vec<Row>> {
        let tables = self.tables.read();
        let Some(rows) = tables.get(&query.table) else {
            return Ok(Vec::new());
        };

        // BTreeMap keys are the ids, so the scan is already id-ascending
        // for text ids; re-sort only to honour the value ordering.
        let mut matched: Vec<&Row> = rows.values().filter(|r| query.criteria.matches(r)).collect();
        if query.order == SortOrder::IdAscending {
            matched.sort_by(|a, b| {
                let (a, b) = (a.get(ID_COLUMN), b.get(ID_COLUMN));
                match (a, b) {
                    (Some(a), Some(b)) => compare_values(a, b).unwrap_or(std::cmp::Ordering::Equal),
                    _ => std::cmp::Ordering::Equal,
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .take(limit)
            .map(|row| {
                let mut row = row.clone();
                for relation in &query.relations {
                    let loaded = Self::load_relation(&tables, &row, relation);
                    row.insert(relation.name.clone(), loaded);
                }
                row
            })
            .collect())
    }
}
