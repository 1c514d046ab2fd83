//! Row criteria and the query builder.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use tamanu_codec::Value;

/// A stored row: column name to value.
///
/// Every row carries its identifier as text in the [`ID_COLUMN`] column.
pub type Row = BTreeMap<String, Value>;

/// Name of the identifier column present on every row.
pub const ID_COLUMN: &str = "id";

/// Returns the text id of a row, if present.
pub fn row_id(row: &Row) -> Option<&str> {
    row.get(ID_COLUMN).and_then(Value::as_text)
}

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Column equals the value.
    Eq(Value),
    /// Column differs from the value (null columns differ from non-null values).
    Ne(Value),
    /// Column is strictly greater than the value.
    Gt(Value),
    /// Column is strictly less than the value.
    Lt(Value),
    /// Column equals one of the values.
    In(Vec<Value>),
}

/// A single column predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Column the predicate reads.
    pub column: String,
    /// The comparison.
    pub op: FilterOp,
}

impl Filter {
    /// Evaluates the predicate against a row. Missing columns read as null.
    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(&self.column).unwrap_or(&Value::Null);
        match &self.op {
            FilterOp::Eq(expected) => values_equal(actual, expected),
            FilterOp::Ne(expected) => !values_equal(actual, expected),
            FilterOp::Gt(bound) => compare_values(actual, bound) == Some(Ordering::Greater),
            FilterOp::Lt(bound) => compare_values(actual, bound) == Some(Ordering::Less),
            FilterOp::In(candidates) => candidates.iter().any(|c| values_equal(actual, c)),
        }
    }
}

/// A conjunction of filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    filters: Vec<Filter>,
}

impl Criteria {
    /// Criteria matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Criteria matching the row with the given id.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::all().eq(ID_COLUMN, Value::Text(id.into()))
    }

    /// Criteria matching any of the given ids.
    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = ids.into_iter().map(|id| Value::Text(id.into())).collect();
        Self::all().push(ID_COLUMN, FilterOp::In(ids))
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, FilterOp::Eq(value.into()))
    }

    /// Adds an inequality filter.
    #[must_use]
    pub fn ne(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, FilterOp::Ne(value.into()))
    }

    /// Adds a strictly-greater-than filter.
    #[must_use]
    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, FilterOp::Gt(value.into()))
    }

    /// Adds a strictly-less-than filter.
    #[must_use]
    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, FilterOp::Lt(value.into()))
    }

    /// Adds an arbitrary filter.
    #[must_use]
    pub fn push(mut self, column: impl Into<String>, op: FilterOp) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
        });
        self
    }

    /// Returns the filters in this conjunction.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns true if every filter matches.
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

/// How a related row is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// This row holds the foreign key (`encounter` via `encounterId`).
    BelongsTo {
        /// Column on this row holding the related id.
        foreign_key: String,
    },
    /// Related rows hold a foreign key pointing back at this row.
    HasMany {
        /// Column on the related rows holding this row's id.
        foreign_key: String,
    },
}

/// A named relation to eager-load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    /// Field name the loaded relation is stored under.
    pub name: String,
    /// Table of the related rows.
    pub target_table: String,
    /// How to find the related rows.
    pub kind: RelationKind,
}

impl RelationSpec {
    /// A belongs-to relation read through `foreign_key` on this row.
    pub fn belongs_to(
        name: impl Into<String>,
        target_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target_table: target_table.into(),
            kind: RelationKind::BelongsTo {
                foreign_key: foreign_key.into(),
            },
        }
    }

    /// A has-many relation whose rows point back through `foreign_key`.
    pub fn has_many(
        name: impl Into<String>,
        target_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target_table: target_table.into(),
            kind: RelationKind::HasMany {
                foreign_key: foreign_key.into(),
            },
        }
    }
}

/// Sort order of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Store order (unspecified).
    #[default]
    Unordered,
    /// Ascending by id.
    IdAscending,
}

/// A read query against one table.
///
/// # Example
///
/// ```rust
/// use tamanu_storage::{Query, RelationSpec};
///
/// let query = Query::table("encounters")
///     .filter(|c| c.eq("markedForUpload", true).gt("id", "E100"))
///     .order_by_id()
///     .limit(50)
///     .with_relation(RelationSpec::belongs_to("patient", "patients", "patientId"));
/// assert_eq!(query.limit, Some(50));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Table to read.
    pub table: String,
    /// Row predicate.
    pub criteria: Criteria,
    /// Result order.
    pub order: SortOrder,
    /// Maximum rows to return.
    pub limit: Option<usize>,
    /// Relations to eager-load onto each returned row.
    pub relations: Vec<RelationSpec>,
}

impl Query {
    /// Starts a query over `table` matching every row.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            criteria: Criteria::all(),
            order: SortOrder::Unordered,
            limit: None,
            relations: Vec::new(),
        }
    }

    /// Replaces the criteria.
    #[must_use]
    pub fn criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }

    /// Extends the criteria with a builder closure.
    #[must_use]
    pub fn filter(mut self, build: impl FnOnce(Criteria) -> Criteria) -> Self {
        self.criteria = build(self.criteria);
        self
    }

    /// Sorts ascending by id.
    #[must_use]
    pub fn order_by_id(mut self) -> Self {
        self.order = SortOrder::IdAscending;
        self
    }

    /// Caps the number of rows returned.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Eager-loads a relation.
    #[must_use]
    pub fn with_relation(mut self, relation: RelationSpec) -> Self {
        self.relations.push(relation);
        self
    }

    /// Eager-loads several relations.
    #[must_use]
    pub fn with_relations(mut self, relations: impl IntoIterator<Item = RelationSpec>) -> Self {
        self.relations.extend(relations);
        self
    }
}

/// Equality used by filters.
///
/// Integers and floats compare numerically; everything else structurally.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            compare_values(a, b) == Some(Ordering::Equal)
        }
        _ => a == b,
    }
}

/// Ordering used by range filters and id sorting.
///
/// Only values of comparable kinds are ordered: numbers with numbers, text
/// with text (bytewise), booleans with booleans. Anything else is `None`,
/// which makes range filters fail closed.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            a.as_float()?.partial_cmp(&b.as_float()?)
        }
        (Value::Text(x), Value::Text(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
