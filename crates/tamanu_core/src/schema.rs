//! Declarative entity schemas.
//!
//! A schema is plain metadata: the type's table, sync direction, column and
//! relation descriptors, and the knobs the sync layer reads (excluded
//! columns, included relations, upload parent, channel scope).

use crate::direction::SyncDirection;
use crate::error::{CoreError, CoreResult};
use crate::record::columns;
use std::collections::BTreeMap;
use std::sync::Arc;
use tamanu_storage::{RelationKind, RelationSpec};

/// Suffix of foreign key columns.
pub const RELATION_ID_SUFFIX: &str = "Id";

/// Metadata of one entity type.
///
/// # Example
///
/// ```rust
/// use tamanu_core::{EntitySchema, SyncDirection};
///
/// let schema = EntitySchema::new("vitals", SyncDirection::Bidirectional)
///     .columns(["dateRecorded", "weight", "encounterId"])
///     .belongs_to("encounter", "encounters", "encounterId")
///     .upload_parent("encounter");
///
/// assert!(schema.tracked_columns().contains(&"weight".to_string()));
/// assert!(!schema.tracked_columns().contains(&"markedForUpload".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    table: String,
    direction: SyncDirection,
    columns: Vec<String>,
    relations: Vec<RelationSpec>,
    excluded_sync_columns: Vec<String>,
    untracked_columns: Vec<String>,
    included_sync_relations: Vec<String>,
    upload_parent: Option<String>,
    channel_scope: Option<String>,
    upload_limit: Option<usize>,
}

impl EntitySchema {
    /// Starts a schema with only the base columns.
    pub fn new(table: impl Into<String>, direction: SyncDirection) -> Self {
        Self {
            table: table.into(),
            direction,
            columns: Vec::new(),
            relations: Vec::new(),
            excluded_sync_columns: columns::SYNC_PLUMBING
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
            untracked_columns: Vec::new(),
            included_sync_relations: Vec::new(),
            upload_parent: None,
            channel_scope: None,
            upload_limit: None,
        }
    }

    /// Declares data columns. Base columns are implicit.
    #[must_use]
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !columns::BASE.contains(&name.as_str()) && !self.columns.contains(&name) {
                self.columns.push(name);
            }
        }
        self
    }

    /// Declares a belongs-to relation. The foreign key becomes a column.
    #[must_use]
    pub fn belongs_to(
        mut self,
        name: impl Into<String>,
        target_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        let foreign_key = foreign_key.into();
        self = self.columns([foreign_key.clone()]);
        self.relations
            .push(RelationSpec::belongs_to(name, target_table, foreign_key));
        self
    }

    /// Declares a has-many relation.
    #[must_use]
    pub fn has_many(
        mut self,
        name: impl Into<String>,
        target_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relations
            .push(RelationSpec::has_many(name, target_table, foreign_key));
        self
    }

    /// Replaces the columns left out of exports.
    #[must_use]
    pub fn excluded_sync_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_sync_columns = names.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps a column out of both exports and field tracking.
    #[must_use]
    pub fn private_column(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.excluded_sync_columns.contains(&name) {
            self.excluded_sync_columns.push(name.clone());
        }
        if !self.untracked_columns.contains(&name) {
            self.untracked_columns.push(name);
        }
        self
    }

    /// Names relations embedded into uploads.
    #[must_use]
    pub fn include_relations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included_sync_relations
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Names the belongs-to relation whose target must be re-uploaded when
    /// this type changes.
    #[must_use]
    pub fn upload_parent(mut self, relation: impl Into<String>) -> Self {
        self.upload_parent = Some(relation.into());
        self
    }

    /// Names the column patient-scoped channels filter on.
    #[must_use]
    pub fn channel_scope(mut self, column: impl Into<String>) -> Self {
        self.channel_scope = Some(column.into());
        self
    }

    /// Overrides the upload page size.
    #[must_use]
    pub const fn upload_limit(mut self, limit: usize) -> Self {
        self.upload_limit = Some(limit);
        self
    }

    /// Table name, also the type's name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Sync direction.
    pub fn direction(&self) -> SyncDirection {
        self.direction
    }

    /// Declared data columns.
    pub fn data_columns(&self) -> &[String] {
        &self.columns
    }

    /// Base columns followed by data columns.
    pub fn all_columns(&self) -> Vec<String> {
        columns::BASE
            .iter()
            .map(|c| (*c).to_string())
            .chain(self.columns.iter().cloned())
            .collect()
    }

    /// Returns true if `column` is stored for this type.
    pub fn has_column(&self, column: &str) -> bool {
        columns::BASE.contains(&column) || self.columns.iter().any(|c| c == column)
    }

    /// Columns whose changes receive field ticks.
    pub fn tracked_columns(&self) -> Vec<String> {
        self.all_columns()
            .into_iter()
            .filter(|c| !columns::is_sync_plumbing(c) && !self.untracked_columns.contains(c))
            .collect()
    }

    /// Columns left out of exports.
    pub fn excluded_columns(&self) -> &[String] {
        &self.excluded_sync_columns
    }

    /// Columns written into exports.
    pub fn exported_columns(&self) -> Vec<String> {
        self.all_columns()
            .into_iter()
            .filter(|c| !self.excluded_sync_columns.contains(c))
            .collect()
    }

    /// All declared relations.
    pub fn relations(&self) -> &[RelationSpec] {
        &self.relations
    }

    /// Looks up a relation by name.
    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Finds the belongs-to relation read through `column`.
    ///
    /// Only columns ending in the relation id suffix qualify.
    pub fn belongs_to_by_foreign_key(&self, column: &str) -> Option<&RelationSpec> {
        if !column.ends_with(RELATION_ID_SUFFIX) {
            return None;
        }
        self.relations.iter().find(|r| {
            matches!(&r.kind, RelationKind::BelongsTo { foreign_key } if foreign_key == column)
        })
    }

    /// Names of relations embedded into uploads.
    pub fn included_relation_names(&self) -> &[String] {
        &self.included_sync_relations
    }

    /// Relations embedded into uploads, resolved.
    pub fn included_relations(&self) -> Vec<RelationSpec> {
        self.included_sync_relations
            .iter()
            .filter_map(|name| self.relation(name).cloned())
            .collect()
    }

    /// The relation pointing at this type's upload parent.
    pub fn upload_parent_relation(&self) -> Option<&RelationSpec> {
        self.upload_parent
            .as_deref()
            .and_then(|name| self.relation(name))
    }

    /// Column patient-scoped channels filter on.
    pub fn channel_scope_column(&self) -> Option<&str> {
        self.channel_scope.as_deref()
    }

    /// Upload page size override.
    pub fn upload_limit_override(&self) -> Option<usize> {
        self.upload_limit
    }

    /// Checks that every name the schema refers to is declared.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first dangling reference.
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |message: String| Err(CoreError::invalid_operation(message));

        if self.table.is_empty() {
            return invalid("schema has an empty table name".into());
        }
        for name in &self.included_sync_relations {
            if self.relation(name).is_none() {
                return invalid(format!(
                    "{}: included relation {name} is not declared",
                    self.table
                ));
            }
        }
        if let Some(parent) = &self.upload_parent {
            match self.relation(parent).map(|r| &r.kind) {
                Some(RelationKind::BelongsTo { .. }) => {}
                _ => {
                    return invalid(format!(
                        "{}: upload parent {parent} is not a belongs-to relation",
                        self.table
                    ))
                }
            }
        }
        if let Some(scope) = &self.channel_scope {
            if !self.has_column(scope) {
                return invalid(format!(
                    "{}: channel scope column {scope} is not declared",
                    self.table
                ));
            }
        }
        Ok(())
    }
}

/// Selects the schemas taking part in a sync in `direction`.
///
/// Push and pull requests include bidirectional types.
pub fn models_for_direction<'a, I>(schemas: I, direction: SyncDirection) -> Vec<Arc<EntitySchema>>
where
    I: IntoIterator<Item = &'a Arc<EntitySchema>>,
{
    schemas
        .into_iter()
        .filter(|s| s.direction().participates_in(direction))
        .cloned()
        .collect()
}

/// The set of known entity types, keyed by table.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any previous one for the same table.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema fails [`EntitySchema::validate`].
    pub fn register(&mut self, schema: EntitySchema) -> CoreResult<()> {
        schema.validate()?;
        self.schemas
            .insert(schema.table().to_string(), Arc::new(schema));
        Ok(())
    }

    /// Looks up a schema.
    pub fn get(&self, table: &str) -> Option<&Arc<EntitySchema>> {
        self.schemas.get(table)
    }

    /// Looks up a schema, failing for unknown tables.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`] if no schema is registered.
    pub fn require(&self, table: &str) -> CoreResult<Arc<EntitySchema>> {
        self.get(table)
            .cloned()
            .ok_or_else(|| CoreError::unknown_entity_type(table))
    }

    /// Iterates over schemas in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntitySchema>> {
        self.schemas.values()
    }

    /// Schemas taking part in a sync in `direction`.
    pub fn for_direction(&self, direction: SyncDirection) -> Vec<Arc<EntitySchema>> {
        models_for_direction(self.schemas.values(), direction)
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
