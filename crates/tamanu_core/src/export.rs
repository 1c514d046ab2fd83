//! Export plans: what of a record goes over the wire.

use crate::error::CoreResult;
use crate::record::{columns, SyncableRecord};
use crate::schema::{EntitySchema, SchemaRegistry};
use serde::{Deserialize, Serialize};
use tamanu_codec::Value;
use tamanu_storage::{RelationKind, RelationSpec, Row};

/// A record as exchanged with central.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Exported columns, with included relations embedded.
    pub data: Row,
    /// True if the record was deleted.
    #[serde(default)]
    pub is_deleted: bool,
}

impl SyncRecord {
    /// Returns the record id, if the data carries one.
    pub fn id(&self) -> Option<&str> {
        self.data.get(columns::ID).and_then(Value::as_text)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RelationPlan {
    relation: RelationSpec,
    plan: ExportPlan,
}

/// The columns and relations exported for one entity type.
///
/// Included relations are exported one level deep with the related type's
/// own column exclusions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlan {
    table: String,
    columns: Vec<String>,
    relations: Vec<RelationPlan>,
}

impl ExportPlan {
    /// Derives the plan of `schema`.
    ///
    /// # Errors
    ///
    /// Returns an error if an included relation targets an unregistered type.
    pub fn for_schema(schema: &EntitySchema, registry: &SchemaRegistry) -> CoreResult<Self> {
        let relations = schema
            .included_relations()
            .into_iter()
            .map(|relation| {
                let target = registry.require(&relation.target_table)?;
                Ok(RelationPlan {
                    relation,
                    plan: Self::columns_only(&target),
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Self {
            table: schema.table().to_string(),
            columns: schema.exported_columns(),
            relations,
        })
    }

    fn columns_only(schema: &EntitySchema) -> Self {
        Self {
            table: schema.table().to_string(),
            columns: schema.exported_columns(),
            relations: Vec::new(),
        }
    }

    /// The exported type.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Exported columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Names of the embedded relations.
    pub fn relation_names(&self) -> Vec<&str> {
        self.relations
            .iter()
            .map(|r| r.relation.name.as_str())
            .collect()
    }

    /// Exports a row whose relations are already loaded.
    ///
    /// Columns absent from the row are left out. A belongs-to relation is
    /// embedded as an object (or null), a has-many relation as an array.
    pub fn export_row(&self, row: &Row) -> Row {
        let mut data: Row = self
            .columns
            .iter()
            .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
            .collect();

        for RelationPlan { relation, plan } in &self.relations {
            let exported = match (row.get(&relation.name), &relation.kind) {
                (Some(Value::Object(related)), _) => Value::Object(plan.export_row(related)),
                (Some(Value::Array(related)), _) => Value::Array(
                    related
                        .iter()
                        .filter_map(Value::as_object)
                        .map(|r| Value::Object(plan.export_row(r)))
                        .collect(),
                ),
                (_, RelationKind::HasMany { .. }) => Value::Array(Vec::new()),
                (_, RelationKind::BelongsTo { .. }) => Value::Null,
            };
            data.insert(relation.name.clone(), exported);
        }
        data
    }

    /// Exports a record whose relations are already loaded.
    pub fn export(&self, record: &SyncableRecord) -> SyncRecord {
        SyncRecord {
            data: self.export_row(&record.to_row()),
            is_deleted: record.is_deleted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::SyncDirection;
    use crate::error::CoreError;
    use chrono::Utc;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntitySchema::new("survey_responses", SyncDirection::Bidirectional)
                    .columns(["result"])
                    .belongs_to("encounter", "encounters", "encounterId")
                    .has_many("answers", "survey_response_answers", "responseId")
                    .include_relations(["answers"]),
            )
            .unwrap();
        registry
            .register(
                EntitySchema::new("survey_response_answers", SyncDirection::Bidirectional)
                    .columns(["body", "secret"])
                    .belongs_to("response", "survey_responses", "responseId")
                    .private_column("secret"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn plan_drops_excluded_columns() {
        let registry = registry();
        let schema = registry.require("survey_responses").unwrap();
        let plan = ExportPlan::for_schema(&schema, &registry).unwrap();
        assert_eq!(plan.columns(), &["id", "result", "encounterId"]);
        assert_eq!(plan.relation_names(), vec!["answers"]);
    }

    #[test]
    fn export_embeds_included_relations() {
        let registry = registry();
        let schema = registry.require("survey_responses").unwrap();
        let plan = ExportPlan::for_schema(&schema, &registry).unwrap();

        let answer = Value::object([
            ("id", Value::from("A1")),
            ("body", Value::from("yes")),
            ("secret", Value::from("hidden")),
            ("markedForUpload", Value::Bool(true)),
        ]);
        let mut record = SyncableRecord::with_id("R1")
            .with("result", 80)
            .with("encounterId", "E1")
            .with("answers", Value::Array(vec![answer]));
        record.updated_at = Some(Utc::now());

        let exported = plan.export(&record);
        assert!(!exported.is_deleted);
        assert_eq!(exported.id(), Some("R1"));
        assert!(!exported.data.contains_key("updatedAt"));
        assert!(!exported.data.contains_key("markedForUpload"));

        let answers = exported.data["answers"].as_array().unwrap();
        let answer = answers[0].as_object().unwrap();
        assert_eq!(answer.get("body"), Some(&Value::from("yes")));
        assert!(!answer.contains_key("secret"));
        assert!(!answer.contains_key("markedForUpload"));
    }

    #[test]
    fn unloaded_relations_export_empty() {
        let registry = registry();
        let schema = registry.require("survey_responses").unwrap();
        let plan = ExportPlan::for_schema(&schema, &registry).unwrap();

        let mut record = SyncableRecord::with_id("R2");
        record.deleted_at = Some(Utc::now());
        let exported = plan.export(&record);
        assert!(exported.is_deleted);
        assert_eq!(exported.data["answers"], Value::Array(Vec::new()));
    }

    #[test]
    fn unknown_relation_target_fails() {
        let schema = EntitySchema::new("lab_requests", SyncDirection::Bidirectional)
            .has_many("tests", "lab_tests", "labRequestId")
            .include_relations(["tests"]);
        let err = ExportPlan::for_schema(&schema, &SchemaRegistry::new()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownEntityType { .. }));
    }

    #[test]
    fn sync_record_json_shape() {
        let mut data = Row::new();
        data.insert("id".into(), Value::from("X"));
        let record = SyncRecord {
            data,
            is_deleted: true,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"data":{"id":"X"},"isDeleted":true}"#);

        let back: SyncRecord = serde_json::from_str(r#"{"data":{"id":"Y"}}"#).unwrap();
        assert!(!back.is_deleted);
        assert_eq!(back.id(), Some("Y"));
    }
}
