//! Schemas of the entities the mobile client stores.

use crate::direction::SyncDirection;
use crate::error::CoreResult;
use crate::facts::FACTS_TABLE;
use crate::schema::{EntitySchema, SchemaRegistry};

/// Builds the registry of all catalog entity types.
///
/// # Errors
///
/// Returns an error if a schema refers to an undeclared relation or column.
pub fn tamanu_catalog() -> CoreResult<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    for schema in schemas() {
        registry.register(schema)?;
    }
    Ok(registry)
}

fn schemas() -> Vec<EntitySchema> {
    use SyncDirection::{Bidirectional, DoNotSync, PullFromCentral};

    vec![
        EntitySchema::new("patients", Bidirectional)
            .columns([
                "displayId",
                "firstName",
                "middleName",
                "lastName",
                "culturalName",
                "dateOfBirth",
                "sex",
                "markedForSync",
            ])
            .belongs_to("village", "reference_data", "villageId"),
        EntitySchema::new("encounters", Bidirectional)
            .columns([
                "encounterType",
                "startDate",
                "endDate",
                "reasonForEncounter",
                "deviceId",
            ])
            .belongs_to("patient", "patients", "patientId")
            .belongs_to("examiner", "users", "examinerId")
            .belongs_to("department", "reference_data", "departmentId")
            .belongs_to("location", "reference_data", "locationId")
            .has_many("vitals", "vitals", "encounterId")
            .has_many("labRequests", "lab_requests", "encounterId")
            .channel_scope("patientId"),
        EntitySchema::new("administered_vaccines", Bidirectional)
            .columns(["batch", "status", "reason", "date", "injectionSite"])
            .belongs_to("scheduledVaccine", "scheduled_vaccines", "scheduledVaccineId")
            .belongs_to("encounter", "encounters", "encounterId")
            .upload_parent("encounter"),
        EntitySchema::new("scheduled_vaccines", PullFromCentral)
            .columns(["category", "label", "schedule", "weeksFromBirthDue", "index"])
            .belongs_to("vaccine", "reference_data", "vaccineId"),
        EntitySchema::new("lab_requests", Bidirectional)
            .columns(["displayId", "status", "requestedDate", "urgent"])
            .belongs_to("encounter", "encounters", "encounterId")
            .belongs_to("labTestCategory", "reference_data", "labTestCategoryId")
            .has_many("tests", "lab_tests", "labRequestId")
            .include_relations(["tests"])
            .upload_parent("encounter"),
        EntitySchema::new("lab_tests", Bidirectional)
            .columns(["date", "status", "result"])
            .belongs_to("labRequest", "lab_requests", "labRequestId")
            .belongs_to("labTestType", "reference_data", "labTestTypeId")
            .upload_parent("labRequest"),
        EntitySchema::new("survey_responses", Bidirectional)
            .columns(["startTime", "endTime", "result", "resultText", "surveyId"])
            .belongs_to("encounter", "encounters", "encounterId")
            .has_many("answers", "survey_response_answers", "responseId")
            .include_relations(["answers"])
            .upload_parent("encounter"),
        EntitySchema::new("survey_response_answers", Bidirectional)
            .columns(["name", "body", "dataElementId"])
            .belongs_to("response", "survey_responses", "responseId")
            .upload_parent("response"),
        EntitySchema::new("vitals", Bidirectional)
            .columns([
                "dateRecorded",
                "temperature",
                "weight",
                "height",
                "sbp",
                "dbp",
                "heartRate",
                "respiratoryRate",
            ])
            .belongs_to("encounter", "encounters", "encounterId")
            .upload_parent("encounter"),
        EntitySchema::new("notes", Bidirectional)
            .columns(["noteType", "content", "date", "recordType", "recordId"])
            .belongs_to("author", "users", "authorId"),
        EntitySchema::new("reference_data", PullFromCentral)
            .columns(["code", "name", "type", "visibilityStatus"]),
        EntitySchema::new("users", PullFromCentral)
            .columns(["email", "displayName", "role", "password"])
            .private_column("password"),
        EntitySchema::new(FACTS_TABLE, DoNotSync).columns(["key", "value"]),
    ]
}
