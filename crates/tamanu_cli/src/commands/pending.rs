//! Pending command implementation.

use super::open_dump;
use serde::Serialize;
use std::path::Path;
use tamanu_codec::Value;
use tamanu_core::{SyncDatabase, UploadQuery};

/// One page of upload candidates, as they would be uploaded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPage {
    /// The type's table.
    pub table: String,
    /// The channel queried.
    pub channel: String,
    /// Exported records, ascending by id.
    pub records: Vec<serde_json::Value>,
    /// Pass as `--after` to get the next page. Absent on an empty page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_after: Option<String>,
}

/// Queries one page of `table`'s upload candidates.
pub fn pending_page(
    db: &SyncDatabase,
    table: &str,
    channel: &str,
    limit: Option<usize>,
    after: Option<&str>,
) -> Result<PendingPage, Box<dyn std::error::Error>> {
    let model = db.model(table)?;
    let plan = model.export_plan()?;

    let mut query = UploadQuery::new(channel);
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    if let Some(after) = after {
        query = query.after(after);
    }
    let page = model.find_marked_for_upload(&query)?;
    tracing::debug!(table, channel, records = page.len(), "queried upload candidates");

    let next_after = page.last().map(|record| record.id.to_string());
    let records = page
        .iter()
        .map(|record| {
            let exported = plan.export(record);
            serde_json::json!({
                "data": serde_json::Value::from(Value::Object(exported.data)),
                "isDeleted": exported.is_deleted,
            })
        })
        .collect();

    Ok(PendingPage {
        table: table.to_string(),
        channel: channel.to_string(),
        records,
        next_after,
    })
}

/// Runs the pending command.
pub fn run(
    path: &Path,
    table: &str,
    channel: &str,
    limit: Option<usize>,
    after: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_dump(path)?;
    let page = pending_page(&db, table, channel, limit, after)?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::dump_file;
    use serde_json::json;

    fn encounter_dump() -> serde_json::Value {
        json!({
            "encounters": [
                { "id": "E3", "patientId": "P2", "markedForUpload": true },
                { "id": "E1", "patientId": "P1", "markedForUpload": true, "updatedAtByField": "{}" },
                { "id": "E2", "patientId": "P1", "markedForUpload": false },
                { "id": "E4", "patientId": "P1", "markedForUpload": true },
            ]
        })
    }

    fn ids(page: &PendingPage) -> Vec<&str> {
        page.records
            .iter()
            .map(|r| r["data"]["id"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn pages_follow_the_cursor() {
        let (_dir, path) = dump_file(encounter_dump());
        let db = open_dump(&path).unwrap();

        let first = pending_page(&db, "encounters", "encounters", Some(2), None).unwrap();
        assert_eq!(ids(&first), vec!["E1", "E3"]);
        assert_eq!(first.next_after.as_deref(), Some("E3"));

        let second = pending_page(&db, "encounters", "encounters", Some(2), Some("E3")).unwrap();
        assert_eq!(ids(&second), vec!["E4"]);

        let empty = pending_page(&db, "encounters", "encounters", Some(2), Some("E4")).unwrap();
        assert!(empty.records.is_empty());
        assert!(empty.next_after.is_none());
    }

    #[test]
    fn patient_channels_filter_by_patient() {
        let (_dir, path) = dump_file(encounter_dump());
        let db = open_dump(&path).unwrap();

        let page = pending_page(&db, "encounters", "patient/P1/encounters", None, None).unwrap();
        assert_eq!(ids(&page), vec!["E1", "E4"]);
    }

    #[test]
    fn exported_records_drop_sync_plumbing() {
        let (_dir, path) = dump_file(encounter_dump());
        let db = open_dump(&path).unwrap();

        let page = pending_page(&db, "encounters", "encounters", Some(1), None).unwrap();
        let data = page.records[0]["data"].as_object().unwrap();
        assert!(!data.contains_key("markedForUpload"));
        assert!(!data.contains_key("updatedAtByField"));
        assert_eq!(page.records[0]["isDeleted"], false);
    }

    #[test]
    fn unknown_table_is_an_error() {
        let (_dir, path) = dump_file(encounter_dump());
        let db = open_dump(&path).unwrap();
        assert!(pending_page(&db, "ghosts", "ghosts", None, None).is_err());
    }
}
