//! CLI command implementations.

pub mod directions;
pub mod inspect;
pub mod pending;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tamanu_core::SyncDatabase;
use tamanu_storage::InMemoryStore;

/// Loads a JSON dump into a catalog database.
pub fn open_dump(path: &Path) -> Result<SyncDatabase, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No dump found at {:?}", path).into());
    }
    let store = InMemoryStore::from_json_reader(BufReader::new(File::open(path)?))?;
    tracing::debug!(path = %path.display(), tables = store.tables().len(), "opened dump");
    Ok(SyncDatabase::with_catalog(Arc::new(store))?)
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn opens_a_dump() {
        let (_dir, path) = test_support::dump_file(json!({
            "patients": [{ "id": "P1", "firstName": "Ana", "markedForUpload": true }]
        }));
        let db = open_dump(&path).unwrap();
        assert_eq!(db.model("patients").unwrap().count().unwrap(), 1);
    }

    #[test]
    fn missing_dump_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_dump(&dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn malformed_dump_is_an_error() {
        let (_dir, path) = test_support::dump_file(json!(["not", "tables"]));
        assert!(open_dump(&path).is_err());
    }
}
