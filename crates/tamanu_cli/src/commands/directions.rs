//! Directions command implementation.

use serde::Serialize;
use tamanu_core::{catalog, SyncDirection};

/// One catalog type and how it syncs.
#[derive(Debug, Serialize)]
pub struct DirectionEntry {
    /// The type's table.
    pub table: String,
    /// The type's sync direction.
    pub direction: SyncDirection,
    /// Whether local changes are uploaded.
    pub pushes: bool,
    /// Whether central's changes are downloaded.
    pub pulls: bool,
}

/// Lists the catalog types and their directions.
pub fn directions() -> Result<Vec<DirectionEntry>, Box<dyn std::error::Error>> {
    let registry = catalog::tamanu_catalog()?;
    Ok(registry
        .iter()
        .map(|schema| DirectionEntry {
            table: schema.table().to_string(),
            direction: schema.direction(),
            pushes: schema.direction().pushes(),
            pulls: schema.direction().pulls(),
        })
        .collect())
}

/// Runs the directions command.
pub fn run(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let entries = directions()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            for entry in &entries {
                println!("{:<26} {}", entry.table, entry.direction);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_catalog_type() {
        let entries = directions().unwrap();
        assert_eq!(entries.len(), 13);

        let users = entries.iter().find(|e| e.table == "users").unwrap();
        assert_eq!(users.direction, SyncDirection::PullFromCentral);
        assert!(users.pulls);
        assert!(!users.pushes);
    }

    #[test]
    fn directions_serialize_by_name() {
        let entries = directions().unwrap();
        let json = serde_json::to_value(&entries).unwrap();
        let facts = json
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["table"] == "local_system_facts")
            .unwrap();
        assert_eq!(facts["direction"], "DO_NOT_SYNC");
    }
}
