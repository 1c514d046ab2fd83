//! Inspect command implementation.

use super::open_dump;
use serde::Serialize;
use std::path::Path;
use tamanu_core::facts::{CURRENT_SYNC_TICK, LAST_SUCCESSFUL_PULL, LAST_SUCCESSFUL_PUSH};
use tamanu_core::SyncDatabase;

/// Dump inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Dump path.
    pub path: String,
    /// Current sync tick.
    pub current_sync_tick: u64,
    /// Tick of the last successful push.
    pub last_successful_push: u64,
    /// Tick of the last successful pull.
    pub last_successful_pull: u64,
    /// Per-type statistics, sorted by table.
    pub types: Vec<TypeStats>,
}

/// Sync statistics of one entity type.
#[derive(Debug, Serialize)]
pub struct TypeStats {
    /// The type's table.
    pub table: String,
    /// The type's sync direction.
    pub direction: String,
    /// Number of records.
    pub records: usize,
    /// Records marked for upload. Always 0 for types that do not push.
    pub pending_upload: usize,
}

/// Collects the statistics of a database.
pub fn inspect(path: &Path, db: &SyncDatabase) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let facts = db.facts();
    let mut types = Vec::new();
    for model in db.models() {
        let pending_upload = if model.sync_direction().pushes() {
            model.count_marked_for_upload()?
        } else {
            0
        };
        types.push(TypeStats {
            table: model.table().to_string(),
            direction: model.sync_direction().to_string(),
            records: model.count()?,
            pending_upload,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        current_sync_tick: facts.tick(CURRENT_SYNC_TICK)?.as_u64(),
        last_successful_push: facts.tick(LAST_SUCCESSFUL_PUSH)?.as_u64(),
        last_successful_pull: facts.tick(LAST_SUCCESSFUL_PULL)?.as_u64(),
        types,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_dump(path)?;
    let result = inspect(path, &db)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Tamanu Sync Inspection");
    println!("======================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Ticks:");
    println!("  Current:              {}", result.current_sync_tick);
    println!("  Last successful push: {}", result.last_successful_push);
    println!("  Last successful pull: {}", result.last_successful_pull);
    println!();
    println!("Types:");
    for stats in &result.types {
        println!(
            "  {:<26} {:<18} {:>6} records, {:>6} pending",
            stats.table, stats.direction, stats.records, stats.pending_upload
        );
    }
}
