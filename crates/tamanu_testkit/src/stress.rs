//! Stress helpers for the sync metadata layer.
//!
//! These exercise upload marking under concurrent access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tamanu_core::{Model, RecordId, UploadQuery};

/// Pages the upload loop of [`stress_mark_while_uploading`] confirms.
const UPLOAD_ROUNDS: usize = 50;

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
        }
    }
}

/// Marks records for upload from several threads at once.
///
/// Each thread cycles through `ids`.
pub fn stress_concurrent_marks(
    model: &Model,
    ids: &[RecordId],
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ids: Arc<Vec<RecordId>> = Arc::new(ids.to_vec());

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let model = model.clone();
            let ids = Arc::clone(&ids);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let operations = config.operations;

            thread::spawn(move || {
                for i in 0..operations {
                    if ids.is_empty() {
                        break;
                    }
                    let id = &ids[(i + t) % ids.len()];
                    match model.mark_for_upload(id.as_str()) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs marking threads against an upload loop that confirms pages as it
/// goes, the way a sync client does while the user keeps editing.
///
/// Returns the number of records confirmed by the upload loop.
pub fn stress_mark_while_uploading(
    model: &Model,
    ids: &[RecordId],
    config: &StressConfig,
) -> usize {
    let uploader = {
        let model = model.clone();
        thread::spawn(move || {
            let mut confirmed = 0;
            for _ in 0..UPLOAD_ROUNDS {
                let page = model
                    .find_marked_for_upload(&UploadQuery::new(model.table()).limit(10))
                    .expect("page is readable");
                let page_ids: Vec<RecordId> = page.into_iter().map(|r| r.id).collect();
                confirmed += model
                    .mark_uploaded(&page_ids, chrono::Utc::now())
                    .expect("page is confirmable");
            }
            confirmed
        })
    };

    stress_concurrent_marks(model, ids, config);
    uploader.join().expect("Thread panicked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::scenarios;

    #[test]
    fn concurrent_marks_all_succeed() {
        let test_db = scenarios::pending_encounters(5);
        let encounters = test_db.model("encounters");
        let ids: Vec<RecordId> = (0..5).map(|i| RecordId::new(format!("E{i:03}"))).collect();

        let result = stress_concurrent_marks(
            &encounters,
            &ids,
            &StressConfig {
                operations: 50,
                threads: 4,
            },
        );
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 200);
        assert!(test_db.store.writes_are_sequential("encounters"));
    }

    #[test]
    fn marking_while_uploading_stays_consistent() {
        let test_db = scenarios::pending_encounters(20);
        let encounters = test_db.model("encounters");
        let ids: Vec<RecordId> = (0..20).map(|i| RecordId::new(format!("E{i:03}"))).collect();

        stress_mark_while_uploading(&encounters, &ids, &StressConfig::default());

        // Every record is either still pending or was confirmed with a timestamp.
        for id in &ids {
            let record = encounters.find_one(id.as_str()).unwrap().unwrap();
            assert!(record.marked_for_upload || record.uploaded_at.is_some());
        }
    }
}
