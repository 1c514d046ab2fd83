//! Cross-crate integration test helpers.
//!
//! Provides utilities for checking the upload-marking contract end to end
//! across the storage, core and codec crates.

use tamanu_core::{CoreResult, Model, RecordId, UploadQuery};

/// Pages through the upload queue of `model` without confirming anything,
/// returning every id in the order the pages yielded them.
///
/// # Errors
///
/// Returns the first store error.
pub fn drain_upload_queue(
    model: &Model,
    channel: &str,
    page_size: usize,
) -> CoreResult<Vec<RecordId>> {
    let mut ids = Vec::new();
    let mut after: Option<RecordId> = None;
    loop {
        let mut query = UploadQuery::new(channel).limit(page_size);
        query.after = after.clone();
        let page = model.find_marked_for_upload(&query)?;
        let Some(last) = page.last() else {
            return Ok(ids);
        };
        after = Some(last.id.clone());
        ids.extend(page.into_iter().map(|r| r.id));
    }
}

/// Asserts that ids are strictly ascending (bytewise).
pub fn assert_strictly_ascending(ids: &[RecordId]) {
    for pair in ids.windows(2) {
        assert!(
            pair[0] < pair[1],
            "ids out of order: {} then {}",
            pair[0],
            pair[1]
        );
    }
}
