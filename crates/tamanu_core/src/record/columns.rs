//! Names of the base columns every syncable table carries.

/// Primary key.
pub const ID: &str = "id";
/// Creation timestamp.
pub const CREATED_AT: &str = "createdAt";
/// Last local modification timestamp.
pub const UPDATED_AT: &str = "updatedAt";
/// Pending-upload flag.
pub const MARKED_FOR_UPLOAD: &str = "markedForUpload";
/// Patient-level "sync this patient" flag.
pub const MARKED_FOR_SYNC: &str = "markedForSync";
/// Timestamp of the last confirmed upload.
pub const UPLOADED_AT: &str = "uploadedAt";
/// Soft-delete timestamp.
pub const DELETED_AT: &str = "deletedAt";
/// Serialized field name to tick map.
pub const UPDATED_AT_BY_FIELD: &str = "updatedAtByField";

/// Base columns in storage order.
pub const BASE: [&str; 7] = [
    ID,
    CREATED_AT,
    UPDATED_AT,
    MARKED_FOR_UPLOAD,
    UPLOADED_AT,
    DELETED_AT,
    UPDATED_AT_BY_FIELD,
];

/// Sync bookkeeping columns: never tracked, excluded from exports by default.
pub const SYNC_PLUMBING: [&str; 7] = [
    CREATED_AT,
    UPDATED_AT,
    MARKED_FOR_UPLOAD,
    MARKED_FOR_SYNC,
    UPLOADED_AT,
    DELETED_AT,
    UPDATED_AT_BY_FIELD,
];

/// Returns true if `column` is sync bookkeeping.
pub fn is_sync_plumbing(column: &str) -> bool {
    SYNC_PLUMBING.contains(&column)
}
