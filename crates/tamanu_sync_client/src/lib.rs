//! # Tamanu Sync Client
//!
//! Upload and download loops that drive the Tamanu sync metadata layer.
//!
//! This crate provides:
//! - Export-and-upload paging over the upload-candidate query
//! - Download-and-import with a persisted pull cursor per channel
//! - Download page sizes that adapt to download time
//! - Retry with exponential backoff
//! - A source abstraction for talking to central
//!
//! ## Flow
//!
//! A run uploads every pushing type first, then downloads every pulling
//! type. Each upload page is confirmed with `mark_uploaded` using the time
//! central received it; each downloaded page is imported with
//! `markedForUpload = false` before the pull cursor moves past it.
//!
//! ## Key Invariants
//!
//! - Only records marked for upload are uploaded, each page in id order
//! - A page is confirmed only after central accepted it
//! - The pull cursor never moves past a page that failed to import
//! - At most one run is in progress per manager

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod manager;
mod source;

pub use config::{
    RetryConfig, SyncClientConfig, INITIAL_DOWNLOAD_LIMIT, MAX_DOWNLOAD_LIMIT, MIN_DOWNLOAD_LIMIT,
    OPTIMAL_DOWNLOAD_TIME_PER_PAGE,
};
pub use error::{SyncError, SyncResult};
pub use manager::{ChannelFailure, SyncCycleResult, SyncManager, SyncState, SyncStats};
pub use source::{DownloadResponse, MockSource, SyncSource, UploadResponse, UploadedPage};
