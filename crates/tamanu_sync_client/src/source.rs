//! The sync source abstraction: how the client talks to central.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tamanu_core::{SyncRecord, Timestamp};

/// Central's answer to an upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResponse {
    /// When central received the upload. Stamped as `uploadedAt`.
    pub requested_at: Timestamp,
}

/// One page of downloaded records.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResponse {
    /// The records, in central's order.
    pub records: Vec<SyncRecord>,
    /// Cursor to continue from after this page.
    pub cursor: String,
    /// Records remaining on the channel, this page included.
    pub count: usize,
}

/// A sync source exchanges records with central.
///
/// This trait abstracts the network layer so that the upload and download
/// loops can run against an in-process source in tests.
pub trait SyncSource: Send + Sync {
    /// Uploads one page of exported records on `channel`.
    fn upload_records(&self, channel: &str, records: &[SyncRecord]) -> SyncResult<UploadResponse>;

    /// Downloads up to `limit` records of `channel` after `cursor`.
    ///
    /// A `None` cursor starts from the beginning of the channel.
    fn download_records(
        &self,
        channel: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> SyncResult<DownloadResponse>;
}

/// A recorded upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedPage {
    /// The channel uploaded on.
    pub channel: String,
    /// The records uploaded.
    pub records: Vec<SyncRecord>,
}

/// An in-process source for testing.
///
/// Downloads serve records queued with [`MockSource::add_remote`], using the
/// position in the channel as cursor. Uploads are recorded.
#[derive(Debug)]
pub struct MockSource {
    connected: AtomicBool,
    remote: Mutex<HashMap<String, Vec<SyncRecord>>>,
    uploads: Mutex<Vec<UploadedPage>>,
    download_limits: Mutex<Vec<usize>>,
    failures: Mutex<VecDeque<SyncError>>,
    requested_at: Mutex<Option<Timestamp>>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    /// Creates a new, connected mock source.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            remote: Mutex::new(HashMap::new()),
            uploads: Mutex::new(Vec::new()),
            download_limits: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            requested_at: Mutex::new(None),
        }
    }

    /// Queues records central holds for `channel`.
    pub fn add_remote(&self, channel: &str, records: impl IntoIterator<Item = SyncRecord>) {
        self.remote
            .lock()
            .entry(channel.to_string())
            .or_default()
            .extend(records);
    }

    /// Makes the next calls fail with `error`, one call per queued error.
    pub fn fail_next(&self, error: SyncError) {
        self.failures.lock().push_back(error);
    }

    /// Fixes the `requested_at` of every following upload.
    pub fn set_requested_at(&self, requested_at: Timestamp) {
        *self.requested_at.lock() = Some(requested_at);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// All uploads so far.
    pub fn uploads(&self) -> Vec<UploadedPage> {
        self.uploads.lock().clone()
    }

    /// Every record uploaded on `channel`, in upload order.
    pub fn uploaded_records(&self, channel: &str) -> Vec<SyncRecord> {
        self.uploads
            .lock()
            .iter()
            .filter(|page| page.channel == channel)
            .flat_map(|page| page.records.iter().cloned())
            .collect()
    }

    /// The `limit` of every download so far.
    pub fn download_limits(&self) -> Vec<usize> {
        self.download_limits.lock().clone()
    }

    fn check_call(&self) -> SyncResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl SyncSource for MockSource {
    fn upload_records(&self, channel: &str, records: &[SyncRecord]) -> SyncResult<UploadResponse> {
        self.check_call()?;
        self.uploads.lock().push(UploadedPage {
            channel: channel.to_string(),
            records: records.to_vec(),
        });
        let requested_at = (*self.requested_at.lock()).unwrap_or_else(chrono::Utc::now);
        Ok(UploadResponse { requested_at })
    }

    fn download_records(
        &self,
        channel: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> SyncResult<DownloadResponse> {
        self.check_call()?;
        self.download_limits.lock().push(limit);

        let start = match cursor {
            None => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| SyncError::Protocol(format!("unknown cursor {cursor:?}")))?,
        };
        let remote = self.remote.lock();
        let all = remote.get(channel).map(Vec::as_slice).unwrap_or_default();
        let start = start.min(all.len());
        let end = start.saturating_add(limit).min(all.len());

        Ok(DownloadResponse {
            records: all[start..end].to_vec(),
            cursor: end.to_string(),
            count: all.len() - start,
        })
    }
}
