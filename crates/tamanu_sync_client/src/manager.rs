//! The sync manager: upload and download loops per channel.

use crate::config::SyncClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::source::SyncSource;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tamanu_core::facts::{LAST_SUCCESSFUL_PULL, LAST_SUCCESSFUL_PUSH};
use tamanu_core::{
    Channel, Model, RecordId, SyncDatabase, SyncRecord, Timestamp, UploadQuery,
};
use tracing::{debug, info, warn};

/// The current state of the sync manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Not syncing.
    Idle,
    /// Exporting and uploading marked records.
    Uploading,
    /// Downloading and importing records.
    Downloading,
    /// Waiting before retrying a call to central.
    RetryWait,
    /// The last run completed without channel errors.
    Synced,
    /// The last run had channel errors.
    Error,
}

impl SyncState {
    /// Returns true if a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Uploading | SyncState::Downloading | SyncState::RetryWait
        )
    }
}

/// Statistics about sync runs.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs completed, with or without channel errors.
    pub cycles_completed: u64,
    /// Records uploaded and confirmed.
    pub records_uploaded: u64,
    /// Records downloaded and imported.
    pub records_downloaded: u64,
    /// Calls to central that were retried.
    pub retries: u64,
    /// When the last run finished.
    pub last_sync_time: Option<Timestamp>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// A channel that failed during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFailure {
    /// The channel.
    pub channel: String,
    /// The error it failed with.
    pub error: String,
}

/// Result of a sync run.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Records uploaded.
    pub uploaded: u64,
    /// Records downloaded.
    pub downloaded: u64,
    /// Channels that failed. Other channels still ran.
    pub failures: Vec<ChannelFailure>,
    /// Duration of the run.
    pub duration: Duration,
}

impl SyncCycleResult {
    fn new() -> Self {
        Self {
            uploaded: 0,
            downloaded: 0,
            failures: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Returns true if every channel synced.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Clears the syncing flag when a run ends, however it ends.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives uploads and downloads between a local database and central.
pub struct SyncManager<S: SyncSource> {
    db: SyncDatabase,
    source: Arc<S>,
    config: SyncClientConfig,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    syncing: AtomicBool,
    cancelled: AtomicBool,
}

impl<S: SyncSource> SyncManager<S> {
    /// Creates a new sync manager.
    pub fn new(db: SyncDatabase, source: Arc<S>, config: SyncClientConfig) -> Self {
        Self {
            db,
            source,
            config,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            syncing: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a run is in progress.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// The source this manager talks to.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Cancels any ongoing run at its next page boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts.
    fn with_retry<T>(&self, mut call: impl FnMut() -> SyncResult<T>) -> SyncResult<T> {
        let retry = &self.config.retry;
        let resume = self.state();
        let mut attempt = 0;
        loop {
            self.check_cancelled()?;
            match call() {
                Ok(value) => {
                    if attempt > 0 {
                        self.set_state(resume);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(error = %e, attempt, ?delay, "call to central failed, retrying");
                    self.set_state(SyncState::RetryWait);
                    self.stats.write().retries += 1;
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Uploads every record of `model` marked for upload on `channel`.
    ///
    /// Pages through the upload-candidate query with the last id of each
    /// page as the cursor. Each page is exported, uploaded, and confirmed
    /// with the `requested_at` central answered with.
    ///
    /// Returns the number of records uploaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database fails or an upload fails after its
    /// retries. Pages confirmed before the failure stay confirmed.
    pub fn export_and_upload(&self, model: &Model, channel: &str) -> SyncResult<usize> {
        if !model.sync_direction().pushes() {
            debug!(table = model.table(), channel, "type does not push, skipping upload");
            return Ok(0);
        }
        let plan = model.export_plan()?;
        info!(table = model.table(), channel, "export started");

        let mut after: Option<RecordId> = None;
        let mut uploaded = 0;
        let mut page = 0usize;
        loop {
            self.check_cancelled()?;
            let mut query = UploadQuery::new(channel).limit(self.config.upload_limit);
            if let Some(after) = &after {
                query = query.after(after.clone());
            }
            let records = model.find_marked_for_upload(&query)?;
            let Some(last) = records.last() else {
                break;
            };
            after = Some(last.id.clone());

            let ids: Vec<RecordId> = records.iter().map(|r| r.id.clone()).collect();
            let exported: Vec<SyncRecord> = records.iter().map(|r| plan.export(r)).collect();

            debug!(channel, page, count = exported.len(), "uploading page");
            let response = self.with_retry(|| self.source.upload_records(channel, &exported))?;

            debug!(channel, page, "marking page uploaded");
            model.mark_uploaded(&ids, response.requested_at)?;
            uploaded += ids.len();
            page += 1;
        }

        info!(table = model.table(), channel, uploaded, "export ended");
        Ok(uploaded)
    }

    /// Downloads and imports every record central has for `channel` past the
    /// stored pull cursor.
    ///
    /// The cursor is persisted after each page is imported. The page size
    /// adapts to how long each download took.
    ///
    /// Returns the number of records imported.
    ///
    /// # Errors
    ///
    /// Returns an error if a download fails after its retries, a page cannot
    /// be fully imported, or the database fails. The cursor stays at the
    /// last fully imported page.
    pub fn download_and_import(&self, model: &Model, channel: &str) -> SyncResult<usize> {
        if !model.sync_direction().pulls() {
            debug!(table = model.table(), channel, "type does not pull, skipping download");
            return Ok(0);
        }
        let facts = self.db.facts();
        let mut cursor = facts.pull_cursor(channel)?;
        let mut limit = self.config.initial_download_limit;
        let mut imported = 0;
        info!(table = model.table(), channel, cursor = ?cursor, "import started");

        loop {
            self.check_cancelled()?;
            let started = Instant::now();
            let response = self.with_retry(|| {
                self.source
                    .download_records(channel, cursor.as_deref(), limit)
            })?;
            let download_time = started.elapsed();

            if response.records.is_empty() {
                break;
            }

            self.import_page(model, channel, &response.records)?;
            imported += response.records.len();
            debug!(
                channel,
                imported,
                remaining = response.count.saturating_sub(response.records.len()),
                limit,
                "imported page"
            );

            facts.set_pull_cursor(channel, &response.cursor)?;
            cursor = Some(response.cursor);
            limit = self.config.next_download_limit(limit, download_time);
        }

        info!(table = model.table(), channel, imported, "import ended");
        Ok(imported)
    }

    /// Imports a page, retrying failed records in further passes while each
    /// pass makes progress. Records can depend on others later in the page.
    fn import_page(&self, model: &Model, channel: &str, records: &[SyncRecord]) -> SyncResult<()> {
        let mut pending: Vec<&SyncRecord> = records.iter().collect();
        loop {
            let mut failed = Vec::new();
            for record in &pending {
                if let Err(e) = model.import_record(record) {
                    debug!(channel, id = ?record.id(), error = %e, "record import failed");
                    failed.push((*record, e));
                }
            }
            if failed.is_empty() {
                return Ok(());
            }
            if failed.len() == pending.len() {
                warn!(channel, failed = failed.len(), "could not import remaining records");
                let first_error = failed[0].1.to_string();
                return Err(SyncError::ImportFailed {
                    channel: channel.to_string(),
                    failed: failed.len(),
                    first_error,
                });
            }
            info!(channel, failed = failed.len(), "reattempting failed records");
            pending = failed.into_iter().map(|(record, _)| record).collect();
        }
    }

    /// Uploads every pushing type, then downloads every pulling type, each
    /// on the channel named after its table.
    ///
    /// A failing channel is recorded and the run moves on.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadySyncing`] if a run is in progress and
    /// [`SyncError::Cancelled`] if the run was cancelled.
    pub fn run_sync(&self, models: &[Model]) -> SyncResult<SyncCycleResult> {
        let channels: Vec<(&Model, String)> = models
            .iter()
            .map(|model| (model, model.table().to_string()))
            .collect();
        self.run_channels(&channels)
    }

    /// Syncs the records of one patient: every given type scoped to patients
    /// runs on its `patient/<id>/<table>` channel.
    ///
    /// # Errors
    ///
    /// Same as [`SyncManager::run_sync`].
    pub fn run_patient_sync(&self, patient_id: &str, models: &[Model]) -> SyncResult<SyncCycleResult> {
        let channels: Vec<(&Model, String)> = models
            .iter()
            .filter(|model| model.schema().channel_scope_column().is_some())
            .map(|model| (model, Channel::for_patient(patient_id, model.table()).to_string()))
            .collect();
        self.run_channels(&channels)
    }

    fn run_channels(&self, channels: &[(&Model, String)]) -> SyncResult<SyncCycleResult> {
        if self.syncing.swap(true, Ordering::SeqCst) {
            warn!("tried to start syncing while sync in progress");
            return Err(SyncError::AlreadySyncing);
        }
        let _guard = SyncingGuard(&self.syncing);
        self.cancelled.store(false, Ordering::SeqCst);

        let start = Instant::now();
        let mut result = SyncCycleResult::new();
        info!(channels = channels.len(), "sync started");

        self.set_state(SyncState::Uploading);
        for (model, channel) in channels {
            match self.export_and_upload(model, channel) {
                Ok(count) => result.uploaded += count as u64,
                Err(e) => self.record_failure(&mut result, channel, e)?,
            }
        }
        if result.is_success() {
            self.stamp_fact(LAST_SUCCESSFUL_PUSH)?;
        }

        self.set_state(SyncState::Downloading);
        let failures_before = result.failures.len();
        for (model, channel) in channels {
            match self.download_and_import(model, channel) {
                Ok(count) => result.downloaded += count as u64,
                Err(e) => self.record_failure(&mut result, channel, e)?,
            }
        }
        if result.failures.len() == failures_before {
            self.stamp_fact(LAST_SUCCESSFUL_PULL)?;
        }

        result.duration = start.elapsed();
        self.set_state(if result.is_success() {
            SyncState::Synced
        } else {
            SyncState::Error
        });
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.records_uploaded += result.uploaded;
            stats.records_downloaded += result.downloaded;
            stats.last_sync_time = Some(Utc::now());
            if result.is_success() {
                stats.last_error = None;
            }
        }
        info!(
            uploaded = result.uploaded,
            downloaded = result.downloaded,
            failures = result.failures.len(),
            "sync ended"
        );
        Ok(result)
    }

    /// Records a channel failure, or aborts the run if it was cancelled.
    fn record_failure(
        &self,
        result: &mut SyncCycleResult,
        channel: &str,
        error: SyncError,
    ) -> SyncResult<()> {
        if matches!(error, SyncError::Cancelled) {
            self.set_state(SyncState::Idle);
            return Err(error);
        }
        warn!(channel, error = %error, "channel sync failed");
        self.stats.write().last_error = Some(error.to_string());
        result.failures.push(ChannelFailure {
            channel: channel.to_string(),
            error: error.to_string(),
        });
        Ok(())
    }

    /// Stores the current sync tick under `key`.
    fn stamp_fact(&self, key: &str) -> SyncResult<()> {
        let tick = self.db.sync_ticks().current()?;
        self.db.facts().set_tick(key, tick)?;
        Ok(())
    }
}
