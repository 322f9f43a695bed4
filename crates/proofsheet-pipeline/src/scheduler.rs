//! Pipeline scheduler: item queue, admission, cancellation, retry, teardown.
//!
//! All mutable state sits in one [`State`] behind a std mutex. The lock is
//! only taken for short, synchronous critical sections and is never held
//! across an await point or while an observer callback runs.
//!
//! Observer callbacks are serialized by a second, outer `dispatch` lock. Any
//! path that changes an item takes it before the state lock and keeps it
//! until its callbacks have returned, so observers see snapshots in the
//! order the changes were applied, even on a multi-thread runtime. Lock
//! order is always dispatch, then state. Every admitted item is driven by
//! one spawned task (see `item.rs`).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use proofsheet_core::{
    derive_upload_key, CompressOptions, Compressor, ErrorMetadata, ItemStatus, LogLevel,
    OriginalUploader, PipelineConfig, PipelineError, PipelineItem, PreviewUploader, SourceFile,
    UploadResult, MAX_ITEM_RETRIES,
};

use crate::item::{self, Job, PROGRESS_ADMITTED};
use crate::observer::{NoopObserver, PipelineObserver};
use crate::previews::{LocalPreviews, PreviewFactory};
use crate::slots::{SlotCounter, SlotKind, SlotPermit};

pub(crate) struct Collaborators {
    pub(crate) compressor: Arc<dyn Compressor>,
    pub(crate) original_uploader: Option<Arc<dyn OriginalUploader>>,
    pub(crate) preview_uploader: Arc<dyn PreviewUploader>,
}

struct ItemRecord {
    item: PipelineItem,
    /// Bumped on every retry; writes from older attempts are discarded.
    attempt: u64,
    cancel: CancellationToken,
}

struct State {
    queue: Vec<ItemRecord>,
    compression: SlotCounter,
    upload: SlotCounter,
    epoch: u64,
    idle_notified: bool,
    destroyed: bool,
}

impl State {
    fn counter(&mut self, kind: SlotKind) -> &mut SlotCounter {
        match kind {
            SlotKind::Compression => &mut self.compression,
            SlotKind::Upload => &mut self.upload,
        }
    }

    /// Live record for `job`, or `None` when the job is stale: the item was
    /// removed, retried since, or already reached a terminal state.
    fn live_record(&mut self, job: &Job) -> Option<&mut ItemRecord> {
        self.queue.iter_mut().find(|r| {
            r.item.id == job.id && r.attempt == job.attempt && !r.item.status.is_terminal()
        })
    }

    fn is_idle(&self) -> bool {
        self.compression.active() == 0
            && self.upload.active() == 0
            && self.queue.iter().all(|r| r.item.status.is_terminal())
    }
}

pub(crate) struct Shared {
    pub(crate) config: PipelineConfig,
    pub(crate) compress_options: CompressOptions,
    batch_id: Uuid,
    pub(crate) collaborators: Collaborators,
    observer: Arc<dyn PipelineObserver>,
    previews: Arc<dyn PreviewFactory>,
    state: Mutex<State>,
    dispatch: Mutex<()>,
    idle: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Held from a state change until its observer callbacks return.
    fn dispatch(&self) -> MutexGuard<'_, ()> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `update` to the job's live record and publish the new snapshot.
    /// Returns `Cancelled` when the job is stale so the task stops early.
    fn update(
        &self,
        job: &Job,
        update: impl FnOnce(&mut PipelineItem),
    ) -> Result<(), PipelineError> {
        let _dispatch = self.dispatch();
        let snapshot = {
            let mut state = self.lock();
            let record = state.live_record(job).ok_or(PipelineError::Cancelled)?;
            update(&mut record.item);
            record.item.clone()
        };
        self.observer.on_item_update(&snapshot);
        Ok(())
    }

    pub(crate) fn transition(
        &self,
        job: &Job,
        status: ItemStatus,
        progress: u8,
    ) -> Result<(), PipelineError> {
        self.update(job, |item| {
            item.status = status;
            item.progress = item.progress.max(progress);
        })
    }

    pub(crate) fn set_progress(&self, job: &Job, progress: u8) -> Result<(), PipelineError> {
        self.update(job, |item| item.progress = item.progress.max(progress))
    }

    pub(crate) fn record_original(
        &self,
        job: &Job,
        storage_path: String,
        progress: u8,
    ) -> Result<(), PipelineError> {
        self.update(job, |item| {
            item.original_path = Some(storage_path);
            item.progress = item.progress.max(progress);
        })
    }

    pub(crate) fn complete(self: &Arc<Self>, job: &Job, result: UploadResult) {
        let dispatch = self.dispatch();
        let snapshot = {
            let mut state = self.lock();
            let Some(record) = state.live_record(job) else {
                tracing::debug!(item_id = %job.id, "Discarding result of stale attempt");
                return;
            };
            record.item.status = ItemStatus::Done;
            record.item.progress = 100;
            record.item.error = None;
            record.item.error_kind = None;
            record.item.result = Some(result);
            // Source bytes are only needed for another attempt.
            record.item.file.data = bytes::Bytes::new();
            record.item.clone()
        };

        tracing::info!(
            item_id = %snapshot.id,
            filename = %snapshot.filename,
            "Item uploaded"
        );
        self.observer.on_item_update(&snapshot);
        self.observer.on_item_done(&snapshot);
        drop(dispatch);
        self.tick();
    }

    pub(crate) fn fail(self: &Arc<Self>, job: &Job, err: PipelineError) {
        let dispatch = self.dispatch();
        let snapshot = {
            let mut state = self.lock();
            let Some(record) = state.live_record(job) else {
                tracing::debug!(item_id = %job.id, error = %err, "Discarding error of stale attempt");
                return;
            };
            record.item.status = ItemStatus::Error;
            record.item.error = Some(err.to_string());
            record.item.error_kind = err.kind();
            record.item.clone()
        };

        match err.log_level() {
            LogLevel::Debug => {
                tracing::debug!(item_id = %job.id, error_code = err.error_code(), error = %err, "Item stopped")
            }
            LogLevel::Warn => {
                tracing::warn!(item_id = %job.id, error_code = err.error_code(), error = %err, "Item failed")
            }
            LogLevel::Error => {
                tracing::error!(item_id = %job.id, error_code = err.error_code(), error = %err, "Item failed")
            }
        }
        self.observer.on_item_update(&snapshot);
        drop(dispatch);
        self.tick();
    }

    /// Take a slot without waiting. Returns the epoch the slot belongs to.
    pub(crate) fn try_acquire(&self, kind: SlotKind) -> Option<u64> {
        let mut state = self.lock();
        if state.destroyed {
            return None;
        }
        let epoch = state.epoch;
        state.counter(kind).acquire().then_some(epoch)
    }

    pub(crate) fn release_slot(&self, kind: SlotKind, epoch: u64) {
        let mut state = self.lock();
        if state.epoch == epoch {
            state.counter(kind).release();
        }
    }

    /// Admit queued items into free compression slots and detect idleness.
    pub(crate) fn tick(self: &Arc<Self>) {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("No tokio runtime available, admission deferred");
            return;
        };

        let dispatch = self.dispatch();
        let mut admitted = Vec::new();
        let mut became_idle = false;
        {
            let mut guard = self.lock();
            if guard.destroyed {
                return;
            }
            let state = &mut *guard;
            let epoch = state.epoch;
            while state.compression.has_capacity() {
                let Some(record) = state
                    .queue
                    .iter_mut()
                    .find(|r| r.item.status == ItemStatus::Queued)
                else {
                    break;
                };
                state.compression.acquire();
                record.item.status = ItemStatus::Compressing;
                record.item.progress = record.item.progress.max(PROGRESS_ADMITTED);
                let job = Job {
                    id: record.item.id,
                    attempt: record.attempt,
                    cancel: record.cancel.clone(),
                    file: record.item.file.clone(),
                    upload_key: record.item.upload_key.clone(),
                    original_path: record.item.original_path.clone(),
                };
                admitted.push((record.item.clone(), job, epoch));
            }

            if !state.idle_notified && state.is_idle() {
                state.idle_notified = true;
                became_idle = true;
            }
        }

        let mut jobs = Vec::with_capacity(admitted.len());
        for (snapshot, job, epoch) in admitted {
            tracing::debug!(item_id = %job.id, attempt = job.attempt, "Item admitted");
            self.observer.on_item_update(&snapshot);
            jobs.push((job, epoch));
        }
        if became_idle {
            self.observer.on_pipeline_complete();
        }
        // A task the runtime refuses drops its permit, which re-enters tick.
        drop(dispatch);

        for (job, epoch) in jobs {
            let permit = SlotPermit::new(self.clone(), SlotKind::Compression, epoch);
            handle.spawn(item::process_item(self.clone(), job, permit));
        }
        if became_idle {
            self.idle.notify_waiters();
        }
    }

    fn cancel_item(self: &Arc<Self>, id: Uuid) -> Result<usize, PipelineError> {
        let dispatch = self.dispatch();
        let snapshot = {
            let mut state = self.lock();
            if state.destroyed {
                return Err(PipelineError::Destroyed);
            }
            let Some(record) = state.queue.iter_mut().find(|r| r.item.id == id) else {
                return Ok(0);
            };
            if record.item.status.is_terminal() {
                return Ok(0);
            }
            record.cancel.cancel();
            record.item.status = ItemStatus::Error;
            record.item.error = Some(PipelineError::Cancelled.to_string());
            record.item.error_kind = PipelineError::Cancelled.kind();
            record.item.clone()
        };

        tracing::info!(item_id = %id, "Item cancelled");
        self.observer.on_item_update(&snapshot);
        drop(dispatch);
        self.tick();
        Ok(1)
    }

    /// Cancel every non-terminal item, drop the queue and reset both pools.
    fn cancel_all_inner(&self, mark_destroyed: bool) -> Result<usize, PipelineError> {
        let dispatch = self.dispatch();
        let (cancelled, handles, fire_complete) = {
            let mut state = self.lock();
            if state.destroyed {
                return Err(PipelineError::Destroyed);
            }

            let mut cancelled = Vec::new();
            let mut handles = Vec::new();
            for mut record in std::mem::take(&mut state.queue) {
                record.cancel.cancel();
                if !record.item.status.is_terminal() {
                    record.item.status = ItemStatus::Error;
                    record.item.error = Some(PipelineError::Cancelled.to_string());
                    record.item.error_kind = PipelineError::Cancelled.kind();
                    cancelled.push(record.item.clone());
                }
                if let Some(handle) = record.item.preview.take() {
                    handles.push(handle);
                }
            }

            state.compression.reset();
            state.upload.reset();
            state.epoch += 1;
            let fire_complete = !state.idle_notified;
            state.idle_notified = true;
            state.destroyed = mark_destroyed;
            (cancelled, handles, fire_complete)
        };

        tracing::info!(
            cancelled = cancelled.len(),
            released_previews = handles.len(),
            destroyed = mark_destroyed,
            "Cancelled all items"
        );
        for handle in &handles {
            self.previews.release(handle);
        }
        for snapshot in &cancelled {
            self.observer.on_item_update(snapshot);
        }
        if fire_complete {
            self.observer.on_pipeline_complete();
        }
        drop(dispatch);
        self.idle.notify_waiters();
        Ok(cancelled.len())
    }
}

/// Running tally of item states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub total: usize,
    pub queued: usize,
    /// Compressing or uploading
    pub in_flight: usize,
    pub done: usize,
    /// Errors other than cancellation (includes quota rejections)
    pub failed: usize,
    pub cancelled: usize,
    pub quota_exceeded: usize,
}

impl PipelineStats {
    pub fn tally<'a>(items: impl IntoIterator<Item = &'a PipelineItem>) -> Self {
        let mut stats = PipelineStats::default();
        for item in items {
            stats.total += 1;
            match item.status {
                ItemStatus::Queued => stats.queued += 1,
                ItemStatus::Done => stats.done += 1,
                ItemStatus::Error if item.is_cancelled() => stats.cancelled += 1,
                ItemStatus::Error => {
                    stats.failed += 1;
                    if item.is_quota_exceeded() {
                        stats.quota_exceeded += 1;
                    }
                }
                _ => stats.in_flight += 1,
            }
        }
        stats
    }
}

/// Builds a [`Pipeline`] from its configuration and collaborators.
pub struct PipelineBuilder {
    config: PipelineConfig,
    compressor: Option<Arc<dyn Compressor>>,
    original_uploader: Option<Arc<dyn OriginalUploader>>,
    preview_uploader: Option<Arc<dyn PreviewUploader>>,
    observer: Arc<dyn PipelineObserver>,
    previews: Arc<dyn PreviewFactory>,
}

impl PipelineBuilder {
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn original_uploader(mut self, uploader: Arc<dyn OriginalUploader>) -> Self {
        self.original_uploader = Some(uploader);
        self
    }

    pub fn preview_uploader(mut self, uploader: Arc<dyn PreviewUploader>) -> Self {
        self.preview_uploader = Some(uploader);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn previews(mut self, previews: Arc<dyn PreviewFactory>) -> Self {
        self.previews = previews;
        self
    }

    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.config.validate()?;
        let compressor = self
            .compressor
            .ok_or_else(|| PipelineError::InvalidConfig("a compressor is required".to_string()))?;
        let preview_uploader = self.preview_uploader.ok_or_else(|| {
            PipelineError::InvalidConfig("a preview uploader is required".to_string())
        })?;
        if self.config.upload_originals && self.original_uploader.is_none() {
            return Err(PipelineError::InvalidConfig(
                "upload_originals is set but no original uploader was provided".to_string(),
            ));
        }

        let state = State {
            queue: Vec::new(),
            compression: SlotCounter::new(self.config.compression_slots),
            upload: SlotCounter::new(self.config.upload_slots),
            epoch: 0,
            idle_notified: true,
            destroyed: false,
        };
        let batch_id = Uuid::new_v4();
        tracing::info!(
            gallery_id = %self.config.gallery_id,
            batch_id = %batch_id,
            compression_slots = self.config.compression_slots,
            upload_slots = self.config.upload_slots,
            upload_originals = self.config.upload_originals,
            watermark = self.config.watermark_required(),
            "Upload pipeline created"
        );

        Ok(Pipeline {
            shared: Arc::new(Shared {
                compress_options: self.config.compress_options(),
                config: self.config,
                batch_id,
                collaborators: Collaborators {
                    compressor,
                    original_uploader: self.original_uploader,
                    preview_uploader,
                },
                observer: self.observer,
                previews: self.previews,
                state: Mutex::new(state),
                dispatch: Mutex::new(()),
                idle: Notify::new(),
            }),
        })
    }
}

/// Continuous upload pipeline for one gallery session.
///
/// Dropping the pipeline destroys it: every in-flight item is cancelled and
/// every preview handle is released.
pub struct Pipeline {
    shared: Arc<Shared>,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            compressor: None,
            original_uploader: None,
            preview_uploader: None,
            observer: Arc::new(NoopObserver),
            previews: Arc::new(LocalPreviews::new()),
        }
    }

    /// Queue files for processing. Returns the new items (all `queued`)
    /// without waiting for any of them to start.
    pub fn add(&self, files: Vec<SourceFile>) -> Result<Vec<PipelineItem>, PipelineError> {
        let shared = &self.shared;
        if shared.lock().destroyed {
            return Err(PipelineError::Destroyed);
        }
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let items: Vec<PipelineItem> = files
            .into_iter()
            .map(|file| {
                let preview = shared.previews.create(&file);
                let key = derive_upload_key(
                    shared.config.gallery_id,
                    shared.batch_id,
                    &file.name,
                    file.size(),
                );
                PipelineItem::new(file, preview, key)
            })
            .collect();

        let dispatch = shared.dispatch();
        {
            let mut state = shared.lock();
            if state.destroyed {
                drop(state);
                for item in &items {
                    if let Some(handle) = &item.preview {
                        shared.previews.release(handle);
                    }
                }
                return Err(PipelineError::Destroyed);
            }
            state.queue.extend(items.iter().cloned().map(|item| ItemRecord {
                item,
                attempt: 0,
                cancel: CancellationToken::new(),
            }));
            state.idle_notified = false;
        }

        tracing::info!(count = items.len(), "Files queued");
        for item in &items {
            shared.observer.on_item_update(item);
        }
        drop(dispatch);
        shared.tick();
        Ok(items)
    }

    /// Cancel one item (`Some(id)`) or everything (`None`). Returns how many
    /// items were moved to `error`.
    ///
    /// Cancelling everything also empties the queue, releases every preview
    /// handle and resets both slot pools.
    pub fn cancel(&self, id: Option<Uuid>) -> Result<usize, PipelineError> {
        match id {
            Some(id) => self.shared.cancel_item(id),
            None => self.shared.cancel_all_inner(false),
        }
    }

    /// Re-queue a failed item. Returns `false` (and changes nothing) unless the
    /// item is in `error` and has retries left.
    pub fn retry(&self, id: Uuid) -> Result<bool, PipelineError> {
        let shared = &self.shared;
        let dispatch = shared.dispatch();
        let snapshot = {
            let mut state = shared.lock();
            if state.destroyed {
                return Err(PipelineError::Destroyed);
            }
            let Some(record) = state.queue.iter_mut().find(|r| r.item.id == id) else {
                return Ok(false);
            };
            if record.item.status != ItemStatus::Error || record.item.retry_count >= MAX_ITEM_RETRIES
            {
                return Ok(false);
            }
            record.attempt += 1;
            record.cancel = CancellationToken::new();
            record.item.status = ItemStatus::Queued;
            record.item.progress = 0;
            record.item.error = None;
            record.item.error_kind = None;
            record.item.result = None;
            record.item.retry_count += 1;
            let snapshot = record.item.clone();
            state.idle_notified = false;
            snapshot
        };

        tracing::info!(
            item_id = %id,
            retry_count = snapshot.retry_count,
            "Item re-queued"
        );
        shared.observer.on_item_update(&snapshot);
        drop(dispatch);
        shared.tick();
        Ok(true)
    }

    /// Cancel everything, release every preview handle and reject any further
    /// operation with [`PipelineError::Destroyed`]. Idempotent.
    pub fn destroy(&self) {
        match self.shared.cancel_all_inner(true) {
            Ok(_) | Err(PipelineError::Destroyed) => {}
            Err(e) => tracing::error!(error = %e, "Pipeline teardown failed"),
        }
    }

    /// Snapshots of every item in insertion order.
    pub fn items(&self) -> Vec<PipelineItem> {
        self.shared
            .lock()
            .queue
            .iter()
            .map(|r| r.item.clone())
            .collect()
    }

    pub fn item(&self, id: Uuid) -> Option<PipelineItem> {
        self.shared
            .lock()
            .queue
            .iter()
            .find(|r| r.item.id == id)
            .map(|r| r.item.clone())
    }

    /// True while any item is queued or in flight.
    pub fn is_active(&self) -> bool {
        self.shared
            .lock()
            .queue
            .iter()
            .any(|r| !r.item.status.is_terminal())
    }

    pub fn active_compressions(&self) -> usize {
        self.shared.lock().compression.active()
    }

    pub fn active_uploads(&self) -> usize {
        self.shared.lock().upload.active()
    }

    pub fn stats(&self) -> PipelineStats {
        let state = self.shared.lock();
        PipelineStats::tally(state.queue.iter().map(|r| &r.item))
    }

    /// Identifier mixed into every upload key of this session.
    pub fn batch_id(&self) -> Uuid {
        self.shared.batch_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.lock().destroyed
    }

    /// Resolve once the pipeline has nothing queued or in flight.
    pub async fn wait_idle(&self) {
        self.shared.tick();
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.lock().idle_notified {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}
