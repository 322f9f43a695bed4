use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use proofsheet_core::models::preview_filename;
use proofsheet_core::{
    CompressOptions, CompressedImage, Compressor, ItemStatus, OriginalUploader, PipelineError,
    PipelineItem, PreviewMetadata, PreviewUploader, SourceFile, UploadResult,
};
use proofsheet_pipeline::{CancellationToken, PipelineObserver};
use uuid::Uuid;

async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<(), PipelineError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Tracks how many calls are running at once.
#[derive(Default)]
pub struct Gauge {
    active: AtomicUsize,
    max: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) -> GaugeGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(self)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

pub struct GaugeGuard<'a>(&'a Gauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Compressor that sleeps, then returns an 800x600 JPEG stand-in.
/// Files can be scripted to fail or panic.
pub struct ScriptedCompressor {
    delay: Duration,
    per_file_delay: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    pub gauge: Gauge,
}

impl ScriptedCompressor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            per_file_delay: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            gauge: Gauge::default(),
        }
    }

    pub fn failing(self, name: &str) -> Self {
        self.failing.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn panicking(self, name: &str) -> Self {
        self.panicking.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn slow(self, name: &str, delay: Duration) -> Self {
        self.per_file_delay
            .lock()
            .unwrap()
            .insert(name.to_string(), delay);
        self
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|n| *n == name).count()
    }
}

#[async_trait]
impl Compressor for ScriptedCompressor {
    async fn compress(
        &self,
        file: &SourceFile,
        options: &CompressOptions,
        cancel: &CancellationToken,
    ) -> Result<CompressedImage, PipelineError> {
        self.calls.lock().unwrap().push(file.name.clone());
        let _running = self.gauge.enter();
        let delay = self
            .per_file_delay
            .lock()
            .unwrap()
            .get(&file.name)
            .copied()
            .unwrap_or(self.delay);
        pause(delay, cancel).await?;

        if self.panicking.lock().unwrap().contains(&file.name) {
            panic!("decoder blew up on {}", file.name);
        }
        if self.failing.lock().unwrap().contains(&file.name) {
            return Err(PipelineError::Compression("corrupt image data".to_string()));
        }

        Ok(CompressedImage {
            data: Bytes::from(format!("compressed:{}", file.name)),
            width: 800,
            height: 600,
            content_type: options.format.mime_type().to_string(),
            filename: preview_filename(&file.name, options.format),
        })
    }

    fn probe_dimensions(&self, _file: &SourceFile) -> Option<(u32, u32)> {
        Some((4000, 3000))
    }
}

/// One recorded preview upload attempt.
#[derive(Clone, Debug)]
pub struct UploadCall {
    pub blob: Bytes,
    pub metadata: PreviewMetadata,
}

/// Preview uploader that sleeps, then succeeds unless scripted otherwise.
///
/// Scripted errors are keyed by the preview filename and consumed in order;
/// `always_failing` files fail on every attempt.
pub struct ScriptedUploader {
    delay: Duration,
    scripted: Mutex<HashMap<String, VecDeque<PipelineError>>>,
    always: Mutex<HashMap<String, PipelineError>>,
    calls: Mutex<Vec<UploadCall>>,
    pub gauge: Gauge,
}

impl ScriptedUploader {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            scripted: Mutex::new(HashMap::new()),
            always: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gauge: Gauge::default(),
        }
    }

    pub fn failing_first(self, filename: &str, errors: Vec<PipelineError>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(filename.to_string(), errors.into());
        self
    }

    pub fn always_failing(self, filename: &str, error: PipelineError) -> Self {
        self.always
            .lock()
            .unwrap()
            .insert(filename.to_string(), error);
        self
    }

    pub fn calls(&self) -> Vec<UploadCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, filename: &str) -> Vec<UploadCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.metadata.filename == filename)
            .collect()
    }
}

#[async_trait]
impl PreviewUploader for ScriptedUploader {
    async fn upload_preview(
        &self,
        blob: Bytes,
        metadata: &PreviewMetadata,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, PipelineError> {
        self.calls.lock().unwrap().push(UploadCall {
            blob: blob.clone(),
            metadata: metadata.clone(),
        });
        let _running = self.gauge.enter();
        pause(self.delay, cancel).await?;

        if let Some(err) = self.always.lock().unwrap().get(&metadata.filename) {
            return Err(err.clone());
        }
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&metadata.filename)
            .and_then(|queue| queue.pop_front());
        if let Some(err) = scripted {
            return Err(err);
        }

        Ok(UploadResult {
            id: Uuid::new_v4().to_string(),
            filename: metadata.filename.clone(),
            storage_key: format!("{}/{}", metadata.gallery_id, metadata.filename),
            width: metadata.width,
            height: metadata.height,
        })
    }
}

/// Original uploader that records every stored file.
#[derive(Default)]
pub struct OriginalStore {
    stored: Mutex<Vec<String>>,
}

impl OriginalStore {
    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl OriginalUploader for OriginalStore {
    async fn upload_original(
        &self,
        file: &SourceFile,
        gallery_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        pause(Duration::from_millis(150), cancel).await?;
        self.stored.lock().unwrap().push(file.name.clone());
        Ok(format!("{}/originals/{}", gallery_id, file.name))
    }
}

/// Records every callback and tracks how many items were compressing at once.
#[derive(Default)]
pub struct RecordingObserver {
    updates: Mutex<Vec<PipelineItem>>,
    done: Mutex<Vec<Uuid>>,
    complete: AtomicUsize,
    statuses: Mutex<HashMap<Uuid, ItemStatus>>,
    max_compressing: AtomicUsize,
    stall: Mutex<Option<(ItemStatus, Duration)>>,
}

impl RecordingObserver {
    /// Block the calling thread for `delay` on the first update with
    /// `status`, before recording it.
    pub fn stalling_on(self, status: ItemStatus, delay: Duration) -> Self {
        *self.stall.lock().unwrap() = Some((status, delay));
        self
    }

    pub fn updates(&self) -> Vec<PipelineItem> {
        self.updates.lock().unwrap().clone()
    }

    pub fn updates_for(&self, id: Uuid) -> Vec<PipelineItem> {
        self.updates()
            .into_iter()
            .filter(|item| item.id == id)
            .collect()
    }

    pub fn last_update(&self, id: Uuid) -> Option<PipelineItem> {
        self.updates_for(id).pop()
    }

    pub fn done_count(&self, id: Uuid) -> usize {
        self.done.lock().unwrap().iter().filter(|d| **d == id).count()
    }

    pub fn complete_count(&self) -> usize {
        self.complete.load(Ordering::SeqCst)
    }

    pub fn max_compressing(&self) -> usize {
        self.max_compressing.load(Ordering::SeqCst)
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_item_update(&self, item: &PipelineItem) {
        let stall = {
            let mut stall = self.stall.lock().unwrap();
            match *stall {
                Some((status, delay)) if status == item.status => {
                    *stall = None;
                    Some(delay)
                }
                _ => None,
            }
        };
        if let Some(delay) = stall {
            std::thread::sleep(delay);
        }

        self.updates.lock().unwrap().push(item.clone());
        let mut statuses = self.statuses.lock().unwrap();
        statuses.insert(item.id, item.status);
        let compressing = statuses
            .values()
            .filter(|s| **s == ItemStatus::Compressing)
            .count();
        self.max_compressing.fetch_max(compressing, Ordering::SeqCst);
    }

    fn on_item_done(&self, item: &PipelineItem) {
        self.done.lock().unwrap().push(item.id);
    }

    fn on_pipeline_complete(&self) {
        self.complete.fetch_add(1, Ordering::SeqCst);
    }
}
