//! Per-item processing task.
//!
//! One task per admitted attempt. It owns the compression permit taken at
//! admission, reads a deferred source from disk, runs the optional original
//! upload, compression and the preview upload, and reports exactly one
//! outcome back to the scheduler. Source bytes read here live only as long
//! as the attempt.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use proofsheet_core::{
    until_cancelled, CompressedImage, ItemStatus, PipelineError, PreviewMetadata, SourceFile,
    UploadResult,
};

use crate::retry;
use crate::scheduler::Shared;
use crate::slots::{self, SlotKind, SlotPermit};

pub(crate) const PROGRESS_ADMITTED: u8 = 5;
const PROGRESS_ORIGINAL_STORED: u8 = 20;
const PROGRESS_COMPRESSED: u8 = 25;
const PROGRESS_COMPRESSED_WITH_ORIGINAL: u8 = 40;
const PROGRESS_UPLOAD_STARTED: u8 = 50;

/// Everything an attempt needs, copied out of the scheduler state at admission.
pub(crate) struct Job {
    pub(crate) id: Uuid,
    pub(crate) attempt: u64,
    pub(crate) cancel: CancellationToken,
    pub(crate) file: SourceFile,
    pub(crate) upload_key: String,
    pub(crate) original_path: Option<String>,
}

#[tracing::instrument(
    name = "pipeline_item",
    skip_all,
    fields(item_id = %job.id, attempt = job.attempt, gallery_id = %shared.config.gallery_id)
)]
pub(crate) async fn process_item(shared: Arc<Shared>, job: Job, compression: SlotPermit) {
    let outcome = AssertUnwindSafe(run_steps(&shared, &job, compression))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(result)) => shared.complete(&job, result),
        Ok(Err(e)) => shared.fail(&job, e),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(item_id = %job.id, panic = %message, "Item task panicked");
            shared.fail(&job, PipelineError::Internal(message));
        }
    }
}

async fn run_steps(
    shared: &Arc<Shared>,
    job: &Job,
    compression: SlotPermit,
) -> Result<UploadResult, PipelineError> {
    let config = &shared.config;
    let cancel = &job.cancel;

    let file = until_cancelled(cancel, job.file.load()).await?;
    if job.file.is_deferred() {
        tracing::debug!(item_id = %job.id, size = file.size(), "Source read from disk");
    }

    if config.upload_originals {
        match &job.original_path {
            Some(path) => {
                tracing::debug!(item_id = %job.id, storage_path = %path, "Reusing stored original");
            }
            None => {
                let uploader = shared.collaborators.original_uploader.as_ref().ok_or_else(|| {
                    PipelineError::Internal("original uploader missing".to_string())
                })?;
                shared.transition(job, ItemStatus::UploadingOriginal, PROGRESS_ADMITTED)?;
                let upload = slots::acquire(shared, SlotKind::Upload, cancel).await?;
                let path = until_cancelled(
                    cancel,
                    uploader.upload_original(&file, config.gallery_id, cancel),
                )
                .await?;
                drop(upload);
                tracing::debug!(item_id = %job.id, storage_path = %path, "Original stored");
                shared.record_original(job, path, PROGRESS_ORIGINAL_STORED)?;
                shared.transition(job, ItemStatus::Compressing, PROGRESS_ORIGINAL_STORED)?;
            }
        }
    }

    let compressed = compress_or_fallback(shared, job, &file).await?;
    drop(file);
    let progress = if config.upload_originals {
        PROGRESS_COMPRESSED_WITH_ORIGINAL
    } else {
        PROGRESS_COMPRESSED
    };
    shared.transition(job, ItemStatus::UploadingPreview, progress)?;
    drop(compression);

    let upload = slots::acquire(shared, SlotKind::Upload, cancel).await?;
    shared.set_progress(job, PROGRESS_UPLOAD_STARTED)?;

    let metadata = PreviewMetadata {
        gallery_id: config.gallery_id,
        filename: compressed.filename.clone(),
        width: compressed.width,
        height: compressed.height,
        content_type: compressed.content_type.clone(),
        idempotency_key: job.upload_key.clone(),
        skip_quota: config.skip_quota,
    };
    let uploader = &shared.collaborators.preview_uploader;
    let metadata = &metadata;
    let blob = &compressed.data;
    let result = retry::with_backoff(&config.upload_backoff, cancel, "upload_preview", move |_| {
        until_cancelled(cancel, uploader.upload_preview(blob.clone(), metadata, cancel))
    })
    .await?;
    drop(upload);

    Ok(result)
}

/// Compress the source. Without a watermark a compression failure falls back
/// to the untouched source bytes; with one the item fails.
async fn compress_or_fallback(
    shared: &Shared,
    job: &Job,
    file: &SourceFile,
) -> Result<CompressedImage, PipelineError> {
    let compressor = &shared.collaborators.compressor;
    let outcome = until_cancelled(
        &job.cancel,
        compressor.compress(file, &shared.compress_options, &job.cancel),
    )
    .await;

    match outcome {
        Ok(image) => Ok(image),
        Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
        Err(e) if shared.config.watermark_required() => {
            let detail = match e {
                PipelineError::Compression(message) => message,
                other => other.to_string(),
            };
            Err(PipelineError::Compression(format!(
                "{}; watermark required, preview not uploaded",
                detail
            )))
        }
        Err(e) => {
            let (width, height) = compressor.probe_dimensions(file).unwrap_or((0, 0));
            tracing::warn!(
                item_id = %job.id,
                filename = %file.name,
                error = %e,
                width,
                height,
                "Compression failed, uploading original as preview"
            );
            Ok(CompressedImage {
                data: file.data.clone(),
                width,
                height,
                content_type: file.content_type.clone(),
                filename: file.name.clone(),
            })
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "item task panicked".to_string()
    }
}
