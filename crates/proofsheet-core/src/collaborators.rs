//! Collaborator contracts consumed by the upload pipeline.
//!
//! The pipeline owns scheduling only. Compression and the two upload flavours
//! are supplied by the caller through these traits. Every call receives the
//! item's [`CancellationToken`]; implementations must check it at their own
//! suspension points and return [`PipelineError::Cancelled`] once it fires.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{CompressOptions, CompressedImage, PreviewMetadata, SourceFile, UploadResult};

/// Re-encodes an image for preview delivery (resize, watermark, EXIF strip).
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(
        &self,
        file: &SourceFile,
        options: &CompressOptions,
        cancel: &CancellationToken,
    ) -> Result<CompressedImage, PipelineError>;

    /// Read pixel dimensions without a full decode.
    ///
    /// Used when compression failed and the original bytes are uploaded as the
    /// preview. Returns `None` when the header cannot be parsed.
    fn probe_dimensions(&self, _file: &SourceFile) -> Option<(u32, u32)> {
        None
    }
}

/// Stores an unmodified, full-resolution copy of the source file.
#[async_trait]
pub trait OriginalUploader: Send + Sync {
    /// Returns the storage path of the stored original.
    async fn upload_original(
        &self,
        file: &SourceFile,
        gallery_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError>;
}

/// Stores the preview artifact. Each successful call consumes one quota unit
/// unless `metadata.skip_quota` is set.
#[async_trait]
pub trait PreviewUploader: Send + Sync {
    async fn upload_preview(
        &self,
        blob: Bytes,
        metadata: &PreviewMetadata,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, PipelineError>;
}
