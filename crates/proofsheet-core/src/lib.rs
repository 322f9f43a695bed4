//! Proofsheet Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration and
//! collaborator contracts shared by every Proofsheet component. The upload
//! pipeline itself lives in `proofsheet-pipeline`; concrete compressors and
//! uploaders implement the traits in [`collaborators`].

pub mod cancel;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod upload_key;

// Re-export commonly used types
pub use cancel::until_cancelled;
pub use collaborators::{Compressor, OriginalUploader, PreviewUploader};
pub use config::{AuthScheme, BackoffPolicy, ClientConfig, PipelineConfig, MAX_ITEM_RETRIES};
pub use error::{ErrorMetadata, LogLevel, PipelineError};
pub use models::{
    CompressOptions, CompressedImage, ErrorKind, ItemStatus, PipelineItem, PreviewFormat,
    PreviewHandle, PreviewMetadata, SourceFile, UploadResult, WatermarkDescriptor,
    WatermarkPosition, WatermarkSize,
};
pub use network::NetworkQuality;
pub use upload_key::derive_upload_key;

/// Cancellation capability handed to every collaborator call.
pub use tokio_util::sync::CancellationToken;
