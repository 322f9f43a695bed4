//! Continuous upload pipeline.
//!
//! A [`Pipeline`] accepts image files at any time and drives each one through
//! `queued → compressing → (uploading-original) → uploading-preview → done`,
//! with independent bounded pools for compression and upload work. Failures
//! are captured per item; the pipeline itself always makes forward progress.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use proofsheet_core::{PipelineConfig, SourceFile, Compressor, PreviewUploader};
//! # use proofsheet_pipeline::Pipeline;
//! # async fn run(
//! #     compressor: Arc<dyn Compressor>,
//! #     uploader: Arc<dyn PreviewUploader>,
//! # ) -> Result<(), proofsheet_core::PipelineError> {
//! let config = PipelineConfig::new(uuid::Uuid::new_v4());
//! let pipeline = Pipeline::builder(config)
//!     .compressor(compressor)
//!     .preview_uploader(uploader)
//!     .build()?;
//! pipeline.add(vec![SourceFile::new("IMG_0001.jpg", vec![0u8; 16])])?;
//! pipeline.wait_idle().await;
//! # Ok(())
//! # }
//! ```
//!
//! There is no per-step timeout: a hung collaborator call keeps its slot until
//! the item is cancelled. Bounded pools cap aggregate resource usage, not the
//! latency of a single request.

mod item;
pub mod observer;
pub mod previews;
pub mod retry;
mod scheduler;
mod slots;

pub use observer::{NoopObserver, ObserverSet, PipelineObserver, TracingObserver};
pub use previews::{LocalPreviews, PreviewFactory};
pub use retry::with_backoff;
pub use scheduler::{Pipeline, PipelineBuilder, PipelineStats};

pub use proofsheet_core::{
    CancellationToken, ErrorKind, ItemStatus, PipelineConfig, PipelineError, PipelineItem,
    SourceFile, UploadResult,
};
