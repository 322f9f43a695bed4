//! Test helpers: scripted collaborators and a recording observer.
//!
//! Run from workspace root: `cargo test -p proofsheet-pipeline`.
//! Most tests run on a paused clock, so mock delays cost no wall time.

pub mod mocks;

use std::sync::Arc;
use std::time::Duration;

use proofsheet_core::{BackoffPolicy, PipelineConfig};
use proofsheet_pipeline::{LocalPreviews, Pipeline, SourceFile};
use uuid::Uuid;

pub use mocks::{OriginalStore, RecordingObserver, ScriptedCompressor, ScriptedUploader};

pub struct Harness {
    pub pipeline: Pipeline,
    pub compressor: Arc<ScriptedCompressor>,
    pub uploader: Arc<ScriptedUploader>,
    pub originals: Arc<OriginalStore>,
    pub observer: Arc<RecordingObserver>,
    pub previews: Arc<LocalPreviews>,
}

/// Config with short backoff delays for tests.
pub fn test_config() -> PipelineConfig {
    PipelineConfig::new(Uuid::new_v4()).with_upload_backoff(BackoffPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
    })
}

pub fn setup(config: PipelineConfig) -> Harness {
    setup_with(
        config,
        ScriptedCompressor::new(Duration::from_millis(100)),
        ScriptedUploader::new(Duration::from_millis(200)),
    )
}

pub fn setup_with(
    config: PipelineConfig,
    compressor: ScriptedCompressor,
    uploader: ScriptedUploader,
) -> Harness {
    setup_observed(config, compressor, uploader, RecordingObserver::default())
}

pub fn setup_observed(
    config: PipelineConfig,
    compressor: ScriptedCompressor,
    uploader: ScriptedUploader,
    observer: RecordingObserver,
) -> Harness {
    let compressor = Arc::new(compressor);
    let uploader = Arc::new(uploader);
    let originals = Arc::new(OriginalStore::default());
    let observer = Arc::new(observer);
    let previews = Arc::new(LocalPreviews::new());

    let mut builder = Pipeline::builder(config.clone())
        .compressor(compressor.clone())
        .preview_uploader(uploader.clone())
        .observer(observer.clone())
        .previews(previews.clone());
    if config.upload_originals {
        builder = builder.original_uploader(originals.clone());
    }
    let pipeline = builder.build().expect("valid pipeline config");

    Harness {
        pipeline,
        compressor,
        uploader,
        originals,
        observer,
        previews,
    }
}

/// `count` small in-memory JPEG stand-ins named `IMG_0000.jpg`, `IMG_0001.jpg`, ...
pub fn photos(count: usize) -> Vec<SourceFile> {
    (0..count)
        .map(|i| photo(&format!("IMG_{:04}.jpg", i)))
        .collect()
}

pub fn photo(name: &str) -> SourceFile {
    let bytes = format!("original:{}", name).into_bytes();
    SourceFile::new(name, bytes)
}
