//! Proofsheet CLI - bulk preview uploader for a gallery.
//!
//! Set PROOFSHEET_API_KEY and PROOFSHEET_API_URL. Uses X-API-Key auth unless
//! PROOFSHEET_AUTH_SCHEME=bearer. Without --gallery the upload settings are
//! read from PROOFSHEET_GALLERY_ID and the other PROOFSHEET_* variables;
//! flags given on the command line override them.

use anyhow::Context;
use clap::{Parser, Subcommand};
use proofsheet_api_client::ApiClient;
use proofsheet_cli::discover::{discover_images, open_sources};
use proofsheet_cli::report::{SnapshotObserver, UploadSummary};
use proofsheet_cli::{init_tracing, network_estimate, parse_watermark_size};
use proofsheet_core::{
    NetworkQuality, PipelineConfig, PreviewFormat, WatermarkDescriptor, WatermarkPosition,
    WatermarkSize,
};
use proofsheet_pipeline::{ObserverSet, Pipeline, TracingObserver};
use proofsheet_processing::PreviewCompressor;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "proofsheet", about = "Proofsheet gallery uploader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress and upload image files (or directories of images) to a gallery
    Upload(UploadArgs),
}

#[derive(clap::Args)]
struct UploadArgs {
    /// Image files or directories (scanned one level deep)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Target gallery UUID (defaults to PROOFSHEET_GALLERY_ID)
    #[arg(long)]
    gallery: Option<Uuid>,

    /// Longest preview edge in pixels [default: 2560]
    #[arg(long)]
    max_long_edge: Option<u32>,

    /// Encoder quality (1-100) [default: 82]
    #[arg(long)]
    quality: Option<u8>,

    /// Preview format: jpeg or webp [default: jpeg]
    #[arg(long, value_parser = PreviewFormat::parse)]
    format: Option<PreviewFormat>,

    /// Keep the source EXIF block in JPEG previews
    #[arg(long)]
    keep_exif: bool,

    /// Watermark image (PNG with alpha recommended)
    #[arg(long)]
    watermark: Option<PathBuf>,

    /// Watermark position: top-left, top-right, bottom-left, bottom-right, center or X,Y
    #[arg(long, default_value = "center", value_parser = WatermarkPosition::parse)]
    watermark_position: WatermarkPosition,

    /// Watermark opacity between 0.0 and 1.0
    #[arg(long, default_value = "0.5")]
    watermark_opacity: f32,

    /// Watermark size: percentage of the image width (30%) or pixels (200x80)
    #[arg(long, default_value = "30%", value_parser = parse_watermark_size)]
    watermark_size: WatermarkSize,

    /// Also store the full-resolution originals
    #[arg(long)]
    keep_originals: bool,

    /// Ask the server not to count these previews against the quota
    #[arg(long)]
    skip_quota: bool,

    /// Concurrent compressions [default: 2]
    #[arg(long)]
    compression_slots: Option<usize>,

    /// Concurrent uploads (defaults from --network or --downlink-mbps)
    #[arg(long)]
    upload_slots: Option<usize>,

    /// Network estimate used for the default upload concurrency: slow-2g, 2g, 3g, 4g
    #[arg(long, value_parser = NetworkQuality::parse)]
    network: Option<NetworkQuality>,

    /// Measured downlink in Mbit/s, classified like --network
    #[arg(long, conflicts_with = "network")]
    downlink_mbps: Option<f64>,

    /// Cancel any file not finished this many seconds after it was queued
    #[arg(long)]
    item_timeout_secs: Option<u64>,

    /// Retry files that failed to upload once more before exiting
    #[arg(long)]
    retry_failed: bool,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize summary")?;
    println!("{}", out);
    Ok(())
}

async fn build_config(args: &UploadArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = match args.gallery {
        Some(gallery) => PipelineConfig::new(gallery),
        None => PipelineConfig::from_env()
            .context("Pass --gallery or set PROOFSHEET_GALLERY_ID")?,
    };

    if let Some(edge) = args.max_long_edge {
        config = config.with_max_long_edge(edge);
    }
    if let Some(quality) = args.quality {
        config = config.with_quality(quality);
    }
    if let Some(format) = args.format {
        config = config.with_format(format);
    }
    if args.keep_exif {
        config = config.with_remove_exif(false);
    }
    if args.keep_originals {
        config = config.with_upload_originals(true);
    }
    if args.skip_quota {
        config = config.with_skip_quota(true);
    }
    if let Some(slots) = args.compression_slots {
        config = config.with_compression_slots(slots);
    }
    if let Some(network) = network_estimate(args.network, args.downlink_mbps) {
        config = config.with_network_quality(network);
    }
    if let Some(slots) = args.upload_slots {
        config = config.with_upload_slots(slots);
    }

    if let Some(path) = &args.watermark {
        let image = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read watermark: {}", path.display()))?;
        config = config.with_watermark(
            WatermarkDescriptor::new(image)
                .with_position(args.watermark_position)
                .with_size(args.watermark_size)
                .with_opacity(args.watermark_opacity),
        );
    }

    config.validate().context("Invalid upload settings")?;
    Ok(config)
}

/// Wait until the pipeline is idle. Ctrl-C cancels everything; returns true
/// if that happened.
async fn drive(pipeline: &Pipeline) -> anyhow::Result<bool> {
    tokio::select! {
        _ = pipeline.wait_idle() => Ok(false),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::warn!("Interrupted, cancelling remaining uploads");
            pipeline.cancel(None)?;
            Ok(true)
        }
    }
}

fn spawn_deadlines(
    timers: &mut JoinSet<()>,
    pipeline: &Arc<Pipeline>,
    ids: impl IntoIterator<Item = Uuid>,
    timeout: Duration,
) {
    for id in ids {
        let pipeline = Arc::clone(pipeline);
        timers.spawn(async move {
            tokio::time::sleep(timeout).await;
            match pipeline.cancel(Some(id)) {
                Ok(1) => tracing::warn!(item_id = %id, timeout_secs = timeout.as_secs(), "Item timed out"),
                Ok(_) => {}
                Err(e) => tracing::debug!(item_id = %id, error = %e, "Deadline skipped"),
            }
        });
    }
}

async fn upload(args: UploadArgs) -> anyhow::Result<()> {
    let config = build_config(&args).await?;
    let gallery_id = config.gallery_id;
    let keep_originals = config.upload_originals;
    let client = Arc::new(ApiClient::from_env().context(
        "Failed to create API client. Set PROOFSHEET_API_KEY and PROOFSHEET_API_URL",
    )?);

    let paths = discover_images(&args.paths)?;
    if paths.is_empty() {
        anyhow::bail!("No image files found");
    }
    let files = open_sources(&paths).await?;

    let snapshots = Arc::new(SnapshotObserver::new());
    let observer = ObserverSet::new()
        .with(Arc::new(TracingObserver))
        .with(snapshots.clone());

    let mut builder = Pipeline::builder(config)
        .compressor(Arc::new(PreviewCompressor::new()))
        .preview_uploader(client.clone())
        .observer(Arc::new(observer));
    if keep_originals {
        builder = builder.original_uploader(client);
    }
    let pipeline = Arc::new(builder.build()?);

    tracing::info!(
        gallery_id = %gallery_id,
        batch_id = %pipeline.batch_id(),
        files = files.len(),
        "Starting upload"
    );

    let mut timers = JoinSet::new();
    let items = pipeline.add(files)?;
    if let Some(secs) = args.item_timeout_secs {
        let timeout = Duration::from_secs(secs);
        spawn_deadlines(&mut timers, &pipeline, items.iter().map(|i| i.id), timeout);
    }

    let mut interrupted = drive(&pipeline).await?;

    if args.retry_failed && !interrupted {
        let failed = snapshots.retryable();
        let mut requeued = Vec::new();
        for id in failed {
            if pipeline.retry(id)? {
                requeued.push(id);
            }
        }
        if !requeued.is_empty() {
            tracing::info!(count = requeued.len(), "Retrying failed uploads");
            if let Some(secs) = args.item_timeout_secs {
                spawn_deadlines(&mut timers, &pipeline, requeued, Duration::from_secs(secs));
            }
            interrupted = drive(&pipeline).await?;
        }
    }
    timers.abort_all();

    let summary = UploadSummary::new(
        gallery_id,
        pipeline.batch_id(),
        interrupted,
        snapshots.snapshots(),
    );
    pipeline.destroy();
    print_json(&summary)?;

    if summary.has_failures() {
        anyhow::bail!(
            "{} of {} files were not uploaded",
            summary.stats.failed + summary.stats.cancelled,
            summary.stats.total
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Upload(args) => upload(args).await,
    }
}
