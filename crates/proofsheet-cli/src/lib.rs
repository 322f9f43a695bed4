pub mod discover;
pub mod report;

use proofsheet_core::{NetworkQuality, WatermarkSize};

/// Network class for the default upload concurrency. A measured downlink
/// wins over a named class; `None` keeps the configured slots.
pub fn network_estimate(
    network: Option<NetworkQuality>,
    downlink_mbps: Option<f64>,
) -> Option<NetworkQuality> {
    downlink_mbps
        .map(NetworkQuality::from_downlink_mbps)
        .or(network)
}

/// Parse a watermark size: `30%` (relative to the image width) or `200x80`
/// (absolute pixels).
pub fn parse_watermark_size(s: &str) -> Result<WatermarkSize, String> {
    let s = s.trim();
    if let Some(percent) = s.strip_suffix('%') {
        let percent: f32 = percent
            .trim()
            .parse()
            .map_err(|_| format!("Invalid watermark percentage: {}", s))?;
        if !(percent > 0.0 && percent <= 100.0) {
            return Err(format!("Watermark percentage must be in (0, 100]: {}", s));
        }
        return Ok(WatermarkSize::Relative { percent });
    }

    let (width, height) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("Invalid watermark size (expected 30% or 200x80): {}", s))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("Invalid watermark width: {}", s))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("Invalid watermark height: {}", s))?;
    if width == 0 || height == 0 {
        return Err(format!("Watermark size must be non-zero: {}", s));
    }
    Ok(WatermarkSize::Absolute { width, height })
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
