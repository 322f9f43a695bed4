//! Configuration module
//!
//! [`ClientConfig`] describes how to reach the gallery API. [`PipelineConfig`]
//! is the immutable configuration of one upload session. Both can be built
//! from `PROOFSHEET_*` environment variables (a `.env` file is honoured).

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{CompressOptions, PreviewFormat, WatermarkDescriptor};
use crate::network::NetworkQuality;

// Common constants
pub const DEFAULT_COMPRESSION_SLOTS: usize = 2;
pub const DEFAULT_MAX_LONG_EDGE: u32 = 2560;
pub const DEFAULT_QUALITY: u8 = 82;
pub const DEFAULT_SLOT_POLL_INTERVAL_MS: u64 = 50;
/// Caller-visible retries allowed per item.
pub const MAX_ITEM_RETRIES: u32 = 3;
const DEFAULT_UPLOAD_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_BACKOFF_MAX_MS: u64 = 8_000;
const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_API_VERSION: &str = "v1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key) {
        Some(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Exponential backoff used by the preview upload retry helper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    /// Delay before the attempt following `failed_attempt` (0-based), capped.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed_attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_UPLOAD_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            max_delay: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
        }
    }
}

/// Configuration of one upload session. Immutable once the pipeline is built.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub gallery_id: Uuid,
    pub max_long_edge: u32,
    pub quality: u8,
    pub remove_exif: bool,
    pub format: PreviewFormat,
    pub watermark: Option<Arc<WatermarkDescriptor>>,
    /// Upload a byte-identical original before compressing
    pub upload_originals: bool,
    /// Preview uploads do not consume quota
    pub skip_quota: bool,
    pub compression_slots: usize,
    pub upload_slots: usize,
    pub slot_poll_interval: Duration,
    pub upload_backoff: BackoffPolicy,
}

impl PipelineConfig {
    pub fn new(gallery_id: Uuid) -> Self {
        Self {
            gallery_id,
            max_long_edge: DEFAULT_MAX_LONG_EDGE,
            quality: DEFAULT_QUALITY,
            remove_exif: true,
            format: PreviewFormat::default(),
            watermark: None,
            upload_originals: false,
            skip_quota: false,
            compression_slots: DEFAULT_COMPRESSION_SLOTS,
            upload_slots: NetworkQuality::default().upload_slots(),
            slot_poll_interval: Duration::from_millis(DEFAULT_SLOT_POLL_INTERVAL_MS),
            upload_backoff: BackoffPolicy::default(),
        }
    }

    /// Pick the upload slot count from a network estimate.
    pub fn with_network_quality(mut self, quality: NetworkQuality) -> Self {
        self.upload_slots = quality.upload_slots();
        self
    }

    pub fn with_compression_slots(mut self, slots: usize) -> Self {
        self.compression_slots = slots;
        self
    }

    pub fn with_upload_slots(mut self, slots: usize) -> Self {
        self.upload_slots = slots;
        self
    }

    pub fn with_max_long_edge(mut self, max_long_edge: u32) -> Self {
        self.max_long_edge = max_long_edge;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_remove_exif(mut self, remove_exif: bool) -> Self {
        self.remove_exif = remove_exif;
        self
    }

    pub fn with_format(mut self, format: PreviewFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_watermark(mut self, watermark: WatermarkDescriptor) -> Self {
        self.watermark = Some(Arc::new(watermark));
        self
    }

    pub fn with_upload_originals(mut self, upload_originals: bool) -> Self {
        self.upload_originals = upload_originals;
        self
    }

    pub fn with_skip_quota(mut self, skip_quota: bool) -> Self {
        self.skip_quota = skip_quota;
        self
    }

    pub fn with_slot_poll_interval(mut self, interval: Duration) -> Self {
        self.slot_poll_interval = interval;
        self
    }

    pub fn with_upload_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.upload_backoff = backoff;
        self
    }

    pub fn compress_options(&self) -> CompressOptions {
        CompressOptions {
            max_long_edge: self.max_long_edge,
            quality: self.quality,
            remove_exif: self.remove_exif,
            format: self.format,
            watermark: self.watermark.clone(),
        }
    }

    pub fn watermark_required(&self) -> bool {
        self.watermark.is_some()
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(process_env)
    }

    /// Build from an arbitrary key lookup (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, anyhow::Error> {
        let gallery_id = lookup("PROOFSHEET_GALLERY_ID")
            .ok_or_else(|| anyhow::anyhow!("PROOFSHEET_GALLERY_ID must be set"))?;
        let gallery_id = Uuid::parse_str(gallery_id.trim())
            .map_err(|e| anyhow::anyhow!("PROOFSHEET_GALLERY_ID is not a valid UUID: {}", e))?;

        let network = match lookup("PROOFSHEET_NETWORK_QUALITY") {
            Some(v) => NetworkQuality::parse(&v).map_err(anyhow::Error::msg)?,
            None => NetworkQuality::Unknown,
        };

        let format = match lookup("PROOFSHEET_PREVIEW_FORMAT") {
            Some(v) => PreviewFormat::parse(&v).map_err(anyhow::Error::msg)?,
            None => PreviewFormat::default(),
        };

        let defaults = BackoffPolicy::default();
        let upload_backoff = BackoffPolicy {
            max_attempts: parse_or(
                &lookup,
                "PROOFSHEET_UPLOAD_MAX_ATTEMPTS",
                defaults.max_attempts,
            ),
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "PROOFSHEET_UPLOAD_BACKOFF_BASE_MS",
                DEFAULT_BACKOFF_BASE_MS,
            )),
            max_delay: Duration::from_millis(parse_or(
                &lookup,
                "PROOFSHEET_UPLOAD_BACKOFF_MAX_MS",
                DEFAULT_BACKOFF_MAX_MS,
            )),
        };

        let config = PipelineConfig {
            gallery_id,
            max_long_edge: parse_or(&lookup, "PROOFSHEET_MAX_LONG_EDGE", DEFAULT_MAX_LONG_EDGE),
            quality: parse_or(&lookup, "PROOFSHEET_QUALITY", DEFAULT_QUALITY),
            remove_exif: parse_flag(&lookup, "PROOFSHEET_REMOVE_EXIF", true),
            format,
            watermark: None,
            upload_originals: parse_flag(&lookup, "PROOFSHEET_UPLOAD_ORIGINALS", false),
            skip_quota: parse_flag(&lookup, "PROOFSHEET_SKIP_QUOTA", false),
            compression_slots: parse_or(
                &lookup,
                "PROOFSHEET_COMPRESSION_SLOTS",
                DEFAULT_COMPRESSION_SLOTS,
            ),
            upload_slots: parse_or(&lookup, "PROOFSHEET_UPLOAD_SLOTS", network.upload_slots()),
            slot_poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "PROOFSHEET_SLOT_POLL_INTERVAL_MS",
                DEFAULT_SLOT_POLL_INTERVAL_MS,
            )),
            upload_backoff,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.compression_slots == 0 {
            return Err(PipelineError::InvalidConfig(
                "compression_slots must be at least 1".to_string(),
            ));
        }
        if self.upload_slots == 0 {
            return Err(PipelineError::InvalidConfig(
                "upload_slots must be at least 1".to_string(),
            ));
        }
        if self.quality == 0 || self.quality > 100 {
            return Err(PipelineError::InvalidConfig(format!(
                "quality must be between 1 and 100, got {}",
                self.quality
            )));
        }
        if self.max_long_edge == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_long_edge must be positive".to_string(),
            ));
        }
        if self.slot_poll_interval.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "slot_poll_interval must be positive".to_string(),
            ));
        }
        if self.upload_backoff.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "upload_backoff.max_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(watermark) = &self.watermark {
            if !(0.0..=1.0).contains(&watermark.opacity) {
                return Err(PipelineError::InvalidConfig(format!(
                    "watermark opacity must be between 0.0 and 1.0, got {}",
                    watermark.opacity
                )));
            }
            if watermark.image.is_empty() {
                return Err(PipelineError::InvalidConfig(
                    "watermark image is empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Authentication scheme used by the API client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    /// `X-API-Key: {key}`
    ApiKey,
    /// `Authorization: Bearer {token}`
    Bearer,
}

/// How to reach the gallery API.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_key: String,
    pub api_version: String,
    pub auth_scheme: AuthScheme,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            auth_scheme: AuthScheme::ApiKey,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// API version prefix (e.g. "/api/v1").
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.api_version)
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, anyhow::Error> {
        let api_url = lookup("PROOFSHEET_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_key = lookup("PROOFSHEET_API_KEY")
            .ok_or_else(|| anyhow::anyhow!("Missing API key. Set PROOFSHEET_API_KEY"))?;

        let auth_scheme = match lookup("PROOFSHEET_AUTH_SCHEME")
            .unwrap_or_else(|| "api-key".to_string())
            .to_lowercase()
            .as_str()
        {
            "api-key" | "apikey" => AuthScheme::ApiKey,
            "bearer" => AuthScheme::Bearer,
            other => return Err(anyhow::anyhow!("Invalid PROOFSHEET_AUTH_SCHEME: {}", other)),
        };

        let mut config = ClientConfig::new(api_url, api_key);
        config.auth_scheme = auth_scheme;
        if let Some(version) = lookup("PROOFSHEET_API_VERSION") {
            config.api_version = version;
        }
        config.request_timeout = Duration::from_secs(parse_or(
            &lookup,
            "PROOFSHEET_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ));

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(anyhow::anyhow!(
                "PROOFSHEET_API_URL must start with http:// or https://"
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("PROOFSHEET_API_KEY must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow::anyhow!(
                "PROOFSHEET_REQUEST_TIMEOUT_SECS must be positive"
            ));
        }
        Ok(())
    }
}
