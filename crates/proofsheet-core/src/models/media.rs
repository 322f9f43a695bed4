use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use super::watermark::WatermarkDescriptor;
use crate::error::PipelineError;

/// A file handed to the pipeline by the caller. The bytes are never mutated.
///
/// A file made with [`SourceFile::open`] only references its path; `data`
/// stays empty until [`SourceFile::load`] reads it.
#[derive(Clone)]
pub struct SourceFile {
    pub name: String,
    pub data: Bytes,
    pub path: Option<PathBuf>,
    pub content_type: String,
    len: u64,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        let data = data.into();
        let content_type = content_type_for(&name).to_string();
        Self {
            name,
            len: data.len() as u64,
            data,
            path: None,
            content_type,
        }
    }

    /// Reference a file on disk without reading it.
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.jpg".to_string());
        let content_type = content_type_for(&name).to_string();
        Ok(Self {
            name,
            data: Bytes::new(),
            path: Some(path),
            content_type,
            len: metadata.len(),
        })
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Size in bytes, known before the contents are read.
    pub fn size(&self) -> u64 {
        self.len
    }

    /// True when the bytes are still on disk.
    pub fn is_deferred(&self) -> bool {
        self.data.is_empty() && self.path.is_some()
    }

    /// A copy with the bytes in memory, read from `path` if they are not yet.
    pub async fn load(&self) -> Result<SourceFile, PipelineError> {
        let path = match &self.path {
            Some(path) if self.data.is_empty() => path,
            _ => return Ok(self.clone()),
        };
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::Source(format!("{}: {}", path.display(), e)))?;
        Ok(SourceFile {
            len: data.len() as u64,
            data: Bytes::from(data),
            ..self.clone()
        })
    }

    pub fn extension(&self) -> String {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default()
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("size", &self.len)
            .field("loaded", &!self.is_deferred())
            .field("path", &self.path)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Guess a MIME type from a filename extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

/// Encoding used for the preview artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewFormat {
    #[default]
    Jpeg,
    WebP,
}

impl PreviewFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(PreviewFormat::Jpeg),
            "webp" => Ok(PreviewFormat::WebP),
            _ => Err(format!("Invalid preview format: {}", s)),
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            PreviewFormat::Jpeg => "image/jpeg",
            PreviewFormat::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            PreviewFormat::Jpeg => "jpg",
            PreviewFormat::WebP => "webp",
        }
    }
}

/// Options passed to the compressor for every item of a pipeline.
#[derive(Debug, Clone)]
pub struct CompressOptions {
    pub max_long_edge: u32,
    pub quality: u8,
    pub remove_exif: bool,
    pub format: PreviewFormat,
    pub watermark: Option<Arc<WatermarkDescriptor>>,
}

/// Output of the compression step (or of the uncompressed fallback).
#[derive(Clone)]
pub struct CompressedImage {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub content_type: String,
    pub filename: String,
}

impl fmt::Debug for CompressedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressedImage")
            .field("size", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .finish()
    }
}

/// Replace the extension of `original` with the preview format's extension.
pub fn preview_filename(original: &str, format: PreviewFormat) -> String {
    let stem = match original.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => original,
    };
    format!("{}.{}", stem, format.extension())
}

/// Metadata sent alongside a preview upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewMetadata {
    pub gallery_id: Uuid,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub content_type: String,
    pub idempotency_key: String,
    pub skip_quota: bool,
}

/// Descriptor returned by the preview upload service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub id: String,
    pub filename: String,
    pub storage_key: String,
    pub width: u32,
    pub height: u32,
}
