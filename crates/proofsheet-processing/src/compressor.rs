use async_trait::async_trait;
use image::ImageReader;
use proofsheet_core::models::preview_filename;
use proofsheet_core::{
    CancellationToken, CompressOptions, CompressedImage, Compressor, PipelineError, SourceFile,
};
use std::io::Cursor;

use crate::transformer::PreviewTransformer;

/// CPU-bound preview compression on the blocking thread pool.
///
/// Cancellation stops waiting for the blocking task; the encode itself runs to
/// completion in the background and its output is discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreviewCompressor;

impl PreviewCompressor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Compressor for PreviewCompressor {
    async fn compress(
        &self,
        file: &SourceFile,
        options: &CompressOptions,
        cancel: &CancellationToken,
    ) -> Result<CompressedImage, PipelineError> {
        let data = file.data.clone();
        let task_options = options.clone();
        let task =
            tokio::task::spawn_blocking(move || PreviewTransformer::transform(&data, &task_options));

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            joined = task => joined,
        };

        let preview = joined
            .map_err(|e| PipelineError::Compression(format!("compression task failed: {}", e)))?
            .map_err(|e| PipelineError::Compression(format!("{:#}", e)))?;

        Ok(CompressedImage {
            data: preview.data,
            width: preview.width,
            height: preview.height,
            content_type: options.format.mime_type().to_string(),
            filename: preview_filename(&file.name, options.format),
        })
    }

    fn probe_dimensions(&self, file: &SourceFile) -> Option<(u32, u32)> {
        ImageReader::new(Cursor::new(&file.data[..]))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use proofsheet_core::PreviewFormat;

    fn png_file(name: &str, width: u32, height: u32) -> SourceFile {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        SourceFile::new(name, buffer)
    }

    fn options() -> CompressOptions {
        CompressOptions {
            max_long_edge: 100,
            quality: 80,
            remove_exif: true,
            format: PreviewFormat::Jpeg,
            watermark: None,
        }
    }

    #[tokio::test]
    async fn test_compress_png_to_jpeg_preview() {
        let compressor = PreviewCompressor::new();
        let file = png_file("IMG_0042.png", 300, 150);
        let out = compressor
            .compress(&file, &options(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.filename, "IMG_0042.jpg");
        assert_eq!(out.content_type, "image/jpeg");
        assert_eq!((out.width, out.height), (100, 50));
        assert_eq!(&out.data[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_compress_webp_preview() {
        let compressor = PreviewCompressor::new();
        let mut opts = options();
        opts.format = PreviewFormat::WebP;
        let out = compressor
            .compress(&png_file("a.png", 40, 40), &opts, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.filename, "a.webp");
        assert_eq!(out.content_type, "image/webp");
    }

    #[tokio::test]
    async fn test_corrupt_input_is_compression_error() {
        let compressor = PreviewCompressor::new();
        let file = SourceFile::new("broken.jpg", vec![0xFF, 0xD8, 0x00, 0x01]);
        let err = compressor
            .compress(&file, &options(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Compression(_)));
        assert_eq!(compressor.probe_dimensions(&file), None);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let compressor = PreviewCompressor::new();
        let token = CancellationToken::new();
        token.cancel();
        let err = compressor
            .compress(&png_file("a.png", 10, 10), &options(), &token)
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::Cancelled);
    }

    #[test]
    fn test_probe_dimensions_reads_header() {
        let file = png_file("a.png", 640, 480);
        assert_eq!(PreviewCompressor::new().probe_dimensions(&file), Some((640, 480)));
    }
}
