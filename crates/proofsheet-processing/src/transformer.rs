//! Preview transformer - chains the preview transforms
//!
//! 1. Decode
//! 2. EXIF auto-rotation (skipped when the EXIF block is carried over)
//! 3. Fit the long edge
//! 4. Watermark
//! 5. Encode (mozjpeg / WebP)
//! 6. Re-attach the source EXIF block when it is kept (JPEG only)

use anyhow::Context;
use bytes::Bytes;
use image::GenericImageView;
use img_parts::jpeg::Jpeg;
use img_parts::{DynImage, ImageEXIF};
use proofsheet_core::{CompressOptions, PreviewFormat};
use std::io::Cursor;

use crate::compression::PreviewEncoder;
use crate::orientation::ImageOrientation;
use crate::resize::ImageResize;
use crate::watermark::Watermark;

/// Encoded preview plus its pixel dimensions.
#[derive(Debug, Clone)]
pub struct TransformedPreview {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
}

pub struct PreviewTransformer;

impl PreviewTransformer {
    pub fn transform(
        data: &[u8],
        options: &CompressOptions,
    ) -> Result<TransformedPreview, anyhow::Error> {
        let mut img = image::ImageReader::new(Cursor::new(data))
            .with_guessed_format()?
            .decode()
            .context("Failed to decode image")?;

        let kept_exif = if options.remove_exif {
            None
        } else {
            Self::read_exif(data)
        };
        let carry_exif = kept_exif.is_some() && options.format == PreviewFormat::Jpeg;

        if !carry_exif {
            img = ImageOrientation::apply_exif_orientation(img, data);
        }

        img = ImageResize::fit_long_edge(img, options.max_long_edge);

        if let Some(descriptor) = &options.watermark {
            let mark = Watermark::decode(descriptor)?;
            img = Watermark::apply(img, &mark, descriptor);
        }

        let (width, height) = img.dimensions();
        let mut encoded = PreviewEncoder::encode(&img, options.format, options.quality)?;

        if carry_exif {
            let mut jpeg = Jpeg::from_bytes(encoded).context("Failed to re-read encoded JPEG")?;
            jpeg.set_exif(kept_exif);
            encoded = jpeg.encoder().bytes();
        }

        tracing::debug!(
            width,
            height,
            format = ?options.format,
            quality = options.quality,
            input_bytes = data.len(),
            output_bytes = encoded.len(),
            exif_kept = carry_exif,
            "Preview encoded"
        );

        Ok(TransformedPreview {
            data: encoded,
            width,
            height,
        })
    }

    fn read_exif(data: &[u8]) -> Option<Bytes> {
        DynImage::from_bytes(Bytes::copy_from_slice(data))
            .ok()
            .flatten()
            .and_then(|img| img.exif())
    }
}
