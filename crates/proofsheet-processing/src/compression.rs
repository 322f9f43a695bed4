use anyhow::{anyhow, Result};
use bytes::Bytes;
use image::{DynamicImage, GenericImageView};
use proofsheet_core::PreviewFormat;

/// Encodes a decoded image into the preview delivery format.
pub struct PreviewEncoder;

impl PreviewEncoder {
    /// Encode `img` with `quality` (1-100).
    pub fn encode(img: &DynamicImage, format: PreviewFormat, quality: u8) -> Result<Bytes> {
        let quality = quality.clamp(1, 100);
        match format {
            PreviewFormat::Jpeg => Self::encode_jpeg(img, quality),
            PreviewFormat::WebP => Self::encode_webp(img, quality),
        }
    }

    /// Progressive, Huffman-optimized JPEG via mozjpeg
    fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes> {
        let rgb_img = img.to_rgb8();
        let (width, height) = rgb_img.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("cannot encode an empty image"));
        }

        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_quality(quality as f32);
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);

        let mut comp = comp.start_compress(Vec::new())?;
        comp.write_scanlines(&rgb_img)?;
        let jpeg_data = comp.finish()?;

        Ok(Bytes::from(jpeg_data))
    }

    fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Bytes> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("cannot encode an empty image"));
        }

        let rgba_img = img.to_rgba8();
        let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);
        let webp_data = encoder.encode(quality as f32);

        Ok(Bytes::copy_from_slice(&webp_data))
    }
}
