use anyhow::Context;
use image::{imageops, DynamicImage, GenericImageView, ImageReader, RgbaImage};
use proofsheet_core::{WatermarkDescriptor, WatermarkPosition, WatermarkSize};
use std::io::Cursor;

use crate::resize::ImageResize;

pub struct Watermark;

impl Watermark {
    /// Decode the watermark image once so it can be applied to many previews.
    pub fn decode(descriptor: &WatermarkDescriptor) -> Result<RgbaImage, anyhow::Error> {
        let reader = ImageReader::new(Cursor::new(&descriptor.image[..]))
            .with_guessed_format()
            .context("Failed to read watermark image")?;
        Ok(reader
            .decode()
            .context("Failed to decode watermark image")?
            .to_rgba8())
    }

    /// Size of the watermark on an image of `img_width`x`img_height`.
    ///
    /// Relative sizes scale the watermark width to a percentage of the image
    /// width and keep the watermark's aspect ratio. Both sizes are clamped to
    /// the image.
    pub fn target_size(
        size: &WatermarkSize,
        img_width: u32,
        img_height: u32,
        wm_width: u32,
        wm_height: u32,
    ) -> (u32, u32) {
        let (w, h) = match *size {
            WatermarkSize::Absolute { width, height } => (width, height),
            WatermarkSize::Relative { percent } => {
                let w = (img_width as f32 * percent / 100.0).round().max(1.0);
                let h = (w * wm_height as f32 / wm_width.max(1) as f32).round().max(1.0);
                (w as u32, h as u32)
            }
        };
        (w.clamp(1, img_width.max(1)), h.clamp(1, img_height.max(1)))
    }

    /// Top-left corner of the watermark. Custom coordinates are used as given.
    pub fn placement(
        position: &WatermarkPosition,
        img_width: u32,
        img_height: u32,
        wm_width: u32,
        wm_height: u32,
    ) -> (i64, i64) {
        let free_x = (img_width as i64 - wm_width as i64).max(0);
        let free_y = (img_height as i64 - wm_height as i64).max(0);
        match *position {
            WatermarkPosition::TopLeft => (0, 0),
            WatermarkPosition::TopRight => (free_x, 0),
            WatermarkPosition::BottomLeft => (0, free_y),
            WatermarkPosition::BottomRight => (free_x, free_y),
            WatermarkPosition::Center => (free_x / 2, free_y / 2),
            WatermarkPosition::Custom { x, y } => (x as i64, y as i64),
        }
    }

    /// Overlay `mark` onto `img` according to the descriptor's position, size
    /// and opacity.
    pub fn apply(
        img: DynamicImage,
        mark: &RgbaImage,
        descriptor: &WatermarkDescriptor,
    ) -> DynamicImage {
        let (img_width, img_height) = img.dimensions();
        let (wm_width, wm_height) = mark.dimensions();
        let (target_w, target_h) =
            Self::target_size(&descriptor.size, img_width, img_height, wm_width, wm_height);

        let mut mark = if (target_w, target_h) != (wm_width, wm_height) {
            let filter = ImageResize::select_filter(wm_width, wm_height, target_w, target_h);
            imageops::resize(mark, target_w, target_h, filter)
        } else {
            mark.clone()
        };

        if descriptor.opacity < 1.0 {
            let opacity = descriptor.opacity.clamp(0.0, 1.0);
            for pixel in mark.pixels_mut() {
                pixel[3] = (pixel[3] as f32 * opacity).round() as u8;
            }
        }

        let (x, y) = Self::placement(&descriptor.position, img_width, img_height, target_w, target_h);
        tracing::debug!(
            x,
            y,
            width = target_w,
            height = target_h,
            opacity = descriptor.opacity,
            "Applying watermark"
        );

        let mut canvas = img.to_rgba8();
        imageops::overlay(&mut canvas, &mark, x, y);
        DynamicImage::ImageRgba8(canvas)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};

    fn white(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
    }

    /// Opaque black PNG, encoded as a caller would supply it.
    pub(crate) fn black_mark_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn descriptor(position: WatermarkPosition, size: WatermarkSize, opacity: f32) -> WatermarkDescriptor {
        WatermarkDescriptor::new(black_mark_png(50, 25))
            .with_position(position)
            .with_size(size)
            .with_opacity(opacity)
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let bad = WatermarkDescriptor::new(vec![1u8, 2, 3]);
        assert!(Watermark::decode(&bad).is_err());
    }

    #[test]
    fn test_bottom_right_placement() {
        let desc = descriptor(
            WatermarkPosition::BottomRight,
            WatermarkSize::Absolute { width: 50, height: 25 },
            1.0,
        );
        let mark = Watermark::decode(&desc).unwrap();
        let out = Watermark::apply(white(200, 100), &mark, &desc).to_rgba8();
        assert_eq!(out.dimensions(), (200, 100));
        assert_eq!(out.get_pixel(199, 99), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(150, 75), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(149, 99), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_center_and_custom_placement() {
        assert_eq!(
            Watermark::placement(&WatermarkPosition::Center, 200, 100, 50, 20),
            (75, 40)
        );
        assert_eq!(
            Watermark::placement(&WatermarkPosition::Custom { x: 10, y: 20 }, 200, 100, 50, 20),
            (10, 20)
        );
        assert_eq!(
            Watermark::placement(&WatermarkPosition::TopRight, 40, 40, 50, 20),
            (0, 0)
        );
    }

    #[test]
    fn test_relative_size_keeps_aspect() {
        let size = WatermarkSize::Relative { percent: 30.0 };
        assert_eq!(Watermark::target_size(&size, 1000, 800, 200, 100), (300, 150));
        // never larger than the image
        let huge = WatermarkSize::Absolute { width: 5000, height: 5000 };
        assert_eq!(Watermark::target_size(&huge, 100, 80, 10, 10), (100, 80));
    }

    #[test]
    fn test_opacity_blends() {
        let desc = descriptor(
            WatermarkPosition::TopLeft,
            WatermarkSize::Absolute { width: 50, height: 25 },
            0.5,
        );
        let mark = Watermark::decode(&desc).unwrap();
        let out = Watermark::apply(white(100, 100), &mark, &desc).to_rgba8();
        let blended = out.get_pixel(10, 10);
        assert!(blended[0] > 100 && blended[0] < 155, "{:?}", blended);
        assert_eq!(out.get_pixel(90, 90), &Rgba([255, 255, 255, 255]));
    }
}
