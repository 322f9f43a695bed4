use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

/// Long-edge fitting for previews.
pub struct ImageResize;

impl ImageResize {
    /// Target size so that the longer side is at most `max_long_edge`,
    /// preserving aspect ratio. Never upscales.
    pub fn fit_long_edge_dimensions(width: u32, height: u32, max_long_edge: u32) -> (u32, u32) {
        let long_edge = width.max(height);
        if long_edge <= max_long_edge || long_edge == 0 {
            return (width, height);
        }
        let scale = max_long_edge as f64 / long_edge as f64;
        let w = ((width as f64 * scale).round() as u32).clamp(1, max_long_edge);
        let h = ((height as f64 * scale).round() as u32).clamp(1, max_long_edge);
        (w, h)
    }

    pub fn fit_long_edge(img: DynamicImage, max_long_edge: u32) -> DynamicImage {
        let (width, height) = img.dimensions();
        let (target_w, target_h) = Self::fit_long_edge_dimensions(width, height, max_long_edge);
        if (target_w, target_h) == (width, height) {
            return img;
        }

        tracing::debug!(
            from_width = width,
            from_height = height,
            to_width = target_w,
            to_height = target_h,
            "Downscaling preview"
        );
        let filter = Self::select_filter(width, height, target_w, target_h);
        img.resize_exact(target_w, target_h, filter)
    }

    /// Cheaper filters for large reductions, Lanczos3 for small ones.
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> FilterType {
        let width_ratio = orig_width as f32 / new_width.max(1) as f32;
        let height_ratio = orig_height as f32 / new_height.max(1) as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            FilterType::Triangle
        } else if max_ratio > 1.5 {
            FilterType::CatmullRom
        } else {
            FilterType::Lanczos3
        }
    }
}
