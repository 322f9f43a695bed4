use bytes::Bytes;
use std::fmt;

/// Watermark applied to every preview of a pipeline.
///
/// When a pipeline carries a watermark the compression step is mandatory:
/// an item whose compression fails is never uploaded un-watermarked.
#[derive(Clone)]
pub struct WatermarkDescriptor {
    /// Encoded watermark image (PNG with alpha recommended)
    pub image: Bytes,
    pub position: WatermarkPosition,
    pub size: WatermarkSize,
    /// 0.0 (invisible) to 1.0 (opaque)
    pub opacity: f32,
}

impl WatermarkDescriptor {
    pub fn new(image: impl Into<Bytes>) -> Self {
        Self {
            image: image.into(),
            position: WatermarkPosition::Center,
            size: WatermarkSize::Relative { percent: 30.0 },
            opacity: 0.5,
        }
    }

    pub fn with_position(mut self, position: WatermarkPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_size(mut self, size: WatermarkSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

impl fmt::Debug for WatermarkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatermarkDescriptor")
            .field("image_size", &self.image.len())
            .field("position", &self.position)
            .field("size", &self.size)
            .field("opacity", &self.opacity)
            .finish()
    }
}

/// Watermark position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
    Custom { x: u32, y: u32 },
}

impl WatermarkPosition {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "top-left" => Ok(WatermarkPosition::TopLeft),
            "top-right" => Ok(WatermarkPosition::TopRight),
            "bottom-left" => Ok(WatermarkPosition::BottomLeft),
            "bottom-right" => Ok(WatermarkPosition::BottomRight),
            "center" => Ok(WatermarkPosition::Center),
            other => {
                let (x, y) = other
                    .split_once(',')
                    .ok_or_else(|| format!("Invalid watermark position: {}", s))?;
                let x = x.trim().parse().map_err(|_| format!("Invalid x: {}", x))?;
                let y = y.trim().parse().map_err(|_| format!("Invalid y: {}", y))?;
                Ok(WatermarkPosition::Custom { x, y })
            }
        }
    }
}

/// Watermark size
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatermarkSize {
    Absolute { width: u32, height: u32 },
    Relative { percent: f32 },
}
