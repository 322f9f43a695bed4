//! Proofsheet preview processing
//!
//! [`PreviewCompressor`] is the production [`Compressor`](proofsheet_core::Compressor):
//! it decodes the source, fixes EXIF orientation, fits the long edge, overlays
//! the optional watermark and re-encodes to JPEG (mozjpeg) or WebP.

pub mod compression;
mod compressor;
pub mod orientation;
pub mod resize;
pub mod transformer;
pub mod watermark;

pub use compression::PreviewEncoder;
pub use compressor::PreviewCompressor;
pub use orientation::ImageOrientation;
pub use resize::ImageResize;
pub use transformer::{PreviewTransformer, TransformedPreview};
pub use watermark::Watermark;
