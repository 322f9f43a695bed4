pub mod item;
pub mod media;
pub mod watermark;

pub use item::{ErrorKind, ItemStatus, PipelineItem, PreviewHandle};
pub use media::{
    preview_filename, CompressOptions, CompressedImage, PreviewFormat, PreviewMetadata,
    SourceFile, UploadResult,
};
pub use watermark::{WatermarkDescriptor, WatermarkPosition, WatermarkSize};
