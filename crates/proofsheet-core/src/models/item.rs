use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::media::{SourceFile, UploadResult};

/// Lifecycle state of a pipeline item.
///
/// `Queued` is initial; `Done` and `Error` are terminal. Cancellation is an
/// `Error` with the message "Cancelled", not a separate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    Queued,
    Compressing,
    UploadingOriginal,
    UploadingPreview,
    Done,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Error)
    }

    /// True while an async step for the item may be running.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            ItemStatus::Compressing | ItemStatus::UploadingOriginal | ItemStatus::UploadingPreview
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Queued => "queued",
            ItemStatus::Compressing => "compressing",
            ItemStatus::UploadingOriginal => "uploading-original",
            ItemStatus::UploadingPreview => "uploading-preview",
            ItemStatus::Done => "done",
            ItemStatus::Error => "error",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable reason an item ended in [`ItemStatus::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The source file could not be read from disk.
    Source,
    Compression,
    Upload,
    QuotaExceeded,
    Cancelled,
}

/// Locally displayable reference to an item's source (e.g. a `file://` URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewHandle(String);

impl PreviewHandle {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn uri(&self) -> &str {
        &self.0
    }
}

/// Snapshot of one file moving through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineItem {
    pub id: Uuid,
    pub filename: String,
    pub size: u64,
    #[serde(skip_serializing)]
    pub file: SourceFile,
    pub preview: Option<PreviewHandle>,
    pub status: ItemStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub retry_count: u32,
    pub upload_key: String,
    pub original_path: Option<String>,
    pub result: Option<UploadResult>,
}

impl PipelineItem {
    pub fn new(file: SourceFile, preview: PreviewHandle, upload_key: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: file.name.clone(),
            size: file.size(),
            file,
            preview: Some(preview),
            status: ItemStatus::Queued,
            progress: 0,
            error: None,
            error_kind: None,
            retry_count: 0,
            upload_key,
            original_path: None,
            result: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_kind == Some(ErrorKind::Cancelled)
    }

    pub fn is_quota_exceeded(&self) -> bool {
        self.error_kind == Some(ErrorKind::QuotaExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_in_flight_states_are_disjoint() {
        let all = [
            ItemStatus::Queued,
            ItemStatus::Compressing,
            ItemStatus::UploadingOriginal,
            ItemStatus::UploadingPreview,
            ItemStatus::Done,
            ItemStatus::Error,
        ];
        for status in all {
            assert!(!(status.is_terminal() && status.is_in_flight()), "{status}");
        }
        assert!(!ItemStatus::Queued.is_terminal());
        assert!(!ItemStatus::Queued.is_in_flight());
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&ItemStatus::UploadingOriginal).unwrap();
        assert_eq!(json, "\"uploading-original\"");
        assert_eq!(ItemStatus::UploadingPreview.to_string(), "uploading-preview");
    }

    #[test]
    fn new_item_starts_queued() {
        let file = SourceFile::new("IMG_0001.jpg", vec![1u8, 2, 3]);
        let item = PipelineItem::new(file, PreviewHandle::new("memory://x"), "key".into());
        assert_eq!(item.status, ItemStatus::Queued);
        assert_eq!(item.progress, 0);
        assert_eq!(item.size, 3);
        assert_eq!(item.filename, "IMG_0001.jpg");
        assert!(item.error.is_none());
        assert!(item.result.is_none());
    }

    #[test]
    fn snapshot_json_omits_file_bytes() {
        let file = SourceFile::new("a.png", vec![0u8; 16]);
        let item = PipelineItem::new(file, PreviewHandle::new("memory://a"), "k".into());
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("file").is_none());
        assert_eq!(value["status"], "queued");
        assert_eq!(value["preview"], "memory://a");
    }
}
