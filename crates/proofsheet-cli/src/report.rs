//! Progress tracking and the final JSON summary.

use proofsheet_core::{ErrorKind, ItemStatus, PipelineItem};
use proofsheet_pipeline::{PipelineObserver, PipelineStats};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Keeps the latest snapshot of every item the pipeline has reported.
///
/// Cancelling everything empties the pipeline's queue; the summary still
/// needs the cancelled items, so it is built from these snapshots.
#[derive(Default)]
pub struct SnapshotObserver {
    items: Mutex<Vec<PipelineItem>>,
}

impl SnapshotObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshots, in the order items were first reported.
    pub fn snapshots(&self) -> Vec<PipelineItem> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Items that failed on upload and may succeed when tried again.
    pub fn retryable(&self) -> Vec<Uuid> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|item| {
                item.status == ItemStatus::Error && item.error_kind == Some(ErrorKind::Upload)
            })
            .map(|item| item.id)
            .collect()
    }
}

impl PipelineObserver for SnapshotObserver {
    fn on_item_update(&self, item: &PipelineItem) {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
    }

    fn on_item_done(&self, item: &PipelineItem) {
        let stats = {
            let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
            PipelineStats::tally(items.iter())
        };
        tracing::info!(
            done = stats.done,
            total = stats.total,
            filename = %item.filename,
            "Upload progress"
        );
    }
}

/// Printed to stdout when the run ends.
#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub gallery_id: Uuid,
    pub batch_id: Uuid,
    pub interrupted: bool,
    pub stats: PipelineStats,
    pub items: Vec<PipelineItem>,
}

impl UploadSummary {
    pub fn new(
        gallery_id: Uuid,
        batch_id: Uuid,
        interrupted: bool,
        items: Vec<PipelineItem>,
    ) -> Self {
        Self {
            gallery_id,
            batch_id,
            interrupted,
            stats: PipelineStats::tally(items.iter()),
            items,
        }
    }

    /// True if any item ended in error, cancellations included.
    pub fn has_failures(&self) -> bool {
        self.stats.failed > 0 || self.stats.cancelled > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proofsheet_core::{PreviewHandle, SourceFile};

    fn item(name: &str) -> PipelineItem {
        PipelineItem::new(
            SourceFile::new(name, b"x".to_vec()),
            PreviewHandle::new(format!("preview://{}", name)),
            format!("key-{}", name),
        )
    }

    #[test]
    fn snapshots_keep_latest_state_in_first_seen_order() {
        let observer = SnapshotObserver::new();
        let mut a = item("a.jpg");
        let b = item("b.jpg");
        observer.on_item_update(&a);
        observer.on_item_update(&b);
        a.status = ItemStatus::Done;
        observer.on_item_update(&a);

        let snapshots = observer.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].filename, "a.jpg");
        assert_eq!(snapshots[0].status, ItemStatus::Done);
        assert_eq!(snapshots[1].status, ItemStatus::Queued);
    }

    #[test]
    fn only_upload_failures_are_retryable() {
        let observer = SnapshotObserver::new();
        let mut upload = item("a.jpg");
        upload.status = ItemStatus::Error;
        upload.error_kind = Some(ErrorKind::Upload);
        let mut quota = item("b.jpg");
        quota.status = ItemStatus::Error;
        quota.error_kind = Some(ErrorKind::QuotaExceeded);
        observer.on_item_update(&upload);
        observer.on_item_update(&quota);

        assert_eq!(observer.retryable(), vec![upload.id]);
    }

    #[test]
    fn summary_counts_failures() {
        let mut done = item("a.jpg");
        done.status = ItemStatus::Done;
        let mut cancelled = item("b.jpg");
        cancelled.status = ItemStatus::Error;
        cancelled.error_kind = Some(ErrorKind::Cancelled);

        let clean = UploadSummary::new(Uuid::nil(), Uuid::nil(), false, vec![done.clone()]);
        assert!(!clean.has_failures());

        let summary = UploadSummary::new(Uuid::nil(), Uuid::nil(), true, vec![done, cancelled]);
        assert_eq!(summary.stats.total, 2);
        assert_eq!(summary.stats.done, 1);
        assert_eq!(summary.stats.cancelled, 1);
        assert!(summary.has_failures());

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["items"][1]["status"], "error");
        assert_eq!(json["stats"]["cancelled"], 1);
    }
}
