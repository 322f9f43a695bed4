//! Observer contract for pipeline progress.
//!
//! Callbacks run synchronously on the task that caused the transition, one at
//! a time and in the order the transitions happened. The scheduler's state
//! lock is released first, so an observer may call the pipeline's read
//! accessors (`items`, `item`, `stats`). It must not call `add`, `cancel`,
//! `retry` or `destroy`: those wait for the running callback to return.
//! Keep callbacks cheap; a slow observer delays every other transition.

use std::sync::Arc;

use proofsheet_core::PipelineItem;

pub trait PipelineObserver: Send + Sync {
    /// Fired on every state transition and progress checkpoint.
    fn on_item_update(&self, _item: &PipelineItem) {}

    /// Fired once when an item reaches `done`, after its final update.
    fn on_item_done(&self, _item: &PipelineItem) {}

    /// Fired once per transition from busy to idle.
    fn on_pipeline_complete(&self) {}
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Logs transitions through `tracing`.
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_item_update(&self, item: &PipelineItem) {
        tracing::debug!(
            item_id = %item.id,
            filename = %item.filename,
            status = %item.status,
            progress = item.progress,
            error = ?item.error,
            "Item updated"
        );
    }

    fn on_item_done(&self, item: &PipelineItem) {
        tracing::info!(
            item_id = %item.id,
            filename = %item.filename,
            storage_key = item.result.as_ref().map(|r| r.storage_key.as_str()),
            "Item uploaded"
        );
    }

    fn on_pipeline_complete(&self) {
        tracing::info!("Upload pipeline idle");
    }
}

/// Fans every callback out to several observers, in registration order.
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl PipelineObserver for ObserverSet {
    fn on_item_update(&self, item: &PipelineItem) {
        for observer in &self.observers {
            observer.on_item_update(item);
        }
    }

    fn on_item_done(&self, item: &PipelineItem) {
        for observer in &self.observers {
            observer.on_item_done(item);
        }
    }

    fn on_pipeline_complete(&self) {
        for observer in &self.observers {
            observer.on_pipeline_complete();
        }
    }
}
