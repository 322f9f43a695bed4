//! Compression and upload slot accounting.
//!
//! Counters live inside the scheduler state. A [`SlotPermit`] is issued for
//! every increment and gives the slot back exactly once when dropped, so every
//! exit path of an item task (success, error, cancellation, panic) releases
//! what it holds. Permits carry the epoch they were issued in; after a
//! cancel-all resets the counters, permits from the old epoch release nothing.

use std::sync::Arc;

use proofsheet_core::PipelineError;
use tokio_util::sync::CancellationToken;

use crate::scheduler::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    Compression,
    Upload,
}

#[derive(Debug)]
pub(crate) struct SlotCounter {
    active: usize,
    limit: usize,
}

impl SlotCounter {
    pub(crate) fn new(limit: usize) -> Self {
        Self { active: 0, limit }
    }

    pub(crate) fn active(&self) -> usize {
        self.active
    }

    pub(crate) fn has_capacity(&self) -> bool {
        self.active < self.limit
    }

    /// Take a slot if one is free.
    pub(crate) fn acquire(&mut self) -> bool {
        if self.has_capacity() {
            self.active += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn release(&mut self) {
        self.active = self.active.saturating_sub(1);
    }

    pub(crate) fn reset(&mut self) {
        self.active = 0;
    }
}

/// One held slot. Dropping it releases the slot and re-runs admission.
pub(crate) struct SlotPermit {
    shared: Option<Arc<Shared>>,
    kind: SlotKind,
    epoch: u64,
}

impl SlotPermit {
    pub(crate) fn new(shared: Arc<Shared>, kind: SlotKind, epoch: u64) -> Self {
        Self {
            shared: Some(shared),
            kind,
            epoch,
        }
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.release_slot(self.kind, self.epoch);
            shared.tick();
        }
    }
}

/// Wait for a free slot of `kind`, polling at the configured interval.
pub(crate) async fn acquire(
    shared: &Arc<Shared>,
    kind: SlotKind,
    cancel: &CancellationToken,
) -> Result<SlotPermit, PipelineError> {
    let poll_interval = shared.config.slot_poll_interval;
    loop {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if let Some(epoch) = shared.try_acquire(kind) {
            return Ok(SlotPermit::new(shared.clone(), kind, epoch));
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}
