//! RAII slot guard.

use super::manager::ConcurrencyManager;
use super::types::{ReleaseOptions, RunningExecution};
use std::sync::Arc;
use tracing::debug;

/// Releases one lease on a concurrency slot when dropped.
///
/// The release is scoped to the guard's `run_id`, so a guard that outlives a
/// forced release cannot free a newer run of the same feature.
#[derive(Debug)]
pub struct SlotGuard {
    manager: Arc<ConcurrencyManager>,
    record: RunningExecution,
    released: bool,
}

impl SlotGuard {
    pub fn new(manager: Arc<ConcurrencyManager>, record: RunningExecution) -> Self {
        Self {
            manager,
            record,
            released: false,
        }
    }

    /// The record as it was at acquire time.
    pub fn record(&self) -> &RunningExecution {
        &self.record
    }

    /// Release the lease now. Returns whether the slot was removed.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.manager
            .release(&self.record.feature_id, ReleaseOptions::for_run(self.record.run_id))
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.released {
            let removed = self
                .manager
                .release(&self.record.feature_id, ReleaseOptions::for_run(self.record.run_id));
            debug!(feature_id = %self.record.feature_id, removed, "slot guard dropped");
        }
    }
}
