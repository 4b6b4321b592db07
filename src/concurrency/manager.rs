//! The slot map.

use super::types::{ExecutionContext, ReleaseOptions, RunningExecution};
use crate::error::{DroverError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Tracks which features currently have an agent running.
///
/// The map is the only shared mutable state in an execution. The lock is
/// never held across an `.await`.
#[derive(Debug, Default)]
pub struct ConcurrencyManager {
    slots: Mutex<HashMap<String, RunningExecution>>,
}

impl ConcurrencyManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, RunningExecution>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the slot for `feature_id`.
    ///
    /// With `allow_reuse`, an existing record is shared (its lease count goes
    /// up) instead of being rejected.
    pub fn acquire(
        &self,
        feature_id: &str,
        context: ExecutionContext,
        allow_reuse: bool,
    ) -> Result<RunningExecution> {
        let mut slots = self.slots();

        if let Some(existing) = slots.get_mut(feature_id) {
            if !allow_reuse {
                return Err(DroverError::AlreadyRunning(feature_id.to_string()));
            }
            existing.leases += 1;
            debug!(feature_id, run_id = %existing.run_id, leases = existing.leases, "reusing slot");
            return Ok(existing.clone());
        }

        let record = RunningExecution::new(feature_id, context);
        debug!(feature_id, run_id = %record.run_id, "acquired slot");
        slots.insert(feature_id.to_string(), record.clone());
        Ok(record)
    }

    /// Release the slot. Returns whether the record was removed.
    pub fn release(&self, feature_id: &str, options: ReleaseOptions) -> bool {
        let mut slots = self.slots();

        let Some(record) = slots.get_mut(feature_id) else {
            return false;
        };

        if let Some(run_id) = options.run_id
            && run_id != record.run_id
        {
            debug!(feature_id, %run_id, current = %record.run_id, "ignoring release for stale run");
            return false;
        }

        if !options.force && record.leases > 1 {
            record.leases -= 1;
            debug!(feature_id, leases = record.leases, "released one lease");
            return false;
        }

        slots.remove(feature_id);
        debug!(feature_id, forced = options.force, "released slot");
        true
    }

    /// Snapshot of the record, including its cancellation token.
    pub fn get(&self, feature_id: &str) -> Option<RunningExecution> {
        self.slots().get(feature_id).cloned()
    }

    pub fn is_running(&self, feature_id: &str) -> bool {
        self.slots().contains_key(feature_id)
    }

    /// Mutate the live record in place. Returns `false` if there is none.
    pub fn update<F>(&self, feature_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut RunningExecution),
    {
        match self.slots().get_mut(feature_id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    /// All active records, oldest first.
    pub fn running(&self) -> Vec<RunningExecution> {
        let mut records: Vec<_> = self.slots().values().cloned().collect();
        records.sort_by_key(|r| r.started_at);
        records
    }
}
