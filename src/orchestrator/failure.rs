//! Fleet-wide auto-pause policy.
//!
//! Auto mode works through a backlog unattended. When the same kind of failure
//! keeps happening across features, the cause is almost never the feature: the
//! vendor is down, credentials expired, the network is gone. The tracker
//! counts failures per kind inside a sliding window and trips a pause once a
//! kind reaches the threshold. Kinds that can never fix themselves (missing
//! binary, missing login) trip it on the first occurrence.

use crate::config::AutoPauseConfig;
use crate::provider::{ErrorClassification, ErrorKind};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Why auto mode stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseReason {
    pub kind: ErrorKind,
    /// Failures of `kind` inside the window when the pause tripped.
    pub count: usize,
    pub message: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failure(s) of kind {}: {}",
            self.count, self.kind, self.message
        )?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    recent: VecDeque<(Instant, ErrorKind)>,
    paused: Option<PauseReason>,
}

#[derive(Debug)]
pub struct FailureTracker {
    threshold: usize,
    window: Duration,
    state: Mutex<TrackerState>,
}

impl FailureTracker {
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn from_config(config: &AutoPauseConfig) -> Self {
        Self::new(
            config.threshold as usize,
            Duration::from_secs(config.window_secs),
        )
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a failed execution. Returns the reason if this failure tripped
    /// the pause.
    pub fn record_failure(&self, classification: &ErrorClassification) -> Option<PauseReason> {
        self.record_failure_at(classification, Instant::now())
    }

    fn record_failure_at(
        &self,
        classification: &ErrorClassification,
        now: Instant,
    ) -> Option<PauseReason> {
        let mut state = self.state();
        if state.paused.is_some() {
            return None;
        }

        while let Some((at, _)) = state.recent.front() {
            if now.duration_since(*at) > self.window {
                state.recent.pop_front();
            } else {
                break;
            }
        }
        state.recent.push_back((now, classification.kind));

        let count = state
            .recent
            .iter()
            .filter(|(_, kind)| *kind == classification.kind)
            .count();

        if !classification.kind.pauses_immediately() && count < self.threshold {
            return None;
        }

        let reason = PauseReason {
            kind: classification.kind,
            count,
            message: classification.message.clone(),
            suggestion: classification.suggestion.clone(),
        };
        warn!(kind = %reason.kind, count, "pausing auto mode");
        state.paused = Some(reason.clone());
        Some(reason)
    }

    /// A success clears the failure history.
    pub fn record_success(&self) {
        self.state().recent.clear();
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused.is_some()
    }

    pub fn pause_reason(&self) -> Option<PauseReason> {
        self.state().paused.clone()
    }

    /// Lift the pause and forget past failures.
    pub fn resume(&self) {
        let mut state = self.state();
        if state.paused.take().is_some() {
            info!("auto mode resumed");
        }
        state.recent.clear();
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::from_config(&AutoPauseConfig::default())
    }
}
