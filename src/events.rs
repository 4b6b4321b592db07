//! Execution events.
//!
//! The orchestrator reports progress through a fire-and-forget
//! [`EventSink`]: emitting never blocks on a consumer and never fails the
//! execution. Two sinks ship with the crate:
//!
//! - [`EventLog`] appends NDJSON lines to `.drover/events/events.ndjson`,
//!   the durable audit trail
//! - [`BroadcastBus`] fans events out to in-process subscribers (a UI, the
//!   CLI's live output)
//!
//! [`FanOut`] combines several sinks.
//!
//! # Event Format
//!
//! ```json
//! {"ts":"2025-01-01T12:00:00Z","kind":"feature_completed","actor":"me@host","feature":"f-1","details":{"status":"verified"}}
//! ```

use crate::error::{DroverError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An agent process is about to start.
    AgentStarted,
    /// One normalized provider message.
    AgentMessage,
    /// A plan task changed status.
    TaskProgress,
    /// A follow-up invocation for unresolved tasks is starting.
    RetryScheduled,
    /// A pipeline step finished.
    PipelineStep,
    FeatureCompleted,
    FeatureFailed,
    FeatureInterrupted,
    /// The failure tracker requested a fleet-wide pause.
    AutoPaused,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AgentStarted => "agent_started",
            EventKind::AgentMessage => "agent_message",
            EventKind::TaskProgress => "task_progress",
            EventKind::RetryScheduled => "retry_scheduled",
            EventKind::PipelineStep => "pipeline_step",
            EventKind::FeatureCompleted => "feature_completed",
            EventKind::FeatureFailed => "feature_failed",
            EventKind::FeatureInterrupted => "feature_interrupted",
            EventKind::AutoPaused => "auto_paused",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,

    pub kind: EventKind,

    /// `user@HOST` of the process that ran the execution.
    pub actor: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,

    pub details: Value,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            ts: Utc::now(),
            kind,
            actor: actor_string(),
            feature: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_feature(mut self, feature_id: impl Into<String>) -> Self {
        self.feature = Some(feature_id.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| DroverError::UserError(format!("failed to serialize event: {}", e)))
    }
}

fn actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Fire-and-forget event consumer.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Append-only NDJSON event log.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    // Keeps concurrent appends from interleaving within a line.
    write_lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn for_project(project: &Path) -> Self {
        Self::new(project.join(".drover").join("events").join("events.ndjson"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single line.
    pub fn append(&self, event: &Event) -> Result<()> {
        let line = event.to_ndjson_line()?;
        let _lock = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(dir) = self.path.parent()
            && !dir.exists()
        {
            fs::create_dir_all(dir).map_err(|e| {
                DroverError::UserError(format!(
                    "failed to create events directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                DroverError::UserError(format!(
                    "failed to open events file '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", line)
            .map_err(|e| DroverError::UserError(format!("failed to write event: {}", e)))
    }

    /// Read every event back, skipping lines that do not parse.
    pub fn read_all(&self) -> Result<Vec<Event>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DroverError::UserError(format!(
                    "failed to read events file '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: Event) {
        if let Err(e) = self.append(&event) {
            warn!(kind = %event.kind, error = %e, "failed to append event");
        }
    }
}

/// In-process broadcast to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<Event>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for BroadcastBus {
    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

/// Forwards every event to each inner sink.
#[derive(Clone, Default)]
pub struct FanOut {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanOut {
    fn emit(&self, event: Event) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

/// Keeps every event in memory, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}
