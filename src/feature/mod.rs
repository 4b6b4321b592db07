//! Feature model.
//!
//! A feature is one unit of work an agent is driven to completion on. Features
//! are stored as JSON under `.drover/features/<id>/feature.json`; the same
//! directory holds the agent transcript (`agent-output.md`).
//!
//! Known fields are typed; unknown fields are preserved in `extra` so records
//! written by newer tools survive a round trip.
//!
//! # Status lifecycle
//!
//! ```text
//! backlog / ready / interrupted ──► in_progress ──► verified
//!                                              ├──► waiting_approval
//!                                              ├──► merge_conflict
//!                                              ├──► backlog      (hard error)
//!                                              └──► interrupted  (cancelled)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

mod files;
#[cfg(test)]
pub mod memory;
mod store;
#[cfg(test)]
mod tests;

pub use files::{FeatureDir, FeatureFiles};
pub use store::{FeatureStore, FileFeatureStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Backlog,
    Ready,
    InProgress,
    Interrupted,
    WaitingApproval,
    Verified,
    MergeConflict,
}

impl FeatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureStatus::Backlog => "backlog",
            FeatureStatus::Ready => "ready",
            FeatureStatus::InProgress => "in_progress",
            FeatureStatus::Interrupted => "interrupted",
            FeatureStatus::WaitingApproval => "waiting_approval",
            FeatureStatus::Verified => "verified",
            FeatureStatus::MergeConflict => "merge_conflict",
        }
    }

    /// Statuses from which an execution may move the feature to `in_progress`.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            FeatureStatus::Backlog | FeatureStatus::Ready | FeatureStatus::Interrupted
        )
    }

    /// Statuses an execution finishes in on success.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FeatureStatus::Verified | FeatureStatus::WaitingApproval | FeatureStatus::MergeConflict
        )
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTask {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Generated,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub status: PlanStatus,

    /// Approved plan text handed to the agent on continuation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default)]
    pub tasks: Vec<PlanTask>,
}

impl Plan {
    /// Tasks that are not yet completed, in plan order.
    pub fn unresolved_tasks(&self) -> Vec<&PlanTask> {
        self.tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Completed)
            .collect()
    }

    /// Approved and not yet carried out.
    pub fn awaiting_execution(&self) -> bool {
        self.status == PlanStatus::Approved
            && (self.tasks.is_empty() || !self.unresolved_tasks().is_empty())
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut PlanTask> {
        self.tasks.iter_mut().find(|t| t.id.eq_ignore_ascii_case(id))
    }
}

/// A persisted feature record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Longer specification text, if the feature has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,

    pub status: FeatureStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,

    /// Model selector; falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_pipeline_steps: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_paths: Vec<PathBuf>,

    /// Skip transcript verification and always finish in `waiting_approval`.
    #[serde(default)]
    pub skip_tests: bool,

    /// Provider session of an interrupted run, for resuming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Message and suggestion from the last failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Unknown fields preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Feature {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            spec: None,
            status: FeatureStatus::Backlog,
            plan: None,
            model: None,
            branch_name: None,
            excluded_pipeline_steps: BTreeSet::new(),
            image_paths: Vec::new(),
            skip_tests: false,
            session_id: None,
            summary: None,
            last_error: None,
            started_at: None,
            updated_at: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the status and bump `updated_at`.
    pub fn set_status(&mut self, status: FeatureStatus) {
        if status == FeatureStatus::InProgress && self.status != FeatureStatus::InProgress {
            self.started_at = Some(Utc::now());
        }
        self.status = status;
        self.updated_at = Some(Utc::now());
    }

    pub fn unresolved_tasks(&self) -> Vec<&PlanTask> {
        self.plan
            .as_ref()
            .map(Plan::unresolved_tasks)
            .unwrap_or_default()
    }
}
