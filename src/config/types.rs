//! Configuration types and defaults for drover.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Overrides for launching one provider's tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderProfile {
    /// Replacement binary (name on PATH or absolute path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Extra arguments appended to the built invocation, shell-words syntax.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub args: String,

    /// Environment variables set for the agent process.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,
}

/// What a pipeline step does when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStepKind {
    /// A failure aborts the execution with a pipeline error.
    #[default]
    Command,
    /// A failure is treated as a merge conflict and sets `merge_conflict`.
    Merge,
}

/// One post-execution step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Steps run in ascending `order`; ties keep file order.
    #[serde(default)]
    pub order: i32,

    /// Shell-words command line, run in the feature's working directory.
    pub command: String,

    #[serde(default)]
    pub kind: PipelineStepKind,
}

impl PipelineStep {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Fleet-wide auto-pause policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoPauseConfig {
    /// Failures of one kind within the window that trigger a pause.
    pub threshold: u32,

    /// Sliding window length in seconds.
    pub window_secs: u64,
}

impl Default for AutoPauseConfig {
    fn default() -> Self {
        Self {
            threshold: default_auto_pause_threshold(),
            window_secs: default_auto_pause_window_secs(),
        }
    }
}

/// Prompt template overrides. Unset entries use the built-in templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<String>,
}

pub(crate) fn default_model() -> String {
    "sonnet".to_string()
}
pub(crate) fn default_idle_timeout_secs() -> u64 {
    30
}
pub(crate) fn default_max_incomplete_retries() -> u32 {
    3
}
pub(crate) fn default_verification_min_chars() -> usize {
    200
}
pub(crate) fn default_auto_pause_threshold() -> u32 {
    3
}
pub(crate) fn default_auto_pause_window_secs() -> u64 {
    60
}
pub(crate) fn default_instruction_files() -> Vec<String> {
    vec!["AGENTS.md".to_string(), "CLAUDE.md".to_string()]
}
pub(crate) fn default_true() -> bool {
    true
}
