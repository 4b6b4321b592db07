//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-project settings, read from `.drover/config.yaml`.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Agent invocation
    // =========================================================================
    /// Model selector used when a feature does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Seconds without agent output before the process is terminated.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Follow-up invocations allowed for unresolved plan tasks.
    #[serde(default = "default_max_incomplete_retries")]
    pub max_incomplete_retries: u32,

    /// Per-provider launch overrides, keyed by provider name.
    pub providers: BTreeMap<String, ProviderProfile>,

    // =========================================================================
    // Verification
    // =========================================================================
    /// Trimmed transcript length required for `verified`.
    #[serde(default = "default_verification_min_chars")]
    pub verification_min_chars: usize,

    // =========================================================================
    // Failure policy
    // =========================================================================
    pub auto_pause: AutoPauseConfig,

    // =========================================================================
    // Prompts
    // =========================================================================
    /// Append project instruction files to every prompt.
    #[serde(default = "default_true")]
    pub auto_load_project_instructions: bool,

    /// Instruction files looked up in the project root, in order.
    #[serde(default = "default_instruction_files")]
    pub instruction_files: Vec<String>,

    pub prompt_templates: PromptTemplates,

    // =========================================================================
    // Pipeline
    // =========================================================================
    /// Post-execution steps.
    pub pipeline: Vec<PipelineStep>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_incomplete_retries: default_max_incomplete_retries(),
            providers: BTreeMap::new(),
            verification_min_chars: default_verification_min_chars(),
            auto_pause: AutoPauseConfig::default(),
            auto_load_project_instructions: default_true(),
            instruction_files: default_instruction_files(),
            prompt_templates: PromptTemplates::default(),
            pipeline: Vec::new(),
        }
    }
}
