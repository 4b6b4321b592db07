//! Configuration model for drover.
//!
//! This module defines the Config struct that represents `.drover/config.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.
//!
//! # File Format
//!
//! ```yaml
//! default_model: sonnet
//! idle_timeout_secs: 30
//! max_incomplete_retries: 3
//! verification_min_chars: 200
//! auto_pause:
//!   threshold: 3
//!   window_secs: 60
//! auto_load_project_instructions: true
//! providers:
//!   codex:
//!     command: /opt/homebrew/bin/codex
//!     args: "--sandbox workspace-write"
//!     environment:
//!       CODEX_HOME: /tmp/codex
//! pipeline:
//!   - id: test
//!     order: 1
//!     command: cargo test
//!   - id: merge
//!     order: 2
//!     kind: merge
//!     command: git merge --no-edit main
//! prompt_templates:
//!   continuation: |
//!     Keep going on {title}. Remaining tasks:
//!     {tasks}
//! ```

mod model;
mod operations;
pub mod types;

#[cfg(test)]
mod tests;

pub use model::Config;
pub use types::{AutoPauseConfig, PipelineStep, PipelineStepKind, PromptTemplates, ProviderProfile};

use crate::error::Result;
use std::path::Path;

/// Supplies per-project settings to the orchestrator.
pub trait SettingsProvider: Send + Sync {
    fn settings(&self, project: &Path) -> Result<Config>;
}

/// A fixed config, used for every project.
impl SettingsProvider for Config {
    fn settings(&self, _project: &Path) -> Result<Config> {
        Ok(self.clone())
    }
}

/// Reads `<project>/.drover/config.yaml` on every execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectSettings;

impl SettingsProvider for ProjectSettings {
    fn settings(&self, project: &Path) -> Result<Config> {
        Config::load_for_project(project)
    }
}
