//! Config loading, validation, and lookups.

use super::model::Config;
use super::types::{PipelineStep, ProviderProfile};
use crate::error::{DroverError, Result};
use crate::provider::ProviderKind;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

impl Config {
    /// Path of the config file inside a project.
    pub fn path_for_project(project: &Path) -> PathBuf {
        project.join(".drover").join("config.yaml")
    }

    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            DroverError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load a project's config, falling back to defaults when it has none.
    pub fn load_for_project(project: &Path) -> Result<Self> {
        let path = Self::path_for_project(project);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| DroverError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| DroverError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values.
    ///
    /// Validation rules:
    /// - `idle_timeout_secs` must be positive
    /// - `auto_pause.threshold` and `auto_pause.window_secs` must be positive
    /// - `providers` keys must name a known provider
    /// - pipeline step ids must be non-empty and unique, commands non-empty
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(DroverError::Config(
                "idle_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.auto_pause.threshold == 0 {
            return Err(DroverError::Config(
                "auto_pause.threshold must be greater than 0".to_string(),
            ));
        }

        if self.auto_pause.window_secs == 0 {
            return Err(DroverError::Config(
                "auto_pause.window_secs must be greater than 0".to_string(),
            ));
        }

        if self.default_model.trim().is_empty() {
            return Err(DroverError::Config(
                "default_model must not be empty".to_string(),
            ));
        }

        for name in self.providers.keys() {
            name.parse::<ProviderKind>()
                .map_err(|_| DroverError::Config(format!("unknown provider '{}' in providers", name)))?;
        }

        let mut seen = HashSet::new();
        for step in &self.pipeline {
            if step.id.trim().is_empty() {
                return Err(DroverError::Config(
                    "pipeline step ids must be non-empty".to_string(),
                ));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(DroverError::Config(format!(
                    "duplicate pipeline step id '{}'",
                    step.id
                )));
            }
            if step.command.trim().is_empty() {
                return Err(DroverError::Config(format!(
                    "pipeline step '{}' has an empty command",
                    step.id
                )));
            }
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn auto_pause_window(&self) -> Duration {
        Duration::from_secs(self.auto_pause.window_secs)
    }

    pub fn provider_profile(&self, kind: ProviderKind) -> Option<&ProviderProfile> {
        self.providers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(kind.name()))
            .map(|(_, profile)| profile)
    }

    /// Pipeline steps sorted by `order`, minus the excluded ids.
    pub fn pipeline_steps<'a, I>(&self, excluded: I) -> Vec<PipelineStep>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let excluded: HashSet<&str> = excluded.into_iter().map(String::as_str).collect();
        let mut steps: Vec<PipelineStep> = self
            .pipeline
            .iter()
            .filter(|step| !excluded.contains(step.id.as_str()))
            .cloned()
            .collect();
        // Stable sort keeps file order for equal `order` values.
        steps.sort_by_key(|step| step.order);
        steps
    }
}
