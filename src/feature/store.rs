//! Feature persistence.

use super::{Feature, FeatureStatus};
use crate::error::{DroverError, Result};
use crate::fs::atomic_write_file;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Storage for feature records, keyed by project and feature id.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    async fn load(&self, project: &Path, feature_id: &str) -> Result<Feature>;

    async fn save(&self, project: &Path, feature: &Feature) -> Result<()>;

    async fn update_status(
        &self,
        project: &Path,
        feature_id: &str,
        status: FeatureStatus,
    ) -> Result<()>;

    /// Move the feature to `in_progress` if its current status allows it.
    ///
    /// Returns whether the write happened. A feature already in a terminal
    /// status is left untouched.
    async fn mark_in_progress(&self, project: &Path, feature_id: &str) -> Result<bool> {
        let feature = self.load(project, feature_id).await?;
        if !feature.status.can_start() {
            debug!(feature_id, status = %feature.status, "skipping in_progress transition");
            return Ok(false);
        }
        self.update_status(project, feature_id, FeatureStatus::InProgress)
            .await?;
        Ok(true)
    }
}

/// JSON files under `<project>/.drover/features/<id>/feature.json`.
#[derive(Debug, Default)]
pub struct FileFeatureStore {
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn features_dir(project: &Path) -> PathBuf {
        project.join(".drover").join("features")
    }

    pub fn feature_dir(project: &Path, feature_id: &str) -> PathBuf {
        Self::features_dir(project).join(feature_id)
    }

    pub fn feature_path(project: &Path, feature_id: &str) -> PathBuf {
        Self::feature_dir(project, feature_id).join("feature.json")
    }

    async fn read(&self, project: &Path, feature_id: &str) -> Result<Feature> {
        validate_feature_id(feature_id)?;
        let path = Self::feature_path(project, feature_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DroverError::FeatureNotFound(feature_id.to_string()));
            }
            Err(e) => {
                return Err(DroverError::UserError(format!(
                    "failed to read feature file '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&content).map_err(|e| {
            DroverError::UserError(format!(
                "failed to parse feature file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    async fn write(&self, project: &Path, feature: &Feature) -> Result<()> {
        validate_feature_id(&feature.id)?;
        let json = serde_json::to_string_pretty(feature)
            .map_err(|e| DroverError::UserError(format!("failed to serialize feature: {}", e)))?;
        atomic_write_file(Self::feature_path(project, &feature.id), &json).await
    }

    /// Ids of every stored feature, sorted.
    pub async fn list(&self, project: &Path) -> Result<Vec<String>> {
        let dir = Self::features_dir(project);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DroverError::UserError(format!(
                    "failed to list '{}': {}",
                    dir.display(),
                    e
                )));
            }
        };

        let mut ids = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().join("feature.json").is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl FeatureStore for FileFeatureStore {
    async fn load(&self, project: &Path, feature_id: &str) -> Result<Feature> {
        self.read(project, feature_id).await
    }

    async fn save(&self, project: &Path, feature: &Feature) -> Result<()> {
        let _lock = self.write_lock.lock().await;
        let mut feature = feature.clone();
        feature.updated_at = Some(chrono::Utc::now());
        self.write(project, &feature).await
    }

    async fn update_status(
        &self,
        project: &Path,
        feature_id: &str,
        status: FeatureStatus,
    ) -> Result<()> {
        let _lock = self.write_lock.lock().await;
        let mut feature = self.read(project, feature_id).await?;
        feature.set_status(status);
        self.write(project, &feature).await?;
        debug!(feature_id, %status, "feature status updated");
        Ok(())
    }

    async fn mark_in_progress(&self, project: &Path, feature_id: &str) -> Result<bool> {
        // Check and write under one lock so two starters cannot both win.
        let _lock = self.write_lock.lock().await;
        let mut feature = self.read(project, feature_id).await?;
        if !feature.status.can_start() {
            debug!(feature_id, status = %feature.status, "skipping in_progress transition");
            return Ok(false);
        }
        feature.set_status(FeatureStatus::InProgress);
        self.write(project, &feature).await?;
        Ok(true)
    }
}

/// Feature ids become directory names, so they must be a single plain segment.
pub(crate) fn validate_feature_id(feature_id: &str) -> Result<()> {
    let valid = !feature_id.is_empty()
        && feature_id != "."
        && feature_id != ".."
        && !feature_id.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(DroverError::UserError(format!(
            "invalid feature id '{}'",
            feature_id
        )))
    }
}
