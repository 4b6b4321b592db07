//! Feature-scoped file access.

use super::store::{FileFeatureStore, validate_feature_id};
use crate::error::{DroverError, Result};
use crate::fs::atomic_write_file;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Read and write files belonging to one feature.
///
/// Paths are relative to the feature directory; absolute paths and `..`
/// components are rejected so nothing outside the feature can be touched.
#[async_trait]
pub trait FeatureFiles: Send + Sync {
    /// `Ok(None)` if the file does not exist.
    async fn read(&self, relative: &str) -> Result<Option<String>>;

    async fn write(&self, relative: &str, content: &str) -> Result<()>;

    async fn append(&self, relative: &str, content: &str) -> Result<()>;
}

/// [`FeatureFiles`] backed by `.drover/features/<id>/`.
#[derive(Debug, Clone)]
pub struct FeatureDir {
    root: PathBuf,
}

impl FeatureDir {
    pub fn new(project: &Path, feature_id: &str) -> Result<Self> {
        validate_feature_id(feature_id)?;
        Ok(Self {
            root: FileFeatureStore::feature_dir(project, feature_id),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path inside the feature directory.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = Path::new(relative);
        let reject = || {
            DroverError::UserError(format!(
                "path '{}' escapes the feature directory",
                relative
            ))
        };

        if relative.is_empty() || path.is_absolute() {
            return Err(reject());
        }
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(reject());
                }
            }
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl FeatureFiles for FeatureDir {
    async fn read(&self, relative: &str) -> Result<Option<String>> {
        let path = self.resolve(relative)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DroverError::UserError(format!(
                "failed to read '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write(&self, relative: &str, content: &str) -> Result<()> {
        atomic_write_file(self.resolve(relative)?, content).await
    }

    async fn append(&self, relative: &str, content: &str) -> Result<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DroverError::UserError(format!(
                    "failed to create '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                DroverError::UserError(format!("failed to open '{}': {}", path.display(), e))
            })?;
        file.write_all(content.as_bytes()).await.map_err(|e| {
            DroverError::UserError(format!("failed to append to '{}': {}", path.display(), e))
        })?;
        file.flush().await.map_err(|e| {
            DroverError::UserError(format!("failed to flush '{}': {}", path.display(), e))
        })
    }
}
