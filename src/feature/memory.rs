//! In-memory feature store for tests.

use super::{Feature, FeatureStatus, FeatureStore};
use crate::error::{DroverError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryFeatureStore {
    features: Mutex<HashMap<String, Feature>>,
    /// Every status written, in order, per feature.
    history: Mutex<Vec<(String, FeatureStatus)>>,
}

impl MemoryFeatureStore {
    pub fn with(features: impl IntoIterator<Item = Feature>) -> Self {
        let store = Self::default();
        {
            let mut map = store.features.lock().unwrap();
            for feature in features {
                map.insert(feature.id.clone(), feature);
            }
        }
        store
    }

    pub fn get(&self, feature_id: &str) -> Option<Feature> {
        self.features.lock().unwrap().get(feature_id).cloned()
    }

    pub fn status_history(&self, feature_id: &str) -> Vec<FeatureStatus> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == feature_id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn edit(&self, feature_id: &str, f: impl FnOnce(&mut Feature)) {
        if let Some(feature) = self.features.lock().unwrap().get_mut(feature_id) {
            f(feature);
        }
    }
}

#[async_trait]
impl FeatureStore for MemoryFeatureStore {
    async fn load(&self, _project: &Path, feature_id: &str) -> Result<Feature> {
        self.get(feature_id)
            .ok_or_else(|| DroverError::FeatureNotFound(feature_id.to_string()))
    }

    async fn save(&self, _project: &Path, feature: &Feature) -> Result<()> {
        let mut features = self.features.lock().unwrap();
        if let Some(previous) = features.get(&feature.id)
            && previous.status != feature.status
        {
            self.history
                .lock()
                .unwrap()
                .push((feature.id.clone(), feature.status));
        }
        features.insert(feature.id.clone(), feature.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        _project: &Path,
        feature_id: &str,
        status: FeatureStatus,
    ) -> Result<()> {
        let mut features = self.features.lock().unwrap();
        let feature = features
            .get_mut(feature_id)
            .ok_or_else(|| DroverError::FeatureNotFound(feature_id.to_string()))?;
        feature.set_status(status);
        self.history
            .lock()
            .unwrap()
            .push((feature_id.to_string(), status));
        Ok(())
    }
}
