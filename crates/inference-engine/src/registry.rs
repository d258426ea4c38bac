//! Model Registry
//!
//! Loads persisted models lazily and swaps freshly trained ones in. The write
//! lock is only held for the map insert, never while training.

use crate::engine::{LinearModel, Regressor};
use crate::InferenceError;
use measurement::Parameter;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Source of trained models for the forecast engine
pub trait ModelProvider: Send + Sync {
    /// Trained model for a city and parameter
    fn model_for(
        &self,
        city: &str,
        parameter: Parameter,
    ) -> Result<Arc<dyn Regressor>, InferenceError>;
}

type ModelKey = (String, Parameter);

/// Registry of trained models, optionally backed by a directory
pub struct ModelRegistry {
    /// Directory holding `{city}_{parameter}_model.bin` files
    model_dir: Option<PathBuf>,
    /// Loaded models
    models: RwLock<HashMap<ModelKey, Arc<LinearModel>>>,
}

impl ModelRegistry {
    /// Create a registry persisting to `model_dir`
    pub fn new(model_dir: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let dir = model_dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| InferenceError::PersistError(e.to_string()))?;
        info!("Creating model registry in {}", dir.display());
        Ok(Self {
            model_dir: Some(dir),
            models: RwLock::new(HashMap::new()),
        })
    }

    /// Create a registry that keeps models in memory only
    pub fn in_memory() -> Self {
        info!("Creating in-memory model registry");
        Self {
            model_dir: None,
            models: RwLock::new(HashMap::new()),
        }
    }

    /// File path for a city/parameter model
    pub fn path_for(&self, city: &str, parameter: Parameter) -> Option<PathBuf> {
        let safe_city: String = city
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        self.model_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}_{}_model.bin", safe_city, parameter)))
    }

    /// Look up a model, loading it from disk on first use
    pub fn get(&self, city: &str, parameter: Parameter) -> Result<Arc<LinearModel>, InferenceError> {
        let key = (city.to_string(), parameter);
        if let Some(model) = self.read_map()?.get(&key) {
            return Ok(Arc::clone(model));
        }

        let model = Arc::new(self.load(city, parameter)?);
        self.write_map()?.insert(key, Arc::clone(&model));
        Ok(model)
    }

    /// Check whether a model is available
    pub fn contains(&self, city: &str, parameter: Parameter) -> bool {
        self.get(city, parameter).is_ok()
    }

    /// Persist a trained model and make it visible to readers
    pub fn install(&self, model: LinearModel) -> Result<Arc<LinearModel>, InferenceError> {
        if let Some(path) = self.path_for(&model.city, model.parameter) {
            let bytes = postcard::to_allocvec(&model)
                .map_err(|e| InferenceError::PersistError(e.to_string()))?;
            let staging = path.with_extension("bin.tmp");
            fs::write(&staging, bytes)
                .and_then(|_| fs::rename(&staging, &path))
                .map_err(|e| InferenceError::PersistError(e.to_string()))?;
            debug!("Persisted model to {}", path.display());
        }

        let key = (model.city.clone(), model.parameter);
        let model = Arc::new(model);
        self.write_map()?.insert(key, Arc::clone(&model));
        info!("Installed model for {} - {}", model.city, model.parameter);
        Ok(model)
    }

    fn load(&self, city: &str, parameter: Parameter) -> Result<LinearModel, InferenceError> {
        let not_found = || InferenceError::ModelNotFound {
            city: city.to_string(),
            parameter: parameter.to_string(),
        };

        let path = self.path_for(city, parameter).ok_or_else(not_found)?;
        if !path.exists() {
            return Err(not_found());
        }

        let bytes = fs::read(&path).map_err(|e| InferenceError::ModelLoadError(e.to_string()))?;
        let model: LinearModel = postcard::from_bytes(&bytes).map_err(|e| {
            warn!("Error loading model {}: {}", path.display(), e);
            InferenceError::ModelLoadError(e.to_string())
        })?;
        info!("Model loaded successfully for {} - {}", city, parameter);
        Ok(model)
    }

    fn read_map(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<ModelKey, Arc<LinearModel>>>, InferenceError>
    {
        self.models
            .read()
            .map_err(|e| InferenceError::ModelLoadError(format!("Lock error: {}", e)))
    }

    fn write_map(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<ModelKey, Arc<LinearModel>>>, InferenceError>
    {
        self.models
            .write()
            .map_err(|e| InferenceError::ModelLoadError(format!("Lock error: {}", e)))
    }
}

impl ModelProvider for ModelRegistry {
    fn model_for(
        &self,
        city: &str,
        parameter: Parameter,
    ) -> Result<Arc<dyn Regressor>, InferenceError> {
        let model: Arc<dyn Regressor> = self.get(city, parameter)?;
        Ok(model)
    }
}
