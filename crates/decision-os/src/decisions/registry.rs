use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use super::catalog::builtin_templates;
use super::criteria::{
    validate_tolerance, CriteriaModel, CriteriaModelError, ModelVersion, DEFAULT_TOLERANCE,
};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("model version {0} is already registered with different content")]
    VersionConflict(ModelVersion),
    #[error("scenario variant {0} cannot be registered")]
    VariantNotRegistrable(ModelVersion),
    #[error(transparent)]
    InvalidModel(#[from] CriteriaModelError),
    #[error("model registry unavailable")]
    Unavailable,
}

/// Store of immutable criteria model versions. Decisions refer to entries by
/// [`ModelVersion`]; registered content never changes.
///
/// Every registered model must have weights summing to 1.0 within the registry's tolerance.
#[derive(Debug)]
pub struct ModelRegistry {
    models: RwLock<BTreeMap<ModelVersion, Arc<CriteriaModel>>>,
    tolerance: f64,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self {
            models: RwLock::new(BTreeMap::new()),
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Whether a model would be new to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    New,
    AlreadyRegistered,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry that checks weight sums against `tolerance`.
    pub fn with_tolerance(tolerance: f64) -> Result<Self, RegistryError> {
        validate_tolerance(tolerance)?;
        Ok(Self {
            tolerance,
            ..Self::default()
        })
    }

    /// Registry preloaded with the built-in templates.
    pub fn with_builtin_templates() -> Result<Self, RegistryError> {
        let registry = Self::new();
        registry.load_builtin_templates()?;
        Ok(registry)
    }

    pub fn load_builtin_templates(&self) -> Result<(), RegistryError> {
        for model in builtin_templates()? {
            self.register(model)?;
        }
        Ok(())
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Check a model without registering it.
    pub fn admit(&self, model: &CriteriaModel) -> Result<Admission, RegistryError> {
        let models = self.models.read().map_err(|_| RegistryError::Unavailable)?;
        self.admission(&models, model)
    }

    fn admission(
        &self,
        models: &BTreeMap<ModelVersion, Arc<CriteriaModel>>,
        model: &CriteriaModel,
    ) -> Result<Admission, RegistryError> {
        let version = model.version_ref();
        if version.is_variant() {
            return Err(RegistryError::VariantNotRegistrable(version));
        }
        match models.get(&version) {
            Some(existing) if existing.as_ref() == model => Ok(Admission::AlreadyRegistered),
            Some(_) => Err(RegistryError::VersionConflict(version)),
            None => {
                model.validate_weights(self.tolerance)?;
                Ok(Admission::New)
            }
        }
    }

    /// Register a model. Re-registering identical content is a no-op.
    pub fn register(&self, model: CriteriaModel) -> Result<ModelVersion, RegistryError> {
        let version = model.version_ref();
        let mut models = self.models.write().map_err(|_| RegistryError::Unavailable)?;
        if self.admission(&models, &model)? == Admission::AlreadyRegistered {
            return Ok(version);
        }

        info!(model = %version, criteria = model.len(), "registered criteria model");
        models.insert(version.clone(), Arc::new(model));
        Ok(version)
    }

    pub fn get(&self, version: &ModelVersion) -> Result<Option<Arc<CriteriaModel>>, RegistryError> {
        let models = self.models.read().map_err(|_| RegistryError::Unavailable)?;
        Ok(models.get(version).cloned())
    }

    /// Highest registered version of a model id.
    pub fn latest(&self, model_id: &str) -> Result<Option<Arc<CriteriaModel>>, RegistryError> {
        let models = self.models.read().map_err(|_| RegistryError::Unavailable)?;
        Ok(models
            .iter()
            .filter(|(version, _)| version.model_id == model_id)
            .max_by_key(|(version, _)| version.version)
            .map(|(_, model)| Arc::clone(model)))
    }

    pub fn versions(&self) -> Result<Vec<ModelVersion>, RegistryError> {
        let models = self.models.read().map_err(|_| RegistryError::Unavailable)?;
        Ok(models.keys().cloned().collect())
    }
}
