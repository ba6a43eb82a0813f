//! Model Registry
//!
//! Owns the deserialized classifier, regressor and their paired
//! preprocessors. The bundle is loaded at most once per registry: concurrent
//! first callers block on the same `OnceLock` initializer, so no caller can
//! observe a half-built bundle, and nothing is mutated after initialization.
//!
//! Loading is best-effort per artifact. A missing file is normal (the service
//! runs on the fallback sampler); a corrupt file is logged and treated as
//! absent. Neither fails the bundle.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use super::artifacts::{
    ClassifierArtifact, CropClassifier, Preprocess, Preprocessor, RegressorArtifact,
    YieldRegressor,
};
use crate::config::{defaults, ModelConfig};

/// File locations of the four artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub classifier: PathBuf,
    pub classifier_preprocessor: PathBuf,
    pub regressor: PathBuf,
    pub regressor_preprocessor: PathBuf,
}

impl ArtifactPaths {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            classifier: dir.join(defaults::CLASSIFIER_FILE),
            classifier_preprocessor: dir.join(defaults::CLASSIFIER_PREPROCESSOR_FILE),
            regressor: dir.join(defaults::REGRESSOR_FILE),
            regressor_preprocessor: dir.join(defaults::REGRESSOR_PREPROCESSOR_FILE),
        }
    }

    pub fn from_config(models: &ModelConfig) -> Self {
        let dir = Path::new(&models.dir);
        Self {
            classifier: dir.join(&models.classifier_file),
            classifier_preprocessor: dir.join(&models.classifier_preprocessor_file),
            regressor: dir.join(&models.regressor_file),
            regressor_preprocessor: dir.join(&models.regressor_preprocessor_file),
        }
    }
}

/// Loaded artifacts. Every slot is independently optional.
#[derive(Clone, Default)]
pub struct ModelBundle {
    pub classifier: Option<Arc<dyn CropClassifier>>,
    pub classifier_preprocessor: Option<Arc<dyn Preprocess>>,
    pub regressor: Option<Arc<dyn YieldRegressor>>,
    pub regressor_preprocessor: Option<Arc<dyn Preprocess>>,
}

impl std::fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBundle")
            .field("classifier", &self.classifier.is_some())
            .field("classifier_preprocessor", &self.classifier_preprocessor.is_some())
            .field("regressor", &self.regressor.is_some())
            .field("regressor_preprocessor", &self.regressor_preprocessor.is_some())
            .finish()
    }
}

/// Snapshot of what the bundle holds, for the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleStatus {
    pub classifier_loaded: bool,
    pub classifier_preprocessor_loaded: bool,
    pub regressor_loaded: bool,
    pub regressor_preprocessor_loaded: bool,
    pub classes: Vec<String>,
    pub classifier_columns: Option<Vec<String>>,
    pub regressor_columns: Option<Vec<String>>,
}

impl ModelBundle {
    /// Bundle with nothing loaded; every request goes through the fallback.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read every artifact, degrading each failure to an absent slot.
    pub fn load(paths: &ArtifactPaths) -> Self {
        let classifier = load_artifact::<ClassifierArtifact>(&paths.classifier, "classifier")
            .and_then(|model| match model.validate() {
                Ok(()) => Some(Arc::new(model) as Arc<dyn CropClassifier>),
                Err(reason) => {
                    warn!(
                        path = %paths.classifier.display(),
                        %reason,
                        "Rejecting classifier artifact"
                    );
                    None
                }
            });
        let regressor = load_artifact::<RegressorArtifact>(&paths.regressor, "regressor")
            .and_then(|model| match model.validate() {
                Ok(()) => Some(Arc::new(model) as Arc<dyn YieldRegressor>),
                Err(reason) => {
                    warn!(
                        path = %paths.regressor.display(),
                        %reason,
                        "Rejecting regressor artifact"
                    );
                    None
                }
            });
        let classifier_preprocessor =
            load_artifact::<Preprocessor>(&paths.classifier_preprocessor, "classifier preprocessor")
                .map(|p| Arc::new(p) as Arc<dyn Preprocess>);
        let regressor_preprocessor =
            load_artifact::<Preprocessor>(&paths.regressor_preprocessor, "regressor preprocessor")
                .map(|p| Arc::new(p) as Arc<dyn Preprocess>);

        let bundle = Self {
            classifier,
            classifier_preprocessor,
            regressor,
            regressor_preprocessor,
        };
        info!(
            classifier = bundle.classifier.is_some(),
            classifier_preprocessor = bundle.classifier_preprocessor.is_some(),
            regressor = bundle.regressor.is_some(),
            regressor_preprocessor = bundle.regressor_preprocessor.is_some(),
            "Model bundle initialized"
        );
        bundle
    }

    pub fn with_classifier(
        mut self,
        classifier: Arc<dyn CropClassifier>,
        preprocessor: Arc<dyn Preprocess>,
    ) -> Self {
        self.classifier = Some(classifier);
        self.classifier_preprocessor = Some(preprocessor);
        self
    }

    pub fn with_regressor(
        mut self,
        regressor: Arc<dyn YieldRegressor>,
        preprocessor: Arc<dyn Preprocess>,
    ) -> Self {
        self.regressor = Some(regressor);
        self.regressor_preprocessor = Some(preprocessor);
        self
    }

    pub fn classifier_columns(&self) -> Option<Vec<String>> {
        self.classifier_preprocessor
            .as_ref()
            .and_then(|p| p.expected_columns())
    }

    pub fn regressor_columns(&self) -> Option<Vec<String>> {
        self.regressor_preprocessor
            .as_ref()
            .and_then(|p| p.expected_columns())
    }

    pub fn can_classify(&self) -> bool {
        self.classifier.is_some() && self.classifier_preprocessor.is_some()
    }

    pub fn can_predict_yield(&self) -> bool {
        self.regressor.is_some() && self.regressor_preprocessor.is_some()
    }

    pub fn status(&self) -> BundleStatus {
        BundleStatus {
            classifier_loaded: self.classifier.is_some(),
            classifier_preprocessor_loaded: self.classifier_preprocessor.is_some(),
            regressor_loaded: self.regressor.is_some(),
            regressor_preprocessor_loaded: self.regressor_preprocessor.is_some(),
            classes: self
                .classifier
                .as_ref()
                .map(|c| c.classes().to_vec())
                .unwrap_or_default(),
            classifier_columns: self.classifier_columns(),
            regressor_columns: self.regressor_columns(),
        }
    }
}

fn load_artifact<T: DeserializeOwned>(path: &Path, label: &str) -> Option<T> {
    if !path.exists() {
        info!(path = %path.display(), "No {} artifact found", label);
        return None;
    }
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read {} artifact", label);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(artifact) => {
            info!(path = %path.display(), "Loaded {} artifact", label);
            Some(artifact)
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Corrupt {} artifact, treating as absent",
                label
            );
            None
        }
    }
}

/// Thread-safe, initialize-once owner of the model bundle.
///
/// Shared as `Arc<ModelRegistry>`; the pipeline never reaches for ambient
/// global state.
pub struct ModelRegistry {
    paths: Option<ArtifactPaths>,
    bundle: OnceLock<ModelBundle>,
}

impl ModelRegistry {
    /// Registry that loads lazily from `paths` on first use.
    pub fn new(paths: ArtifactPaths) -> Self {
        Self {
            paths: Some(paths),
            bundle: OnceLock::new(),
        }
    }

    /// Registry around an already-built bundle.
    pub fn preloaded(bundle: ModelBundle) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(bundle);
        Self {
            paths: None,
            bundle: cell,
        }
    }

    /// The bundle, loading it on first call.
    pub fn bundle(&self) -> &ModelBundle {
        self.bundle.get_or_init(|| match &self.paths {
            Some(paths) => ModelBundle::load(paths),
            None => ModelBundle::empty(),
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.bundle.get().is_some()
    }

    pub fn paths(&self) -> Option<&ArtifactPaths> {
        self.paths.as_ref()
    }
}
