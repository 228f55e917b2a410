use crate::tensor::TensorMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::HearthResult;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A model ready to run on the execution resource.
#[async_trait]
pub trait LoadedModel: Send + Sync {
    /// Declared input names.
    fn input_names(&self) -> Vec<String>;

    /// Declared output names.
    fn output_names(&self) -> Vec<String>;

    /// Run one forward pass.
    async fn run(&self, inputs: &TensorMap) -> HearthResult<TensorMap>;
}

/// Loads model artifacts for a particular accelerator or CPU backend.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Load the artifact at `path`.
    async fn load(&self, path: &Path) -> HearthResult<Arc<dyn LoadedModel>>;
}

/// A cached, loaded model with its declared schema.
pub struct ModelHandle {
    /// Identifier the model was loaded under.
    pub model_id: String,
    /// Artifact it was loaded from.
    pub path: PathBuf,
    /// Declared input names.
    pub input_names: Vec<String>,
    /// Declared output names.
    pub output_names: Vec<String>,
    /// When the load finished.
    pub loaded_at: DateTime<Utc>,
    model: Arc<dyn LoadedModel>,
}

impl ModelHandle {
    /// Wrap a freshly loaded model, capturing its schema.
    pub fn new(model_id: impl Into<String>, path: impl Into<PathBuf>, model: Arc<dyn LoadedModel>) -> Self {
        Self {
            model_id: model_id.into(),
            path: path.into(),
            input_names: model.input_names(),
            output_names: model.output_names(),
            loaded_at: Utc::now(),
            model,
        }
    }

    /// Declared inputs missing from `inputs`.
    pub fn missing_inputs(&self, inputs: &TensorMap) -> Vec<String> {
        self.input_names
            .iter()
            .filter(|name| !inputs.contains_key(*name))
            .cloned()
            .collect()
    }

    /// The underlying model.
    pub fn model(&self) -> &Arc<dyn LoadedModel> {
        &self.model
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_id", &self.model_id)
            .field("path", &self.path)
            .field("input_names", &self.input_names)
            .field("output_names", &self.output_names)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}
