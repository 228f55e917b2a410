use crate::cache::{CacheKey, ResultCache};
use crate::config::InferenceConfig;
use crate::dispatch::Dispatcher;
use crate::model::{ModelHandle, ModelRuntime};
use crate::power::PowerProfile;
use crate::tensor::{Tensor, TensorMap};
use crate::tokenizer::Tokenizer;
use hearth_core::{HearthError, HearthResult, Priority};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outputs of one model run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceOutput {
    /// Model that produced the outputs.
    pub model_id: String,
    /// Output tensors by declared name.
    pub outputs: TensorMap,
    /// Wall-clock time spent on the execution resource.
    pub duration: Duration,
}

/// Runs model requests on a bounded execution resource.
///
/// Requests are answered from the result cache when possible; otherwise they
/// queue by priority for one of `max_concurrency` slots. Loaded models are
/// kept for the life of the engine.
pub struct InferenceEngine {
    config: InferenceConfig,
    runtime: Arc<dyn ModelRuntime>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    models: RwLock<HashMap<String, Arc<ModelHandle>>>,
    load_lock: tokio::sync::Mutex<()>,
    results: ResultCache<InferenceOutput>,
    dispatcher: Dispatcher,
    profile: RwLock<PowerProfile>,
}

impl InferenceEngine {
    /// Engine backed by `runtime`.
    pub fn new(runtime: Arc<dyn ModelRuntime>, config: InferenceConfig) -> Self {
        Self {
            results: ResultCache::new(config.cache.clone()),
            dispatcher: Dispatcher::new(config.max_concurrency),
            config,
            runtime,
            tokenizer: None,
            models: RwLock::new(HashMap::new()),
            load_lock: tokio::sync::Mutex::new(()),
            profile: RwLock::new(PowerProfile::default()),
        }
    }

    /// Attach the tokenizer used by sequence inference.
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Load `model_id` from `path` unless it is already loaded.
    ///
    /// A second call for the same id returns the existing handle without
    /// touching the runtime.
    pub async fn load_model(
        &self,
        path: impl AsRef<Path>,
        model_id: &str,
    ) -> HearthResult<Arc<ModelHandle>> {
        if let Some(handle) = self.model(model_id) {
            debug!(model_id = %model_id, "Model already loaded");
            return Ok(handle);
        }

        let _guard = self.load_lock.lock().await;
        // Another caller may have finished the same load while we waited.
        if let Some(handle) = self.model(model_id) {
            return Ok(handle);
        }

        let handle = self.load_handle(path.as_ref(), model_id).await?;
        self.models
            .write()
            .insert(model_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Load `model_id` again, replacing the cached handle and dropping every
    /// memoized result the old weights produced.
    pub async fn reload_model(
        &self,
        path: impl AsRef<Path>,
        model_id: &str,
    ) -> HearthResult<Arc<ModelHandle>> {
        let _guard = self.load_lock.lock().await;
        let handle = self.load_handle(path.as_ref(), model_id).await?;
        self.models
            .write()
            .insert(model_id.to_string(), handle.clone());
        let dropped = self.results.invalidate_model(model_id);
        info!(model_id = %model_id, dropped, "Model reloaded, cached results invalidated");
        Ok(handle)
    }

    async fn load_handle(&self, path: &Path, model_id: &str) -> HearthResult<Arc<ModelHandle>> {
        let load_err = |reason: String| HearthError::ModelLoad {
            model_id: model_id.to_string(),
            reason,
        };

        match tokio::fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(load_err(format!("artifact not found: {}", path.display())));
            }
            Err(e) => {
                return Err(load_err(format!("cannot access {}: {e}", path.display())));
            }
        }

        let model = self.runtime.load(path).await.map_err(|e| {
            error!(model_id = %model_id, runtime = %self.runtime.name(), error = %e, "Model load failed");
            load_err(e.to_string())
        })?;

        let handle = ModelHandle::new(model_id, path, model);
        if handle.output_names.is_empty() {
            return Err(load_err("model declares no outputs".to_string()));
        }

        info!(
            model_id = %model_id,
            runtime = %self.runtime.name(),
            inputs = ?handle.input_names,
            outputs = ?handle.output_names,
            "Loaded model"
        );
        Ok(Arc::new(handle))
    }

    /// The handle for `model_id`, if loaded.
    pub fn model(&self, model_id: &str) -> Option<Arc<ModelHandle>> {
        self.models.read().get(model_id).cloned()
    }

    /// Ids of all loaded models, sorted.
    pub fn loaded_models(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.models.read().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Run `model_id` on `inputs`.
    ///
    /// Identical `(model_id, inputs)` pairs are answered from the result cache
    /// without consuming the execution resource.
    pub async fn run_inference(
        &self,
        model_id: &str,
        inputs: TensorMap,
        priority: Priority,
    ) -> HearthResult<Arc<InferenceOutput>> {
        let key = CacheKey::new(model_id, &inputs);
        if let Some(hit) = self.results.get(&key) {
            debug!(model_id = %model_id, priority = %priority, "Result cache hit");
            return Ok(hit);
        }

        let handle = self
            .model(model_id)
            .ok_or_else(|| HearthError::ModelNotLoaded(model_id.to_string()))?;

        let missing = handle.missing_inputs(&inputs);
        if !missing.is_empty() {
            return Err(HearthError::Inference {
                model_id: model_id.to_string(),
                priority,
                reason: format!("missing inputs: {}", missing.join(", ")),
            });
        }

        let malformed: Vec<&str> = inputs
            .iter()
            .filter(|(_, tensor)| !tensor.is_consistent())
            .map(|(name, _)| name.as_str())
            .collect();
        if !malformed.is_empty() {
            return Err(HearthError::Inference {
                model_id: model_id.to_string(),
                priority,
                reason: format!("shape does not match element count for: {}", malformed.join(", ")),
            });
        }

        self.check_admission(model_id, priority)?;

        let permit = self.dispatcher.acquire(priority).await;
        // An identical request may have completed while this one was queued.
        if let Some(hit) = self.results.get(&key) {
            debug!(model_id = %model_id, priority = %priority, "Result cache hit after queueing");
            return Ok(hit);
        }

        let start = Instant::now();
        let result = handle.model().run(&inputs).await;
        let duration = start.elapsed();
        drop(permit);

        let outputs = result.map_err(|e| {
            error!(model_id = %model_id, priority = %priority, error = %e, "Inference failed");
            HearthError::Inference {
                model_id: model_id.to_string(),
                priority,
                reason: e.to_string(),
            }
        })?;

        let absent: Vec<&str> = handle
            .output_names
            .iter()
            .filter(|name| !outputs.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !absent.is_empty() {
            return Err(HearthError::Inference {
                model_id: model_id.to_string(),
                priority,
                reason: format!("model returned no value for outputs: {}", absent.join(", ")),
            });
        }

        let output = Arc::new(InferenceOutput {
            model_id: model_id.to_string(),
            outputs,
            duration,
        });
        self.store_result(model_id, &handle, key, output.clone());

        info!(
            model_id = %model_id,
            priority = %priority,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "Inference complete"
        );
        Ok(output)
    }

    /// Memoize `output` unless `handle` was replaced while the request ran.
    ///
    /// The model table stays read-locked across the insert, so a concurrent
    /// reload either swaps the handle first (and the result is dropped) or
    /// invalidates after the insert.
    fn store_result(
        &self,
        model_id: &str,
        handle: &Arc<ModelHandle>,
        key: CacheKey,
        output: Arc<InferenceOutput>,
    ) {
        let models = self.models.read();
        match models.get(model_id) {
            Some(current) if Arc::ptr_eq(current, handle) => self.results.insert(key, output),
            _ => debug!(model_id = %model_id, "Model reloaded during run, result not cached"),
        }
    }

    /// Generate text from `prompt` with the configured sequence model at
    /// normal priority.
    pub async fn run_sequence_inference(
        &self,
        prompt: &str,
        max_tokens: usize,
    ) -> HearthResult<String> {
        self.generate(prompt, max_tokens, Priority::Normal).await
    }

    /// Generate text from `prompt` at the given priority.
    pub async fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        priority: Priority,
    ) -> HearthResult<String> {
        let tokenizer = self.tokenizer.as_ref().ok_or_else(|| {
            HearthError::Config("no tokenizer configured for sequence inference".to_string())
        })?;

        let ids = tokenizer.encode(prompt)?;
        let len = ids.len();
        let mut inputs = TensorMap::new();
        inputs.insert(
            self.config.sequence_input_name.clone(),
            Tensor::i64(ids).with_shape(vec![1, len]),
        );

        let model_id = &self.config.sequence_model_id;
        let output = self.run_inference(model_id, inputs, priority).await?;
        let logits = output
            .outputs
            .get(&self.config.sequence_output_name)
            .ok_or_else(|| HearthError::Inference {
                model_id: model_id.clone(),
                priority,
                reason: format!("missing output '{}'", self.config.sequence_output_name),
            })?;

        tokenizer.decode(logits, max_tokens)
    }

    fn check_admission(&self, model_id: &str, priority: Priority) -> HearthResult<()> {
        if priority != Priority::Low {
            return Ok(());
        }
        let profile = self.profile.read();
        if profile.accelerator_budget < self.config.low_priority_min_accelerator_budget {
            warn!(
                model_id = %model_id,
                profile = %profile.name,
                accelerator_budget = profile.accelerator_budget,
                "Low-priority inference throttled"
            );
            return Err(HearthError::Throttled {
                model_id: model_id.to_string(),
                priority,
                profile: profile.name.clone(),
            });
        }
        Ok(())
    }

    /// Switch the active power profile.
    pub fn apply_power_profile(&self, profile: PowerProfile) {
        info!(profile = %profile.name, "Applied power profile");
        *self.profile.write() = profile;
    }

    /// The active power profile.
    pub fn power_profile(&self) -> PowerProfile {
        self.profile.read().clone()
    }

    /// Requests queued for a slot.
    pub fn pending_requests(&self) -> usize {
        self.dispatcher.waiting()
    }

    /// Requests currently running.
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Number of memoized results.
    pub fn cache_len(&self) -> usize {
        self.results.len()
    }

    /// Drop all memoized results.
    pub fn clear_cache(&self) {
        self.results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LoadedModel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Doubler {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LoadedModel for Doubler {
        fn input_names(&self) -> Vec<String> {
            vec!["x".into()]
        }

        fn output_names(&self) -> Vec<String> {
            vec!["y".into()]
        }

        async fn run(&self, inputs: &TensorMap) -> HearthResult<TensorMap> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let x = inputs["x"].as_f32().unwrap_or_default();
            let mut out = TensorMap::new();
            out.insert("y".into(), Tensor::f32(x.iter().map(|v| v * 2.0).collect()));
            Ok(out)
        }
    }

    struct DoublerRuntime {
        loads: AtomicUsize,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ModelRuntime for DoublerRuntime {
        fn name(&self) -> &str {
            "test"
        }

        async fn load(&self, _path: &Path) -> HearthResult<Arc<dyn LoadedModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Doubler {
                runs: self.runs.clone(),
            }))
        }
    }

    fn engine() -> (InferenceEngine, Arc<DoublerRuntime>) {
        let runtime = Arc::new(DoublerRuntime {
            loads: AtomicUsize::new(0),
            runs: Arc::new(AtomicUsize::new(0)),
        });
        (
            InferenceEngine::new(runtime.clone(), InferenceConfig::default()),
            runtime,
        )
    }

    fn x(values: Vec<f32>) -> TensorMap {
        let mut map = TensorMap::new();
        map.insert("x".into(), Tensor::f32(values));
        map
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let (engine, runtime) = engine();
        let err = engine
            .load_model("/definitely/not/here.onnx", "m1")
            .await
            .unwrap_err();
        assert!(matches!(err, HearthError::ModelLoad { ref model_id, .. } if model_id == "m1"));
        assert_eq!(runtime.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_and_memoize() {
        let (engine, runtime) = engine();
        let artifact = tempfile::NamedTempFile::new().unwrap();
        engine.load_model(artifact.path(), "m1").await.unwrap();

        let first = engine
            .run_inference("m1", x(vec![1.0, 2.0]), Priority::Normal)
            .await
            .unwrap();
        assert_eq!(first.outputs["y"].as_f32().unwrap(), &[2.0, 4.0]);

        let second = engine
            .run_inference("m1", x(vec![1.0, 2.0]), Priority::High)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(runtime.runs.load(Ordering::SeqCst), 1);
        assert_eq!(engine.cache_len(), 1);
    }

    #[tokio::test]
    async fn test_missing_input_is_schema_error() {
        let (engine, _) = engine();
        let artifact = tempfile::NamedTempFile::new().unwrap();
        engine.load_model(artifact.path(), "m1").await.unwrap();

        let mut wrong = TensorMap::new();
        wrong.insert("z".into(), Tensor::f32(vec![1.0]));
        let err = engine
            .run_inference("m1", wrong, Priority::Critical)
            .await
            .unwrap_err();
        match err {
            HearthError::Inference { priority, reason, .. } => {
                assert_eq!(priority, Priority::Critical);
                assert!(reason.contains('x'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_low_priority_throttled_on_ultra_saver() {
        let (engine, _) = engine();
        let artifact = tempfile::NamedTempFile::new().unwrap();
        engine.load_model(artifact.path(), "m1").await.unwrap();

        engine.apply_power_profile(PowerProfile::ultra_saver());
        let err = engine
            .run_inference("m1", x(vec![1.0]), Priority::Low)
            .await
            .unwrap_err();
        assert!(matches!(err, HearthError::Throttled { ref profile, .. } if profile == "ultra_saver"));

        // Higher tiers still run.
        engine
            .run_inference("m1", x(vec![1.0]), Priority::Normal)
            .await
            .unwrap();

        engine.apply_power_profile(PowerProfile::power_saver());
        engine
            .run_inference("m1", x(vec![3.0]), Priority::Low)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sequence_inference_requires_tokenizer() {
        let (engine, _) = engine();
        let err = engine.run_sequence_inference("hello", 8).await.unwrap_err();
        assert!(matches!(err, HearthError::Config(_)));
    }
}
