use crate::engine::InferenceEngine;
use crate::tensor::TensorMap;
use async_trait::async_trait;
use hearth_agents::{Agent, AgentCall};
use hearth_core::{HearthError, HearthResult};
use serde_json::json;
use std::sync::Arc;

const DEFAULT_MAX_TOKENS: usize = 100;

/// Serves compute-heavy tasks through an [`InferenceEngine`].
///
/// Operations:
/// - `run`: parameters `model_id` and `inputs` (a tensor map);
/// - `generate`: parameters `prompt` and optional `max_tokens`.
///
/// The task priority is passed through to the engine's queue.
pub struct InferenceAgent {
    engine: Arc<InferenceEngine>,
}

impl InferenceAgent {
    /// Wrap a shared engine.
    pub fn new(engine: Arc<InferenceEngine>) -> Self {
        Self { engine }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &Arc<InferenceEngine> {
        &self.engine
    }
}

fn required_str<'a>(call: &'a AgentCall, name: &str) -> HearthResult<&'a str> {
    call.param(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HearthError::agent(format!("parameter '{name}' must be a string")))
}

#[async_trait]
impl Agent for InferenceAgent {
    async fn process(&self, call: AgentCall) -> HearthResult<serde_json::Value> {
        match call.operation.as_str() {
            "run" => {
                let model_id = required_str(&call, "model_id")?;
                let inputs: TensorMap = match call.param("inputs") {
                    Some(value) => serde_json::from_value(value.clone())?,
                    None => return Err(HearthError::agent("parameter 'inputs' is required")),
                };
                let output = self
                    .engine
                    .run_inference(model_id, inputs, call.priority)
                    .await?;
                Ok(json!({
                    "model_id": output.model_id,
                    "outputs": output.outputs,
                    "duration_ms": output.duration.as_secs_f64() * 1000.0,
                }))
            }
            "generate" => {
                let prompt = required_str(&call, "prompt")?;
                let max_tokens = call
                    .param("max_tokens")
                    .and_then(serde_json::Value::as_u64)
                    .map_or(DEFAULT_MAX_TOKENS, |n| n as usize);
                let text = self.engine.generate(prompt, max_tokens, call.priority).await?;
                Ok(json!({ "text": text }))
            }
            other => Err(HearthError::agent(format!(
                "unsupported inference operation: {other}"
            ))),
        }
    }
}
