use crate::cache::CachePolicy;
use serde::{Deserialize, Serialize};

/// Settings for an [`crate::InferenceEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Requests allowed on the execution resource at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Result cache bounds.
    #[serde(default)]
    pub cache: CachePolicy,
    /// Model used by `run_sequence_inference`.
    #[serde(default = "default_sequence_model_id")]
    pub sequence_model_id: String,
    /// Input name the encoded prompt is bound to.
    #[serde(default = "default_sequence_input_name")]
    pub sequence_input_name: String,
    /// Output name handed to the tokenizer for decoding.
    #[serde(default = "default_sequence_output_name")]
    pub sequence_output_name: String,
    /// Low-priority requests are refused while the active power profile
    /// grants less accelerator budget than this (percent).
    #[serde(default = "default_low_priority_min_accelerator_budget")]
    pub low_priority_min_accelerator_budget: u8,
}

fn default_max_concurrency() -> usize {
    1
}

fn default_sequence_model_id() -> String {
    "sequence_llm".to_string()
}

fn default_sequence_input_name() -> String {
    "input_ids".to_string()
}

fn default_sequence_output_name() -> String {
    "logits".to_string()
}

fn default_low_priority_min_accelerator_budget() -> u8 {
    40
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            cache: CachePolicy::default(),
            sequence_model_id: default_sequence_model_id(),
            sequence_input_name: default_sequence_input_name(),
            sequence_output_name: default_sequence_output_name(),
            low_priority_min_accelerator_budget: default_low_priority_min_accelerator_budget(),
        }
    }
}
