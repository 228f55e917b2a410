//! Execution resource management for compute-heavy agents.
//!
//! Model requests are memoized, admitted into a bounded execution resource
//! strictly by priority (FIFO within a tier), and timed.
//!
//! # Main types
//!
//! - [`InferenceEngine`] — Loads models, runs requests, owns both caches.
//! - [`Dispatcher`] — Priority-ordered admission into a fixed number of slots.
//! - [`ResultCache`] — Memoized outputs with a size/age [`CachePolicy`].
//! - [`InferenceAgent`] — Exposes the engine through the [`hearth_agents::Agent`] contract.
//! - [`PowerProfile`] — Resource budgets selected from battery level and forecast load.

/// Adapter exposing the engine as an agent.
pub mod agent;
/// Result cache and eviction policy.
pub mod cache;
/// Engine configuration.
pub mod config;
/// Priority-ordered slot admission.
pub mod dispatch;
/// The inference engine.
pub mod engine;
/// Model runtime seam and model handles.
pub mod model;
/// Power profiles and usage forecasting.
pub mod power;
/// Tensor payloads.
pub mod tensor;
/// Text encode/decode seam for sequence models.
pub mod tokenizer;

pub use agent::InferenceAgent;
pub use cache::{CacheKey, CachePolicy, ResultCache};
pub use config::InferenceConfig;
pub use dispatch::{Dispatcher, Permit};
pub use engine::{InferenceEngine, InferenceOutput};
pub use model::{LoadedModel, ModelHandle, ModelRuntime};
pub use power::{select_profile, LoadForecast, PowerProfile, UsagePredictor, UsageSample};
pub use tensor::{Tensor, TensorData, TensorMap};
pub use tokenizer::Tokenizer;
