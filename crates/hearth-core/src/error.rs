use crate::Priority;
use thiserror::Error;
use uuid::Uuid;

/// A convenience `Result` alias using [`HearthError`].
pub type HearthResult<T> = Result<T, HearthError>;

/// Top-level error type for Hearth.
///
/// Orchestration and inference failures carry enough context (task id, kind,
/// model id, priority) for a caller to tell which unit of work broke.
#[derive(Debug, Error)]
pub enum HearthError {
    /// No agent is registered under the capability prefix of a task kind.
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// No routine definition exists under the requested name.
    #[error("Unknown routine: {0}")]
    UnknownRoutine(String),

    /// Inference was requested for a model id that was never loaded.
    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    /// A model artifact is missing or could not be loaded by the runtime.
    #[error("Failed to load model '{model_id}': {reason}")]
    ModelLoad {
        /// Identifier the model was being loaded under.
        model_id: String,
        /// What went wrong.
        reason: String,
    },

    /// The execution resource failed while running a request.
    #[error("Inference failed for model '{model_id}' at {priority} priority: {reason}")]
    Inference {
        /// Model the request targeted.
        model_id: String,
        /// Priority the request was submitted at.
        priority: Priority,
        /// What went wrong.
        reason: String,
    },

    /// Low-priority compute was refused under the current power profile.
    #[error("Request for model '{model_id}' at {priority} priority throttled by power profile '{profile}'")]
    Throttled {
        /// Model the request targeted.
        model_id: String,
        /// Priority the request was submitted at.
        priority: Priority,
        /// Name of the active power profile.
        profile: String,
    },

    /// An agent failed while executing a task.
    #[error("Task {task_id} ({kind}) failed: {source}")]
    AgentExecution {
        /// Task that failed.
        task_id: Uuid,
        /// Full dot-qualified kind of the task.
        kind: String,
        /// Failure raised by the agent.
        source: Box<HearthError>,
    },

    /// A routine stopped because one of its tasks failed.
    #[error("Routine '{routine}' failed at task '{task}' ({cause_kind}): {message}")]
    RoutineFailed {
        /// Routine that failed.
        routine: String,
        /// Template key of the first failed task.
        task: String,
        /// Error kind recorded for that task.
        cause_kind: String,
        /// Failure message recorded for that task.
        message: String,
    },

    /// A failure raised by an agent implementation.
    #[error("Agent error: {0}")]
    Agent(String),

    /// A task was driven through a lifecycle edge that does not exist.
    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Task being transitioned.
        task_id: Uuid,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// A routine template referenced a context value the caller did not supply.
    #[error("Routine '{routine}' requires context value '{key}'")]
    MissingContext {
        /// Routine being instantiated.
        routine: String,
        /// Missing context key.
        key: String,
    },

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HearthError {
    /// Stable snake_case identifier of the error kind.
    ///
    /// For [`HearthError::AgentExecution`] this is the kind of the wrapped
    /// cause, so a task failure reports what the agent actually hit.
    pub fn kind(&self) -> &'static str {
        match self {
            HearthError::UnknownCapability(_) => "unknown_capability",
            HearthError::UnknownRoutine(_) => "unknown_routine",
            HearthError::ModelNotLoaded(_) => "model_not_loaded",
            HearthError::ModelLoad { .. } => "model_load_error",
            HearthError::Inference { .. } => "inference_error",
            HearthError::Throttled { .. } => "throttled",
            HearthError::AgentExecution { source, .. } => source.kind(),
            HearthError::RoutineFailed { .. } => "routine_failed",
            HearthError::Agent(_) => "agent_execution_error",
            HearthError::InvalidTransition { .. } => "invalid_transition",
            HearthError::MissingContext { .. } => "missing_context",
            HearthError::Config(_) => "config_error",
            HearthError::Json(_) => "json_error",
            HearthError::Io(_) => "io_error",
        }
    }

    /// Shorthand for [`HearthError::Agent`].
    pub fn agent(message: impl Into<String>) -> Self {
        HearthError::Agent(message.into())
    }

    /// The innermost cause, unwrapping any [`HearthError::AgentExecution`] layers.
    pub fn root_cause(&self) -> &HearthError {
        match self {
            HearthError::AgentExecution { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
