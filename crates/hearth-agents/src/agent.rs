use async_trait::async_trait;
use hearth_core::{HearthResult, Parameters, Priority};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::marker::PhantomData;
use uuid::Uuid;

/// Everything an agent receives for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCall {
    /// Task being served.
    pub task_id: Uuid,
    /// Operation within the capability (text after the first `.` of the kind).
    pub operation: String,
    /// Priority of the originating task.
    pub priority: Priority,
    /// Task parameters, already substituted from routine context.
    pub parameters: Parameters,
}

impl AgentCall {
    /// Build a call with a fresh task id.
    pub fn new(operation: impl Into<String>, priority: Priority, parameters: Parameters) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            operation: operation.into(),
            priority,
            parameters,
        }
    }

    /// Fetch a parameter by name.
    pub fn param(&self, name: &str) -> Option<&serde_json::Value> {
        self.parameters.get(name)
    }
}

/// A worker that owns one capability.
///
/// Agents never touch task state: they return a value or fail, and the
/// orchestrator records the outcome.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Perform the requested operation.
    async fn process(&self, call: AgentCall) -> HearthResult<serde_json::Value>;
}

/// Adapts an async closure into an [`Agent`].
pub struct FnAgent<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnAgent<F, Fut>
where
    F: Fn(AgentCall) -> Fut + Send + Sync,
    Fut: Future<Output = HearthResult<serde_json::Value>> + Send,
{
    /// Wrap `f` as an agent.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _fut: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> Agent for FnAgent<F, Fut>
where
    F: Fn(AgentCall) -> Fut + Send + Sync,
    Fut: Future<Output = HearthResult<serde_json::Value>> + Send,
{
    async fn process(&self, call: AgentCall) -> HearthResult<serde_json::Value> {
        (self.f)(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::HearthError;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_agent_echoes_operation() {
        let agent = FnAgent::new(|call: AgentCall| async move {
            Ok::<_, HearthError>(json!({ "op": call.operation, "priority": call.priority }))
        });

        let out = agent
            .process(AgentCall::new("brew", Priority::High, Parameters::new()))
            .await
            .unwrap();
        assert_eq!(out["op"], "brew");
        assert_eq!(out["priority"], "high");
    }

    #[tokio::test]
    async fn test_fn_agent_propagates_failure() {
        let agent = FnAgent::new(|_call: AgentCall| async move {
            Err::<serde_json::Value, _>(HearthError::agent("kettle offline"))
        });

        let err = agent
            .process(AgentCall::new("brew", Priority::Normal, Parameters::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("kettle offline"));
    }

    #[test]
    fn test_param_lookup() {
        let mut params = Parameters::new();
        params.insert("brightness".into(), json!(70));
        let call = AgentCall::new("adjust", Priority::Normal, params);
        assert_eq!(call.param("brightness"), Some(&json!(70)));
        assert!(call.param("missing").is_none());
    }
}
