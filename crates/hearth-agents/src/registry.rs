use crate::agent::Agent;
use hearth_core::{HearthError, HearthResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Binds capability names to the single agent that owns each capability.
///
/// Populated once at startup, then shared read-only (behind an `Arc`) with
/// the orchestrator for the rest of the process lifetime.
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Bind `capability` to `agent`. An existing binding is replaced.
    pub fn register(&mut self, capability: impl Into<String>, agent: Arc<dyn Agent>) {
        let capability = capability.into();
        if self.agents.insert(capability.clone(), agent).is_some() {
            warn!(capability = %capability, "Replaced existing agent binding");
        } else {
            info!(capability = %capability, "Registered agent");
        }
    }

    /// Remove a binding, returning the agent that held it.
    pub fn unregister(&mut self, capability: &str) -> Option<Arc<dyn Agent>> {
        self.agents.remove(capability)
    }

    /// The agent bound to `capability`.
    pub fn resolve(&self, capability: &str) -> HearthResult<Arc<dyn Agent>> {
        self.agents
            .get(capability)
            .cloned()
            .ok_or_else(|| HearthError::UnknownCapability(capability.to_string()))
    }

    /// Whether a binding exists for `capability`.
    pub fn contains(&self, capability: &str) -> bool {
        self.agents.contains_key(capability)
    }

    /// Registered capability names, sorted.
    pub fn capabilities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent has been registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
