use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Counters for one capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMetrics {
    /// Tasks handed to the capability's agent.
    pub dispatched: u64,
    /// Tasks that completed.
    pub completed: u64,
    /// Tasks that failed.
    pub failed: u64,
    /// Sum of execution time of finished tasks.
    pub duration_ms: u64,
}

/// Live view of a capability's workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityState {
    /// Capability name.
    pub capability: String,
    /// Tasks currently running.
    pub in_flight: u32,
    /// Most recently dispatched task.
    pub last_task: Option<Uuid>,
    /// Running totals.
    pub metrics: CapabilityMetrics,
}

impl CapabilityState {
    fn new(capability: &str) -> Self {
        Self {
            capability: capability.to_string(),
            in_flight: 0,
            last_task: None,
            metrics: CapabilityMetrics::default(),
        }
    }
}

/// Tracks dispatch and outcome counts per capability.
///
/// Updates are synchronous so callers never yield while recording.
#[derive(Debug, Default)]
pub struct AgentMonitor {
    states: RwLock<HashMap<String, CapabilityState>>,
}

impl AgentMonitor {
    /// Empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `task_id` was handed to `capability`.
    pub fn start_task(&self, capability: &str, task_id: Uuid) {
        let mut states = self.states.write();
        let state = states
            .entry(capability.to_string())
            .or_insert_with(|| CapabilityState::new(capability));
        state.in_flight += 1;
        state.last_task = Some(task_id);
        state.metrics.dispatched += 1;
    }

    /// Record that a task on `capability` reached a terminal state.
    pub fn finish_task(&self, capability: &str, duration_ms: u64, succeeded: bool) {
        let mut states = self.states.write();
        if let Some(state) = states.get_mut(capability) {
            state.in_flight = state.in_flight.saturating_sub(1);
            state.metrics.duration_ms += duration_ms;
            if succeeded {
                state.metrics.completed += 1;
            } else {
                state.metrics.failed += 1;
            }
        }
    }

    /// All capability states, sorted by name.
    pub fn snapshot(&self) -> Vec<CapabilityState> {
        let mut states: Vec<CapabilityState> = self.states.read().values().cloned().collect();
        states.sort_by(|a, b| a.capability.cmp(&b.capability));
        states
    }

    /// State of one capability, if it has seen a task.
    pub fn get_state(&self, capability: &str) -> Option<CapabilityState> {
        self.states.read().get(capability).cloned()
    }

    /// Totals across every capability.
    pub fn aggregate_metrics(&self) -> CapabilityMetrics {
        self.states
            .read()
            .values()
            .fold(CapabilityMetrics::default(), |mut total, state| {
                total.dispatched += state.metrics.dispatched;
                total.completed += state.metrics.completed;
                total.failed += state.metrics.failed;
                total.duration_ms += state.metrics.duration_ms;
                total
            })
    }

    /// Snapshot and totals as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "capabilities": self.snapshot(),
            "aggregate": self.aggregate_metrics(),
        })
    }
}
