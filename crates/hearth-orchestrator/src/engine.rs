use crate::monitor::AgentMonitor;
use crate::routines::{RoutineBook, RoutineDefinition, RoutineShape, TaskTemplate};
use crate::types::{Task, TaskFailure, TaskOutcome, TaskStatus};
use futures_util::stream::{FuturesUnordered, StreamExt};
use hearth_agents::{AgentCall, AgentRegistry};
use hearth_core::{HearthError, HearthResult, Parameters, Priority};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// How a routine ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineStatus {
    /// Every dispatched task completed.
    Completed,
    /// At least one task of an unconditional group failed.
    Failed,
    /// A gate task failed; dependents were not dispatched.
    FailedAtGate,
    /// Gates succeeded but reported that the dependents are not needed.
    ConditionNotMet,
}

impl fmt::Display for RoutineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoutineStatus::Completed => "completed",
            RoutineStatus::Failed => "failed",
            RoutineStatus::FailedAtGate => "failed_at_gate",
            RoutineStatus::ConditionNotMet => "condition_not_met",
        };
        f.write_str(s)
    }
}

/// Terminal state of one task dispatched by a routine.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    /// Template key the task was created from.
    pub key: String,
    /// Id of the dispatched task.
    pub task_id: Uuid,
    /// Dot-qualified task kind.
    pub kind: String,
    /// Priority the task ran at.
    pub priority: Priority,
    /// Terminal status.
    pub status: TaskStatus,
    /// Result or failure record.
    pub outcome: Option<TaskOutcome>,
    /// Execution time.
    pub duration_ms: Option<u64>,
}

impl TaskReport {
    fn new(key: &str, task: &Task) -> Self {
        Self {
            key: key.to_string(),
            task_id: task.id(),
            kind: task.kind().to_string(),
            priority: task.priority(),
            status: task.status(),
            outcome: task.result().cloned(),
            duration_ms: task.duration_ms(),
        }
    }
}

/// The failure that decided a routine's status.
#[derive(Debug, Clone, Serialize)]
pub struct FailedTask {
    /// Template key of the failed task.
    pub key: String,
    /// Id of the failed task.
    pub task_id: Uuid,
    /// Dot-qualified kind of the failed task.
    pub task_kind: String,
    /// What the agent reported.
    pub failure: TaskFailure,
}

/// Everything a routine run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RoutineReport {
    /// Name of the routine that ran.
    pub routine: String,
    /// Overall outcome.
    pub status: RoutineStatus,
    /// Successful results keyed by template key.
    pub results: Parameters,
    /// Every dispatched task in declaration order.
    pub tasks: Vec<TaskReport>,
    /// Keys of dependents that were never dispatched.
    pub skipped: Vec<String>,
    /// First failure in completion order.
    pub first_error: Option<FailedTask>,
    /// Wall-clock time of the whole run.
    pub duration_ms: u64,
}

impl RoutineReport {
    /// True unless a task failed. A gate condition that was not met is a
    /// normal outcome.
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            RoutineStatus::Completed | RoutineStatus::ConditionNotMet
        )
    }

    /// The report for the task created from template `key`.
    pub fn task(&self, key: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.key == key)
    }

    /// The report itself, or [`HearthError::RoutineFailed`] describing its
    /// first failure.
    pub fn into_result(self) -> HearthResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        match &self.first_error {
            Some(failed) => Err(HearthError::RoutineFailed {
                routine: self.routine.clone(),
                task: failed.key.clone(),
                cause_kind: failed.failure.kind.clone(),
                message: failed.failure.message.clone(),
            }),
            None => Err(HearthError::RoutineFailed {
                routine: self.routine.clone(),
                task: String::new(),
                cause_kind: "unknown".into(),
                message: format!("routine ended with status {}", self.status),
            }),
        }
    }
}

type Group = Vec<(String, Task)>;

/// Routes tasks to agents by capability and runs routines.
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    routines: RoutineBook,
    monitor: Arc<AgentMonitor>,
}

impl Orchestrator {
    /// Orchestrator dispatching to `registry` and running `routines`.
    pub fn new(registry: Arc<AgentRegistry>, routines: RoutineBook) -> Self {
        Self {
            registry,
            routines,
            monitor: Arc::new(AgentMonitor::new()),
        }
    }

    /// Orchestrator with the built-in routines.
    pub fn with_builtin_routines(registry: Arc<AgentRegistry>) -> Self {
        Self::new(registry, RoutineBook::builtin())
    }

    /// Per-capability counters.
    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        &self.monitor
    }

    /// Routines this orchestrator can run.
    pub fn routines(&self) -> &RoutineBook {
        &self.routines
    }

    /// Capability bindings.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Run one task on the agent bound to its capability.
    ///
    /// A task whose capability has no agent stays `Pending`. Agent failures
    /// leave the task `Failed` and come back as
    /// [`HearthError::AgentExecution`].
    pub async fn execute_task(&self, task: &mut Task) -> HearthResult<Value> {
        let capability = task.capability().to_string();
        let agent = self.registry.resolve(&capability)?;
        task.mark_running()?;
        self.monitor.start_task(&capability, task.id());

        info!(
            task_id = %task.id(),
            kind = %task.kind(),
            priority = %task.priority(),
            "Dispatching task"
        );

        let call = AgentCall {
            task_id: task.id(),
            operation: task.operation().to_string(),
            priority: task.priority(),
            parameters: task.parameters().clone(),
        };

        match agent.process(call).await {
            Ok(value) => {
                task.complete(value.clone())?;
                let duration_ms = task.duration_ms().unwrap_or(0);
                self.monitor.finish_task(&capability, duration_ms, true);
                info!(task_id = %task.id(), kind = %task.kind(), duration_ms, "Task completed");
                Ok(value)
            }
            Err(e) => {
                task.fail(TaskFailure::from_error(&capability, &e))?;
                let duration_ms = task.duration_ms().unwrap_or(0);
                self.monitor.finish_task(&capability, duration_ms, false);
                warn!(
                    task_id = %task.id(),
                    kind = %task.kind(),
                    error_kind = e.kind(),
                    error = %e,
                    "Task failed"
                );
                Err(HearthError::AgentExecution {
                    task_id: task.id(),
                    kind: task.kind().to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Build a task and run it.
    pub async fn submit(
        &self,
        kind: impl Into<String>,
        parameters: Parameters,
        priority: Priority,
    ) -> HearthResult<Value> {
        let mut task = Task::new(kind, parameters, priority);
        self.execute_task(&mut task).await
    }

    /// Run the routine called `name` with `context` filling its placeholders.
    ///
    /// Every capability is resolved and every template instantiated before
    /// anything is dispatched, so a lookup or context error starts no work.
    pub async fn execute_routine(
        &self,
        name: &str,
        context: &Parameters,
    ) -> HearthResult<RoutineReport> {
        let start = Instant::now();
        let routine = self.routines.get(name)?;
        for template in routine.templates() {
            self.registry.resolve(template.capability())?;
        }

        info!(routine = %name, "Starting routine");

        let mut report = match &routine.shape {
            RoutineShape::IndependentGroup { tasks } => {
                let mut group = instantiate(routine, tasks, context)?;
                let failed = self.run_group(&mut group).await;
                let status = if failed.is_some() {
                    RoutineStatus::Failed
                } else {
                    RoutineStatus::Completed
                };
                let mut report = RoutineReport::empty(name, status);
                report.record(&group, failed);
                report
            }
            RoutineShape::GatedChain {
                gates,
                condition,
                then,
            } => {
                let mut gate_group = instantiate(routine, gates, context)?;
                let mut dependents = instantiate(routine, then, context)?;

                let gate_failed = self.run_group(&mut gate_group).await;
                if gate_failed.is_some() {
                    let mut report = RoutineReport::empty(name, RoutineStatus::FailedAtGate);
                    report.record(&gate_group, gate_failed);
                    report.skip(&dependents);
                    report
                } else if !condition_met(&gate_group, condition.as_deref()) {
                    info!(
                        routine = %name,
                        condition = condition.as_deref().unwrap_or_default(),
                        "Gate condition not met, skipping dependents"
                    );
                    let mut report = RoutineReport::empty(name, RoutineStatus::ConditionNotMet);
                    report.record(&gate_group, None);
                    report.skip(&dependents);
                    report
                } else {
                    let failed = self.run_group(&mut dependents).await;
                    let status = if failed.is_some() {
                        RoutineStatus::Failed
                    } else {
                        RoutineStatus::Completed
                    };
                    let mut report = RoutineReport::empty(name, status);
                    report.record(&gate_group, None);
                    report.record(&dependents, failed);
                    report
                }
            }
        };

        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            routine = %name,
            status = %report.status,
            tasks = report.tasks.len(),
            duration_ms = report.duration_ms,
            "Routine finished"
        );
        Ok(report)
    }

    /// Dispatch every task of `group` at once and wait for all of them.
    /// Returns the index of the first task to fail.
    async fn run_group(&self, group: &mut Group) -> Option<usize> {
        let mut running: FuturesUnordered<_> = group
            .iter_mut()
            .enumerate()
            .map(|(index, (_, task))| async move { (index, self.execute_task(task).await) })
            .collect();

        let mut first_failure = None;
        while let Some((index, result)) = running.next().await {
            if result.is_err() && first_failure.is_none() {
                first_failure = Some(index);
            }
        }
        first_failure
    }
}

impl RoutineReport {
    fn empty(routine: &str, status: RoutineStatus) -> Self {
        Self {
            routine: routine.to_string(),
            status,
            results: Parameters::new(),
            tasks: Vec::new(),
            skipped: Vec::new(),
            first_error: None,
            duration_ms: 0,
        }
    }

    fn record(&mut self, group: &Group, failed: Option<usize>) {
        for (key, task) in group {
            if let Some(TaskOutcome::Success(value)) = task.result() {
                self.results.insert(key.clone(), value.clone());
            }
            self.tasks.push(TaskReport::new(key, task));
        }
        if let Some((key, task)) = failed.and_then(|index| group.get(index)) {
            if let Some(TaskOutcome::Failure(failure)) = task.result() {
                self.first_error = Some(FailedTask {
                    key: key.clone(),
                    task_id: task.id(),
                    task_kind: task.kind().to_string(),
                    failure: failure.clone(),
                });
            }
        }
    }

    fn skip(&mut self, group: &Group) {
        self.skipped.extend(group.iter().map(|(key, _)| key.clone()));
    }
}

fn instantiate(
    routine: &RoutineDefinition,
    templates: &[TaskTemplate],
    context: &Parameters,
) -> HearthResult<Group> {
    templates
        .iter()
        .map(|t| Ok((t.key.clone(), t.instantiate(&routine.name, context)?)))
        .collect()
}

/// Every gate result carries `condition` set to `true`. No condition means
/// gate success is enough.
fn condition_met(gates: &Group, condition: Option<&str>) -> bool {
    let Some(field) = condition else {
        return true;
    };
    gates.iter().all(|(_, task)| match task.result() {
        Some(TaskOutcome::Success(value)) => value.get(field).and_then(Value::as_bool) == Some(true),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_agents::FnAgent;
    use serde_json::json;

    fn registry() -> Arc<AgentRegistry> {
        let mut registry = AgentRegistry::new();
        registry.register(
            "home",
            Arc::new(FnAgent::new(|call: AgentCall| async move {
                Ok::<_, HearthError>(json!({ "op": call.operation }))
            })),
        );
        registry.register(
            "broken",
            Arc::new(FnAgent::new(|_call: AgentCall| async move {
                Err::<Value, _>(HearthError::agent("sensor offline"))
            })),
        );
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_execute_task_success() {
        let orchestrator = Orchestrator::new(registry(), RoutineBook::new());
        let mut task = Task::new("home.lights", Parameters::new(), Priority::Normal);

        let value = orchestrator.execute_task(&mut task).await.unwrap();
        assert_eq!(value, json!({ "op": "lights" }));
        assert_eq!(task.status(), TaskStatus::Completed);
        assert!(task.finished_at().is_some());
    }

    #[tokio::test]
    async fn test_execute_task_failure_is_surfaced() {
        let orchestrator = Orchestrator::new(registry(), RoutineBook::new());
        let mut task = Task::new("broken.read", Parameters::new(), Priority::High);

        let err = orchestrator.execute_task(&mut task).await.unwrap_err();
        assert_eq!(err.kind(), "agent_execution_error");
        assert!(matches!(err, HearthError::AgentExecution { task_id, .. } if task_id == task.id()));
        assert_eq!(task.status(), TaskStatus::Failed);
        match task.result() {
            Some(TaskOutcome::Failure(failure)) => {
                assert_eq!(failure.capability, "broken");
                assert!(failure.message.contains("sensor offline"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_capability_leaves_task_pending() {
        let orchestrator = Orchestrator::new(registry(), RoutineBook::new());
        let mut task = Task::new("garden.water", Parameters::new(), Priority::Low);

        let err = orchestrator.execute_task(&mut task).await.unwrap_err();
        assert!(matches!(err, HearthError::UnknownCapability(ref c) if c == "garden"));
        assert_eq!(task.status(), TaskStatus::Pending);
        assert!(orchestrator.monitor().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_task_runs_only_once() {
        let orchestrator = Orchestrator::new(registry(), RoutineBook::new());
        let mut task = Task::new("home.lights", Parameters::new(), Priority::Normal);
        orchestrator.execute_task(&mut task).await.unwrap();

        let err = orchestrator.execute_task(&mut task).await.unwrap_err();
        assert!(matches!(err, HearthError::InvalidTransition { .. }));
        assert_eq!(
            orchestrator.monitor().get_state("home").unwrap().metrics.dispatched,
            1
        );
    }

    #[tokio::test]
    async fn test_submit() {
        let orchestrator = Orchestrator::new(registry(), RoutineBook::new());
        let value = orchestrator
            .submit("home.blinds", Parameters::new(), Priority::Low)
            .await
            .unwrap();
        assert_eq!(value["op"], "blinds");
    }

    #[test]
    fn test_into_result() {
        let ok = RoutineReport::empty("r", RoutineStatus::ConditionNotMet);
        assert!(ok.into_result().is_ok());

        let mut failed = RoutineReport::empty("r", RoutineStatus::Failed);
        failed.first_error = Some(FailedTask {
            key: "coffee".into(),
            task_id: Uuid::new_v4(),
            task_kind: "home.coffee_maker".into(),
            failure: TaskFailure {
                capability: "home".into(),
                kind: "agent_execution_error".into(),
                message: "no water".into(),
            },
        });
        let err = failed.into_result().unwrap_err();
        assert_eq!(err.kind(), "routine_failed");
        assert!(matches!(err, HearthError::RoutineFailed { ref task, .. } if task == "coffee"));
    }

    #[test]
    fn test_condition_met() {
        let mut ok = Task::new("travel.check", Parameters::new(), Priority::High);
        ok.mark_running().unwrap();
        ok.complete(json!({ "is_disrupted": true })).unwrap();
        let mut no = Task::new("travel.check", Parameters::new(), Priority::High);
        no.mark_running().unwrap();
        no.complete(json!({ "delay": 5 })).unwrap();

        let yes_group = vec![("a".to_string(), ok)];
        let no_group = vec![("b".to_string(), no)];
        assert!(condition_met(&yes_group, Some("is_disrupted")));
        assert!(condition_met(&no_group, None));
        assert!(!condition_met(&no_group, Some("is_disrupted")));
    }
}
