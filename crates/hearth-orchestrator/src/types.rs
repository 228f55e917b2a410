use chrono::{DateTime, Utc};
use hearth_core::{HearthError, HearthResult, Parameters, Priority};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a task.
///
/// `Pending → Running → {Completed, Failed}`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet dispatched.
    Pending,
    /// Handed to its agent.
    Running,
    /// The agent returned a result.
    Completed,
    /// The agent returned an error.
    Failed,
}

impl TaskStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Structured description of why a task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Capability whose agent failed.
    pub capability: String,
    /// Stable error kind, e.g. `inference_error`.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl TaskFailure {
    /// Describe `error` raised while serving `capability`.
    pub fn from_error(capability: impl Into<String>, error: &HearthError) -> Self {
        Self {
            capability: capability.into(),
            kind: error.kind().to_string(),
            message: error.root_cause().to_string(),
        }
    }
}

/// What a finished task produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Value returned by the agent.
    Success(serde_json::Value),
    /// Failure raised by the agent.
    Failure(TaskFailure),
}

/// One unit of work addressed to a capability.
///
/// `kind`, `parameters` and `priority` are fixed at creation; only the
/// orchestrator moves a task through its lifecycle.
#[derive(Debug, Serialize)]
pub struct Task {
    id: Uuid,
    kind: String,
    parameters: Parameters,
    priority: Priority,
    status: TaskStatus,
    result: Option<TaskOutcome>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A pending task of `kind` (`"<capability>.<operation>"`).
    pub fn new(kind: impl Into<String>, parameters: Parameters, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            parameters,
            priority,
            status: TaskStatus::Pending,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Unique task id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Dot-qualified kind, e.g. `home.lights`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Text before the first `.` of the kind (the whole kind if there is none).
    pub fn capability(&self) -> &str {
        self.kind
            .split_once('.')
            .map_or(self.kind.as_str(), |(capability, _)| capability)
    }

    /// Text after the first `.` of the kind (empty if there is none).
    pub fn operation(&self) -> &str {
        self.kind.split_once('.').map_or("", |(_, operation)| operation)
    }

    /// Payload handed to the agent.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Urgency the task was submitted with.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Current lifecycle state.
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Outcome, set once the task is terminal.
    pub fn result(&self) -> Option<&TaskOutcome> {
        self.result.as_ref()
    }

    /// When the task was built.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the task was dispatched.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the task reached a terminal state.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Time between dispatch and the terminal transition.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some(u64::try_from((finished - started).num_milliseconds()).unwrap_or(0))
    }

    fn transition(&mut self, from: TaskStatus, to: TaskStatus) -> HearthResult<()> {
        if self.status != from {
            return Err(HearthError::InvalidTransition {
                task_id: self.id,
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    pub(crate) fn mark_running(&mut self) -> HearthResult<()> {
        self.transition(TaskStatus::Pending, TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn complete(&mut self, value: serde_json::Value) -> HearthResult<()> {
        self.transition(TaskStatus::Running, TaskStatus::Completed)?;
        self.result = Some(TaskOutcome::Success(value));
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn fail(&mut self, failure: TaskFailure) -> HearthResult<()> {
        self.transition(TaskStatus::Running, TaskStatus::Failed)?;
        self.result = Some(TaskOutcome::Failure(failure));
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(kind: &str) -> Task {
        Task::new(kind, Parameters::new(), Priority::Normal)
    }

    #[test]
    fn test_task_creation() {
        let t = task("home.coffee_maker");
        assert_eq!(t.status(), TaskStatus::Pending);
        assert!(t.result().is_none());
        assert!(t.started_at().is_none());
        assert_eq!(t.priority(), Priority::Normal);
    }

    #[test]
    fn test_capability_prefix() {
        let t = task("travel.route_optimizer");
        assert_eq!(t.capability(), "travel");
        assert_eq!(t.operation(), "route_optimizer");

        let nested = task("home.lights.kitchen");
        assert_eq!(nested.capability(), "home");
        assert_eq!(nested.operation(), "lights.kitchen");

        let bare = task("calendar");
        assert_eq!(bare.capability(), "calendar");
        assert_eq!(bare.operation(), "");
    }

    #[test]
    fn test_success_lifecycle() {
        let mut t = task("home.lights");
        t.mark_running().unwrap();
        assert_eq!(t.status(), TaskStatus::Running);
        assert!(!t.status().is_terminal());

        t.complete(json!({"brightness": 70})).unwrap();
        assert_eq!(t.status(), TaskStatus::Completed);
        assert!(t.status().is_terminal());
        assert_eq!(
            t.result(),
            Some(&TaskOutcome::Success(json!({"brightness": 70})))
        );
        assert!(t.duration_ms().is_some());
    }

    #[test]
    fn test_failure_lifecycle() {
        let mut t = task("home.lights");
        t.mark_running().unwrap();
        let failure = TaskFailure::from_error("home", &HearthError::agent("bulb offline"));
        t.fail(failure).unwrap();

        assert_eq!(t.status(), TaskStatus::Failed);
        match t.result() {
            Some(TaskOutcome::Failure(f)) => {
                assert_eq!(f.kind, "agent_execution_error");
                assert!(f.message.contains("bulb offline"));
                assert_eq!(f.capability, "home");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_no_skipped_or_repeated_transitions() {
        let mut t = task("home.lights");
        assert!(matches!(
            t.complete(json!(null)),
            Err(HearthError::InvalidTransition { .. })
        ));

        t.mark_running().unwrap();
        assert!(t.mark_running().is_err());

        t.complete(json!(1)).unwrap();
        assert!(t.fail(TaskFailure::from_error("home", &HearthError::agent("late"))).is_err());
        assert_eq!(t.result(), Some(&TaskOutcome::Success(json!(1))));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = TaskOutcome::Failure(TaskFailure {
            capability: "travel".into(),
            kind: "agent_execution_error".into(),
            message: "no route".into(),
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "failure");
        assert_eq!(json["value"]["message"], "no route");
        let parsed: TaskOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, outcome);
    }
}
