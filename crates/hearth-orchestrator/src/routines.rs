use crate::types::Task;
use hearth_core::{HearthError, HearthResult, Parameters, Priority};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// A task to create when a routine runs.
///
/// String parameter values of the form `"{{name}}"` are replaced by the
/// context value `name`; `"{{name?}}"` becomes `null` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    /// Name the task's result is reported under.
    pub key: String,
    /// Dot-qualified task kind.
    pub kind: String,
    /// Priority of the created task.
    #[serde(default)]
    pub priority: Priority,
    /// Parameters, possibly holding placeholders.
    #[serde(default)]
    pub parameters: Parameters,
}

impl TaskTemplate {
    /// Template with no parameters.
    pub fn new(key: impl Into<String>, kind: impl Into<String>, priority: Priority) -> Self {
        Self {
            key: key.into(),
            kind: kind.into(),
            priority,
            parameters: Parameters::new(),
        }
    }

    /// Add a parameter (literal or placeholder).
    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Capability prefix of the kind.
    pub fn capability(&self) -> &str {
        self.kind
            .split_once('.')
            .map_or(self.kind.as_str(), |(capability, _)| capability)
    }

    /// Create a pending task with placeholders filled from `context`.
    pub fn instantiate(&self, routine: &str, context: &Parameters) -> HearthResult<Task> {
        let mut parameters = Parameters::new();
        for (name, value) in &self.parameters {
            parameters.insert(name.clone(), substitute(value, routine, context)?);
        }
        Ok(Task::new(self.kind.clone(), parameters, self.priority))
    }
}

fn substitute(value: &Value, routine: &str, context: &Parameters) -> HearthResult<Value> {
    match value {
        Value::String(s) => {
            let Some(inner) = s.strip_prefix("{{").and_then(|rest| rest.strip_suffix("}}")) else {
                return Ok(value.clone());
            };
            let inner = inner.trim();
            let (name, optional) = match inner.strip_suffix('?') {
                Some(name) => (name.trim(), true),
                None => (inner, false),
            };
            match context.get(name) {
                Some(found) => Ok(found.clone()),
                None if optional => Ok(Value::Null),
                None => Err(HearthError::MissingContext {
                    routine: routine.to_string(),
                    key: name.to_string(),
                }),
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| substitute(item, routine, context))
            .collect::<HearthResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(fields) => {
            let mut out = serde_json::Map::new();
            for (k, v) in fields {
                out.insert(k.clone(), substitute(v, routine, context)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Dependency structure of a routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RoutineShape {
    /// All tasks run concurrently with no ordering between them.
    IndependentGroup {
        /// Tasks to run.
        tasks: Vec<TaskTemplate>,
    },
    /// Gates run first; the dependent group runs only if every gate succeeds
    /// (and, when `condition` is set, every gate result has that field
    /// set to `true`).
    GatedChain {
        /// Tasks that run first.
        gates: Vec<TaskTemplate>,
        /// Boolean field every gate result must set to `true`.
        #[serde(default)]
        condition: Option<String>,
        /// Tasks that run once the gates pass.
        then: Vec<TaskTemplate>,
    },
}

/// A named, statically declared composition of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineDefinition {
    /// Name the routine is run by.
    pub name: String,
    /// Human-readable summary.
    #[serde(default)]
    pub description: String,
    /// Task structure.
    #[serde(flatten)]
    pub shape: RoutineShape,
}

impl RoutineDefinition {
    /// Routine whose tasks all run concurrently.
    pub fn independent(name: impl Into<String>, tasks: Vec<TaskTemplate>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            shape: RoutineShape::IndependentGroup { tasks },
        }
    }

    /// Routine with gate tasks guarding a dependent group.
    pub fn gated(
        name: impl Into<String>,
        gates: Vec<TaskTemplate>,
        condition: Option<&str>,
        then: Vec<TaskTemplate>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            shape: RoutineShape::GatedChain {
                gates,
                condition: condition.map(str::to_string),
                then,
            },
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Every template, gates first.
    pub fn templates(&self) -> Vec<&TaskTemplate> {
        match &self.shape {
            RoutineShape::IndependentGroup { tasks } => tasks.iter().collect(),
            RoutineShape::GatedChain { gates, then, .. } => gates.iter().chain(then).collect(),
        }
    }

    /// Reject definitions that cannot run: empty names or groups, blank
    /// kinds, duplicate result keys.
    pub fn validate(&self) -> HearthResult<()> {
        if self.name.trim().is_empty() {
            return Err(HearthError::Config("routine name must not be empty".into()));
        }
        match &self.shape {
            RoutineShape::IndependentGroup { tasks } if tasks.is_empty() => {
                return Err(HearthError::Config(format!(
                    "routine '{}' has no tasks",
                    self.name
                )));
            }
            RoutineShape::GatedChain { gates, then, .. } if gates.is_empty() || then.is_empty() => {
                return Err(HearthError::Config(format!(
                    "gated routine '{}' needs at least one gate and one dependent task",
                    self.name
                )));
            }
            _ => {}
        }

        let mut keys = HashSet::new();
        for template in self.templates() {
            if template.kind.trim().is_empty() {
                return Err(HearthError::Config(format!(
                    "routine '{}' task '{}' has an empty kind",
                    self.name, template.key
                )));
            }
            if !keys.insert(template.key.as_str()) {
                return Err(HearthError::Config(format!(
                    "routine '{}' reuses task key '{}'",
                    self.name, template.key
                )));
            }
        }
        Ok(())
    }
}

/// The set of routines an orchestrator can run, by name.
#[derive(Debug, Clone, Default)]
pub struct RoutineBook {
    routines: HashMap<String, RoutineDefinition>,
}

impl RoutineBook {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Book holding the built-in routines.
    pub fn builtin() -> Self {
        let mut book = Self::new();
        for routine in builtin_routines() {
            book.routines.insert(routine.name.clone(), routine);
        }
        book
    }

    /// Validate and add `routine`, replacing any routine of the same name.
    pub fn insert(&mut self, routine: RoutineDefinition) -> HearthResult<()> {
        routine.validate()?;
        self.routines.insert(routine.name.clone(), routine);
        Ok(())
    }

    /// The routine called `name`.
    pub fn get(&self, name: &str) -> HearthResult<&RoutineDefinition> {
        self.routines
            .get(name)
            .ok_or_else(|| HearthError::UnknownRoutine(name.to_string()))
    }

    /// Routine names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of routines.
    pub fn len(&self) -> usize {
        self.routines.len()
    }

    /// Whether the book holds no routines.
    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

/// Routines shipped with the device.
pub fn builtin_routines() -> Vec<RoutineDefinition> {
    vec![morning_routine(), travel_disruption(), stress_relief()]
}

fn morning_routine() -> RoutineDefinition {
    RoutineDefinition::independent(
        "morning_routine",
        vec![
            TaskTemplate::new("lighting", "home.lights", Priority::Normal)
                .with_param("action", json!("adjust"))
                .with_param("brightness", json!(70))
                .with_param("sleep_quality", json!("{{sleep_quality?}}")),
            TaskTemplate::new("coffee", "home.coffee_maker", Priority::High)
                .with_param("action", json!("brew")),
            TaskTemplate::new("temperature", "home.thermostat", Priority::Normal)
                .with_param("weather", json!("{{weather?}}")),
            TaskTemplate::new("blinds", "home.blinds", Priority::Low)
                .with_param("action", json!("open"))
                .with_param("gradual", json!(true)),
            TaskTemplate::new("news", "communication.news", Priority::Normal)
                .with_param("categories", json!(["tech", "business"]))
                .with_param("calendar_events", json!("{{calendar_events?}}")),
            TaskTemplate::new("calendar", "calendar.summary", Priority::Normal)
                .with_param("events", json!("{{calendar_events?}}")),
            TaskTemplate::new("sleep", "wellness.sleep_analysis", Priority::Low)
                .with_param("night_data", json!("{{sleep_data?}}")),
        ],
    )
    .with_description("Wake-up flow: home, briefing and sleep review in parallel")
}

fn travel_disruption() -> RoutineDefinition {
    RoutineDefinition::gated(
        "travel_disruption",
        vec![
            TaskTemplate::new("disruption", "travel.disruption_detector", Priority::Critical)
                .with_param("trip_data", json!("{{trip_data}}")),
        ],
        Some("is_disrupted"),
        vec![
            TaskTemplate::new("new_route", "travel.route_optimizer", Priority::Critical)
                .with_param("current_location", json!("{{location}}"))
                .with_param("destination", json!("{{destination}}")),
            TaskTemplate::new("notifications", "communication.contact_notifier", Priority::High)
                .with_param("contacts", json!("{{notify_contacts}}"))
                .with_param("message", json!("Running late")),
        ],
    )
    .with_description("Reroute and notify contacts when a trip is disrupted")
}

fn stress_relief() -> RoutineDefinition {
    RoutineDefinition::gated(
        "stress_relief",
        vec![
            TaskTemplate::new("stress", "wellness.stress_check", Priority::High)
                .with_param("sensor_data", json!("{{sensor_data}}")),
        ],
        Some("intervention_needed"),
        vec![
            TaskTemplate::new("lighting", "home.lights", Priority::Normal)
                .with_param("action", json!("scene"))
                .with_param("scene", json!("calm"))
                .with_param("brightness", json!(40)),
            TaskTemplate::new("notification", "communication.notify", Priority::Normal)
                .with_param("title", json!("Time for a breather"))
                .with_param("suggestion", json!("{{suggestion?}}")),
        ],
    )
    .with_description("Calm the room and suggest a break when stress runs high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    fn context(pairs: &[(&str, Value)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_builtin_routines_are_valid() {
        let book = RoutineBook::builtin();
        assert_eq!(
            book.names(),
            vec!["morning_routine", "stress_relief", "travel_disruption"]
        );
        for routine in builtin_routines() {
            routine.validate().unwrap();
        }
    }

    #[test]
    fn test_unknown_routine() {
        let book = RoutineBook::builtin();
        assert!(matches!(
            book.get("evening_routine"),
            Err(HearthError::UnknownRoutine(ref n)) if n == "evening_routine"
        ));
    }

    #[test]
    fn test_instantiate_substitutes_context() {
        let template = TaskTemplate::new("new_route", "travel.route_optimizer", Priority::Critical)
            .with_param("current_location", json!("{{location}}"))
            .with_param("stops", json!(["{{ location }}", "home"]))
            .with_param("meta", json!({"note": "{{note?}}", "fixed": 3}));

        let task = template
            .instantiate("travel", &context(&[("location", json!({"lat": 1.5}))]))
            .unwrap();

        assert_eq!(task.kind(), "travel.route_optimizer");
        assert_eq!(task.priority(), Priority::Critical);
        assert_eq!(task.status(), TaskStatus::Pending);
        let params = task.parameters();
        assert_eq!(params["current_location"], json!({"lat": 1.5}));
        assert_eq!(params["stops"], json!([{"lat": 1.5}, "home"]));
        assert_eq!(params["meta"], json!({"note": null, "fixed": 3}));
    }

    #[test]
    fn test_missing_required_context() {
        let template = TaskTemplate::new("gate", "travel.disruption_detector", Priority::Critical)
            .with_param("trip_data", json!("{{trip_data}}"));
        let err = template.instantiate("travel_disruption", &Parameters::new()).unwrap_err();
        assert!(matches!(
            err,
            HearthError::MissingContext { ref routine, ref key }
                if routine == "travel_disruption" && key == "trip_data"
        ));
    }

    #[test]
    fn test_plain_strings_pass_through() {
        let template = TaskTemplate::new("n", "communication.notify", Priority::Low)
            .with_param("message", json!("Running {{late}"));
        let task = template.instantiate("r", &Parameters::new()).unwrap();
        assert_eq!(task.parameters()["message"], "Running {{late}");
    }

    #[test]
    fn test_validation_rejects_bad_definitions() {
        let empty = RoutineDefinition::independent("empty", vec![]);
        assert!(empty.validate().is_err());

        let dup = RoutineDefinition::independent(
            "dup",
            vec![
                TaskTemplate::new("a", "home.lights", Priority::Normal),
                TaskTemplate::new("a", "home.blinds", Priority::Normal),
            ],
        );
        assert!(dup.validate().is_err());

        let no_dependents = RoutineDefinition::gated(
            "gate_only",
            vec![TaskTemplate::new("g", "travel.check", Priority::High)],
            None,
            vec![],
        );
        let mut book = RoutineBook::new();
        assert!(book.insert(no_dependents).is_err());
        assert!(book.is_empty());
    }

    #[test]
    fn test_insert_replaces_by_name() {
        let mut book = RoutineBook::builtin();
        let before = book.len();
        let replacement = RoutineDefinition::independent(
            "morning_routine",
            vec![TaskTemplate::new("coffee", "home.coffee_maker", Priority::High)],
        );
        book.insert(replacement).unwrap();
        assert_eq!(book.len(), before);
        assert_eq!(book.get("morning_routine").unwrap().templates().len(), 1);
    }

    #[test]
    fn test_definition_serde_shape_tag() {
        let routine = travel_disruption();
        let json = serde_json::to_value(&routine).unwrap();
        assert_eq!(json["shape"], "gated_chain");
        assert_eq!(json["condition"], "is_disrupted");
        let parsed: RoutineDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, routine);
    }
}
