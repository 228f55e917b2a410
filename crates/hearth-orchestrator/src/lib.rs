//! Task routing and routine execution for Hearth.
//!
//! Tasks are routed to agents by the capability prefix of their kind
//! (`"home.lights"` goes to the agent registered as `"home"`). Routines are
//! declared as data: an independent group runs every task at once, a gated
//! chain runs its gate tasks first and the dependents only if the gates pass.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Executes single tasks and named routines.
//! - [`Task`] — A unit of work with a one-way lifecycle.
//! - [`RoutineBook`] — Routine definitions by name, including the built-ins.
//! - [`RoutineReport`] — Per-task outcomes and overall status of a routine run.
//! - [`AgentMonitor`] — Dispatch and outcome counters per capability.
//! - [`HearthConfig`] — TOML configuration for the engine and routines.

/// TOML configuration.
pub mod config;
/// The orchestrator.
pub mod engine;
/// Per-capability counters.
pub mod monitor;
/// Routine definitions and built-ins.
pub mod routines;
/// Tasks and their lifecycle.
pub mod types;

pub use config::HearthConfig;
pub use engine::{FailedTask, Orchestrator, RoutineReport, RoutineStatus, TaskReport};
pub use monitor::{AgentMonitor, CapabilityMetrics, CapabilityState};
pub use routines::{builtin_routines, RoutineBook, RoutineDefinition, RoutineShape, TaskTemplate};
pub use types::{Task, TaskFailure, TaskOutcome, TaskStatus};
