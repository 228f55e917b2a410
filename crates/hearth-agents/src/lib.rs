//! The agent contract and the capability registry.
//!
//! Every external collaborator (sensing analysis, device control,
//! communication, data sources, inference) implements [`Agent`] and is bound
//! to a capability name in an [`AgentRegistry`].

/// The `Agent` trait and its call envelope.
pub mod agent;
/// Capability name → agent binding table.
pub mod registry;

pub use agent::{Agent, AgentCall, FnAgent};
pub use registry::AgentRegistry;
