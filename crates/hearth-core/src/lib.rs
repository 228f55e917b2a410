//! Core types and error definitions for Hearth.
//!
//! Everything shared by the agent registry, the inference engine and the
//! orchestrator lives here so the other crates agree on one error type and
//! one notion of priority.
//!
//! # Main types
//!
//! - [`HearthError`] — Unified error enum for all Hearth subsystems.
//! - [`HearthResult`] — Convenience alias for `Result<T, HearthError>`.
//! - [`Priority`] — Four-tier urgency shared by tasks and inference requests.
//! - [`Parameters`] — Opaque key-value payload handed to agents.

/// Error taxonomy shared across crates.
pub mod error;

pub use error::{HearthError, HearthResult};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key-value payload carried by a task and handed to its agent.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Urgency of a task or inference request.
///
/// Ordering follows rank: `Critical < High < Normal < Low`, so the smallest
/// value is the most urgent one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Must run before anything else (safety, travel disruption).
    Critical,
    /// User-facing work that should not wait behind routine jobs.
    High,
    /// Default tier.
    #[default]
    Normal,
    /// Background work; first to be throttled on low battery.
    Low,
}

impl Priority {
    /// All tiers, most urgent first.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Numeric rank, 1 for critical through 4 for low.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 1,
            Priority::High => 2,
            Priority::Normal => 3,
            Priority::Low => 4,
        }
    }

    /// Whether `self` should be serviced before `other`.
    pub fn is_more_urgent_than(self, other: Priority) -> bool {
        self < other
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = HearthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(HearthError::Config(format!("Unknown priority: {other}"))),
        }
    }
}
