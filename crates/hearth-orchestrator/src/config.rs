use crate::routines::{RoutineBook, RoutineDefinition};
use hearth_core::{HearthError, HearthResult};
use hearth_inference::InferenceConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Device configuration: engine settings plus user-defined routines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HearthConfig {
    /// Inference engine settings.
    #[serde(default)]
    pub inference: InferenceConfig,
    /// Routines added to (or replacing) the built-in set.
    #[serde(default)]
    pub routines: Vec<RoutineDefinition>,
    /// Start from the built-in routines.
    #[serde(default = "default_include_builtin_routines")]
    pub include_builtin_routines: bool,
}

fn default_include_builtin_routines() -> bool {
    true
}

impl Default for HearthConfig {
    fn default() -> Self {
        Self {
            inference: InferenceConfig::default(),
            routines: Vec::new(),
            include_builtin_routines: default_include_builtin_routines(),
        }
    }
}

impl HearthConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> HearthResult<Self> {
        toml::from_str(content)
            .map_err(|e| HearthError::Config(format!("Failed to parse config: {e}")))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> HearthResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HearthError::Config(format!("Failed to read config '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// The routines this configuration makes available, each one validated.
    pub fn routine_book(&self) -> HearthResult<RoutineBook> {
        let mut book = if self.include_builtin_routines {
            RoutineBook::builtin()
        } else {
            RoutineBook::new()
        };
        for routine in &self.routines {
            book.insert(routine.clone())?;
        }
        Ok(book)
    }
}
