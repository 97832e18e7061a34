use std::path::Path;

use serde::{Deserialize, Serialize};

/// Compiler settings read from `koral.toml`.
///
/// Every section and field is optional; missing values fall back to the
/// defaults below.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub inference: InferenceConfig,
    pub monomorphization: MonoConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Settings for the constraint solver.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// How many times a trait-bound constraint whose subject still contains
    /// type variables is pushed back onto the queue before it is set aside
    /// until defaulting has run.
    pub trait_bound_requeues: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            trait_bound_requeues: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonoConfig {
    /// Upper bound on nested instantiation depth. Exceeding it aborts
    /// monomorphization (runaway polymorphic recursion).
    pub max_recursion_depth: usize,
}

impl Default for MonoConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub color: bool,
}

impl CompilerConfig {
    /// Read and parse a `koral.toml` file.
    pub fn from_file(path: &Path) -> Result<CompilerConfig, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_str(&content)
    }

    /// Parse a configuration from TOML text.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<CompilerConfig, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {}", e))
    }
}
