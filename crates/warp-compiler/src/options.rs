//! Compiler configuration.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};

/// Options for one compilation.
///
/// Every field has a default, so a partial JSON object is a valid
/// configuration:
///
/// ```
/// use warp_compiler::CompileOptions;
///
/// let options = CompileOptions::from_json(r#"{ "module_name": "fib" }"#).unwrap();
/// assert_eq!(options.module_name, "fib");
/// assert!(options.untyped_literals);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Name of the emitted `pub mod` and of the frames in traces.
    pub module_name: String,

    /// Require an exported `_start: [] -> []` (WASI command mode).
    pub command: bool,

    /// Print constants in argument position without a width suffix.
    pub untyped_literals: bool,

    /// Path through which generated code names the runtime crate.
    pub runtime_path: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            module_name: "module".to_string(),
            command: false,
            untyped_literals: true,
            runtime_path: "warp_exec".to_string(),
        }
    }
}

impl CompileOptions {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> CompileResult<Self> {
        serde_json::from_str(json).map_err(|e| CompileError::InvalidOptions(e.to_string()))
    }

    pub fn command(mut self, command: bool) -> Self {
        self.command = command;
        self
    }

    pub fn untyped_literals(mut self, enabled: bool) -> Self {
        self.untyped_literals = enabled;
        self
    }
}
