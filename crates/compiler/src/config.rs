//! Compiler configuration
//!
//! Options that change how the compiler renders its output without changing
//! the instructions it emits. Loadable from a TOML file via the CLI's
//! `--config` flag; every field has a default.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Annotate the emitted assembly with `; ...` comments (spill markers,
    /// address-of names). Instructions are identical either way.
    pub asm_comments: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig { asm_comments: true }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse compiler config: {}", e))
    }

    /// Toggle assembly comments (builder pattern).
    pub fn with_asm_comments(mut self, asm_comments: bool) -> Self {
        self.asm_comments = asm_comments;
        self
    }
}
