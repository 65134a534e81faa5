//! Compile error types.
//!
//! Every phase of the compiler reports failure through [`CompileError`] and
//! propagates it with `?`. There is no recovery: the first error aborts the
//! compilation and the driver prints it to stderr.

use crate::scanner::Pos;

/// Error type shared by all compiler phases.
#[derive(Debug)]
pub enum CompileError {
    /// A diagnostic anchored to a source position, rendered `line:col: message`.
    Source { pos: Pos, message: String },
    /// A fixed-limit overflow (temp stack, locals region, scope depth, field
    /// count). These diagnostics carry no source position.
    Limit(String),
    /// A formatting error while writing assembly text.
    Format(std::fmt::Error),
}

impl CompileError {
    /// Build a positioned diagnostic.
    pub fn at(pos: Pos, message: impl Into<String>) -> Self {
        CompileError::Source {
            pos,
            message: message.into(),
        }
    }

    /// Build a limit-overflow diagnostic.
    pub fn limit(message: impl Into<String>) -> Self {
        CompileError::Limit(message.into())
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Source { pos, message } => {
                write!(f, "{}:{}: {}", pos.line, pos.col, message)
            }
            CompileError::Limit(message) => write!(f, "{}", message),
            CompileError::Format(e) => write!(f, "assembly generation error: {}", e),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<std::fmt::Error> for CompileError {
    fn from(e: std::fmt::Error) -> Self {
        CompileError::Format(e)
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
