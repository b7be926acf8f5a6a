//! CF-002: Error taxonomy for registration and resolution.

use thiserror::Error;

/// Errors surfaced by the dataflow core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Rule lookup for a variable nobody produces.
    #[error("no cell produces variable '{0}'")]
    UnknownVariable(String),

    /// A bound value has no canonical byte form.
    #[error("cannot fingerprint variable '{variable}': {reason}")]
    Unfingerprintable { variable: String, reason: String },

    /// Expansion or resolution stopped making progress.
    #[error("dependency cycle detected at '{variable}' in path: {path}")]
    DependencyCycle { variable: String, path: String },

    /// A cell body failed while computing `variable`.
    #[error("computation of '{variable}' failed: {cause}")]
    ComputationFailed { variable: String, cause: String },

    /// Directive or flow-file syntax error.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl FlowError {
    /// The variable the error is about, if any.
    pub fn variable(&self) -> Option<&str> {
        match self {
            FlowError::UnknownVariable(v) => Some(v),
            FlowError::Unfingerprintable { variable, .. }
            | FlowError::DependencyCycle { variable, .. }
            | FlowError::ComputationFailed { variable, .. } => Some(variable),
            FlowError::Parse(_) | FlowError::Io(_) => None,
        }
    }
}

impl From<FlowError> for String {
    fn from(e: FlowError) -> Self {
        e.to_string()
    }
}
