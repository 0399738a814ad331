//! The invariant-failure channel for engine internals.

use thiserror::Error;

/// Result alias for operations that can only fail by breaking an engine
/// invariant, never on user input.
pub type TrellisResult<T> = Result<T, InternalError>;

/// A violated engine invariant.
///
/// Input problems never surface here; each crate reports those through its
/// own error enum. An `InternalError` escaping the engine means a bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("engine invariant violated in {operation}: {detail}")]
pub struct InternalError {
    /// The operation that detected the violation.
    pub operation: &'static str,
    /// What went wrong.
    pub detail: String,
}

impl InternalError {
    /// Flags a violated invariant detected by `operation`.
    pub fn new(operation: &'static str, detail: impl Into<String>) -> Self {
        Self {
            operation,
            detail: detail.into(),
        }
    }
}
