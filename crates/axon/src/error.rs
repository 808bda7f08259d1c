use std::fmt;

use thiserror::Error;

use crate::tensor::TensorBundle;

/// Specialized `Result` for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced by the dispatch runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A required resource could not be acquired.
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    /// An input bundle violated a structural precondition.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Model loading could not complete.
    #[error("model load failed: {reason}")]
    ModelLoadFailed { reason: String },

    /// The engine rejected the submit call.
    #[error("submission rejected by engine")]
    SubmissionFailed(#[source] anyhow::Error),

    /// The engine misbehaved while a completed job was materialized.
    #[error("completion failed")]
    CompletionFailed(#[source] anyhow::Error),

    /// Receiving timed out, or shutdown drained the pipeline.
    #[error("no result available")]
    NoResult,

    /// Two bundles with different tensor counts were paired up.
    #[error("tensor count mismatch: {left} vs {right}")]
    ShapeMismatch { left: usize, right: usize },

    /// The runtime is shutting down and no longer accepts work.
    #[error("runtime is shutting down")]
    ShuttingDown,
}

/// A failed submission, carrying the input bundle back to the caller.
///
/// The runtime only takes ownership of an input bundle once `send_input`
/// returns success. On any failure the bundle rides back inside this
/// error and remains the caller's to reuse or drop.
#[derive(Debug)]
pub struct SendError {
    input: TensorBundle,
    error: RuntimeError,
}

impl SendError {
    pub(crate) fn new(input: TensorBundle, error: RuntimeError) -> Self {
        Self { input, error }
    }

    /// The reason the submission failed.
    pub fn error(&self) -> &RuntimeError {
        &self.error
    }

    /// Reclaim the rejected input bundle.
    pub fn into_input(self) -> TensorBundle {
        self.input
    }

    /// Split into the rejected bundle and the failure reason.
    pub fn into_parts(self) -> (TensorBundle, RuntimeError) {
        (self.input, self.error)
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to submit input bundle: {}", self.error)
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
