// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure the lifecycle manager can report to its caller.
// Callers (an HTTP handler, the CLI) match on the variant to
// pick a response; nothing is folded into a generic failure.
//
// "Not enough samples" and "model rejected" are NOT errors:
// they are `TrainingOutcome` variants returned by the Trainer.

use thiserror::Error;

use crate::domain::model_version::VersionId;

/// Errors surfaced by the store, registry, trainer and prediction service.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Malformed input, rejected before any state change.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A publish would not move the version high-water mark forward.
    #[error("publish rejected: version {attempted} is not newer than version {latest}")]
    Publish {
        attempted: VersionId,
        latest:    VersionId,
    },

    /// Rollback target is unknown or was evicted from retained history.
    #[error("model version {0} is not in the retained history")]
    NotFound(VersionId),

    /// Prediction requested before any model was published.
    #[error("no trained model is available yet")]
    ModelUnavailable,

    /// A training run is already in flight.
    #[error("a training run is already in progress")]
    AlreadyRunning,

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LifecycleError {
    /// Shorthand used by the boundary validators.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result alias used across the library.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
