// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The Trainer never knows which learning algorithm it runs.
// It hands a training partition to a `Regressor` and gets back
// a `ModelArtifact`, or an error it reports as `fit_failed`.
//
// Implementations:
//   - BurnLinearRegressor → linear model trained with Adam (ml layer)
//   - test spies          → count calls, fail on purpose, return constants
//
// This is the Dependency Inversion Principle from SOLID,
// applied using Rust's trait system.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::model_version::ModelArtifact;
use crate::domain::sample::Sample;

// ─── Regressor ────────────────────────────────────────────────────────────────
/// Any component that can fit a water-need predictor to labelled samples.
///
/// `Send + Sync` because the Trainer is shared between the scheduler
/// thread and on-demand callers.
pub trait Regressor: Send + Sync {
    /// Fit a predictor on `samples` (never empty when called by the Trainer).
    fn fit(&self, samples: &[Sample]) -> Result<ModelArtifact>;
}
