// ============================================================
// Layer 3 — Model Version Domain Types
// ============================================================
// A ModelVersion is one fitted predictor plus the facts needed
// to audit it: when it was trained, on how many samples, and
// how far off it was on the held-out partition.
//
// Once constructed a version is never mutated. The registry
// shares it behind an `Arc`, so a reader that grabbed version 3
// keeps a coherent version 3 even while version 4 is published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::sample::{Features, MODEL_INPUTS};

/// Monotonically increasing model version number (first version is 1).
pub type VersionId = u64;

// ─── ModelArtifact ────────────────────────────────────────────────────────────
/// Fitted linear predictor over standardized inputs.
///
/// prediction = target_mean + target_scale * (bias + Σ wᵢ · (xᵢ - meanᵢ) / scaleᵢ)
///
/// Plain numbers only, so the artifact serializes to a small JSON blob
/// and predictions need no tensor runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub input_means:  Vec<f64>,
    pub input_scales: Vec<f64>,
    pub weights:      Vec<f64>,
    pub bias:         f64,
    pub target_mean:  f64,
    pub target_scale: f64,
}

impl ModelArtifact {
    /// A predictor that always answers `value`. Useful as a baseline.
    pub fn constant(value: f64) -> Self {
        Self {
            input_means:  vec![0.0; MODEL_INPUTS],
            input_scales: vec![1.0; MODEL_INPUTS],
            weights:      vec![0.0; MODEL_INPUTS],
            bias:         0.0,
            target_mean:  value,
            target_scale: 1.0,
        }
    }

    /// Vector lengths match the model input width and every number is finite.
    pub fn is_well_formed(&self) -> bool {
        let lengths_ok = self.input_means.len() == MODEL_INPUTS
            && self.input_scales.len() == MODEL_INPUTS
            && self.weights.len() == MODEL_INPUTS;

        let finite = self
            .input_means
            .iter()
            .chain(&self.input_scales)
            .chain(&self.weights)
            .chain([&self.bias, &self.target_mean, &self.target_scale])
            .all(|v| v.is_finite());

        let scales_ok = self.input_scales.iter().all(|s| *s != 0.0);

        lengths_ok && finite && scales_ok
    }

    /// Predicted water need in mm, clamped at zero.
    pub fn predict(&self, features: &Features) -> f64 {
        let input = features.to_model_input();
        let z: f64 = input
            .iter()
            .zip(&self.input_means)
            .zip(&self.input_scales)
            .zip(&self.weights)
            .map(|(((x, mean), scale), w)| w * (x - mean) / scale)
            .sum();

        (self.target_mean + self.target_scale * (self.bias + z)).max(0.0)
    }
}

// ─── ModelMetadata ────────────────────────────────────────────────────────────
/// Audit record persisted next to each artifact as `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub version_id:       VersionId,
    pub trained_at:       DateTime<Utc>,
    pub sample_count:     usize,
    /// Mean absolute error on the held-out partition, mm
    pub validation_error: f64,
}

// ─── ModelVersion ─────────────────────────────────────────────────────────────
/// An immutable published (or publishable) model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelVersion {
    metadata: ModelMetadata,
    artifact: ModelArtifact,
}

impl ModelVersion {
    pub fn new(metadata: ModelMetadata, artifact: ModelArtifact) -> Self {
        Self { metadata, artifact }
    }

    pub fn version_id(&self) -> VersionId {
        self.metadata.version_id
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.metadata.trained_at
    }

    pub fn sample_count(&self) -> usize {
        self.metadata.sample_count
    }

    pub fn validation_error(&self) -> f64 {
        self.metadata.validation_error
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }
}
