// ============================================================
// Layer 2 — Prediction Service
// ============================================================
// Answers "how much water does this zone need?" from whichever
// model version is active at the moment of the call.
//
//   1. Validate the feature vector
//   2. Take the active version (a pointer copy; never waits on
//      a running training job)
//   3. Evaluate its artifact
//
// No cold-start training: before the first publish every call
// fails with `ModelUnavailable` and the caller decides what to do.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::{LifecycleError, LifecycleResult};
use crate::domain::model_version::VersionId;
use crate::domain::sample::Features;
use crate::infra::registry::ModelRegistry;

/// Response body for a prediction request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Recommended irrigation in millimetres, never negative
    pub predicted_water_mm: f64,
    /// Version that produced the number
    pub model_version:      VersionId,
}

/// Read-only view onto the registry's active model.
#[derive(Debug, Clone)]
pub struct PredictionService {
    registry: Arc<ModelRegistry>,
}

impl PredictionService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn predict(&self, features: &Features) -> LifecycleResult<Prediction> {
        features.validate()?;

        let model = self.registry.current().ok_or(LifecycleError::ModelUnavailable)?;
        let prediction = Prediction {
            predicted_water_mm: model.artifact().predict(features),
            model_version:      model.version_id(),
        };

        tracing::debug!(
            "Predicted {:.2} mm with model version {}",
            prediction.predicted_water_mm,
            prediction.model_version
        );
        Ok(prediction)
    }

    /// Same as `predict`, for a raw JSON request body
    /// `{soil_moisture, temperature, humidity, crop_type}`.
    pub fn predict_json(&self, request: &Value) -> LifecycleResult<Prediction> {
        self.predict(&Features::from_json(request)?)
    }
}
