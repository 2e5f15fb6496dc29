// ============================================================
// irrigation_model — Water-Need Model Lifecycle Manager
// ============================================================
// Layers (each only talks to the ones below it):
//
//   Layer 1  cli          — clap commands (binary only)
//   Layer 2  application  — Trainer, PredictionService, Scheduler
//   Layer 3  domain       — samples, model versions, errors, traits
//   Layer 4  data         — SampleStore, CSV import, split
//   Layer 5  ml           — Burn linear regressor
//   Layer 6  infra        — ModelRegistry, artifact files, run log
//
// Embedding in a service:
//
//   let lifecycle = Lifecycle::open(LifecycleConfig::default())?;
//   lifecycle.store.append(sample)?;
//   let handle = lifecycle.start_schedule()?;
//   let answer = lifecycle.predictor.predict(&features)?;

#![recursion_limit = "256"]

pub mod application;
pub mod data;
pub mod domain;
pub mod infra;
pub mod ml;

pub use application::{
    Lifecycle, LifecycleConfig, Prediction, PredictionService, RejectReason, Scheduler,
    SchedulerHandle, Trainer, TrainingOutcome,
};
pub use data::{SampleStore, SampleWindow, Snapshot};
pub use domain::{
    CropType, Features, LifecycleError, LifecycleResult, ModelArtifact, ModelMetadata,
    ModelVersion, Regressor, Sample, VersionId,
};
pub use infra::ModelRegistry;
