// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training, predicting, scheduling retrains).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - No direct file access (that's Layer 4 and 6)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Tunables shared by every use case
pub mod config;

// One training run: snapshot → split → fit → validate → publish
pub mod train_use_case;

// Serving predictions from the active model
pub mod predict_use_case;

// Periodic and on-demand retraining
pub mod scheduler;

// Builds the store, registry and trainer from a config
pub mod lifecycle;

pub use config::LifecycleConfig;
pub use lifecycle::Lifecycle;
pub use predict_use_case::{Prediction, PredictionService};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use train_use_case::{RejectReason, Trainer, TrainingOutcome};
