// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// State and persistence that several other layers lean on:
//
//   registry.rs   — the active model pointer, bounded version
//                   history, atomic publish and rollback
//
//   checkpoint.rs — on-disk layout of published versions
//                   (one artifact + metadata per version,
//                   plus the active pointer) so a restart
//                   reloads the last good model
//
//   metrics.rs    — CSV ledger of every training run and its
//                   outcome, including rejected models
//
//   lock_file.rs  — advisory file lock so only one process
//                   sharing a data directory trains at a time
//
// Reference: Rust Book §16 (Fearless Concurrency)

/// Versioned model registry
pub mod registry;

/// Model artifact persistence
pub mod checkpoint;

/// Training run ledger
pub mod metrics;

/// Cross-process lock file
pub mod lock_file;

pub use checkpoint::ArtifactStore;
pub use lock_file::LockFile;
pub use metrics::{TrainingLog, TrainingRecord};
pub use registry::ModelRegistry;
