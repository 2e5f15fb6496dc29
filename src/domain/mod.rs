// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that describe what the
// irrigation model lifecycle works with:
//
//   sample.rs        — a labelled sensor observation and its
//                      validated feature vector
//   model_version.rs — an immutable, versioned fitted predictor
//   error.rs         — the error taxonomy surfaced to callers
//   traits.rs        — the Regressor capability the Trainer
//                      delegates fitting to
//
// Rules for this layer:
//   - NO burn types here
//   - NO file I/O
//   - validation of external records happens here, once,
//     so every other layer can trust a `Sample` or `Features`
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Labelled observations and feature vectors
pub mod sample;

/// Versioned fitted models and their metadata
pub mod model_version;

/// Error taxonomy for the lifecycle manager
pub mod error;

/// Core abstractions other layers implement
pub mod traits;

pub use error::{LifecycleError, LifecycleResult};
pub use model_version::{ModelArtifact, ModelMetadata, ModelVersion, VersionId};
pub use sample::{CropType, Features, Sample, StoredSample};
pub use traits::Regressor;
