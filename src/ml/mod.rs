// ============================================================
// Layer 5 — ML Layer (Burn)
// ============================================================
// All Burn framework specific code lives here.
// Only this layer imports from burn.
//
//   model.rs     — one linear layer over standardized inputs
//   regressor.rs — the `Regressor` implementation: scaling,
//                  Adam training loop, parameter export, and
//                  the mean-absolute-error metric used for
//                  validation
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)

/// Linear water-need model architecture
pub mod model;

/// Training loop and validation metric
pub mod regressor;

pub use regressor::{mean_absolute_error, BurnLinearRegressor};
