// ============================================================
// Layer 5 — Linear Regressor (Burn training loop)
// ============================================================
// Implements the domain `Regressor` trait with Burn:
//
//   1. Standardize every input column and the target
//      (zero mean, unit variance) so one learning rate
//      fits readings in °C, % and one-hot flags alike
//   2. Full-batch gradient descent with Adam on MSE loss
//   3. Export the learned weight/bias plus the scaling
//      statistics into a plain `ModelArtifact`
//
// The batch is the whole training partition: a season of
// readings from a few zones is a few thousand rows at most.
//
// Why standardize the target too?
//   Water needs run from 0 to ~60 mm. Predicting a unit-variance
//   target keeps the loss (and the gradients) in the same range
//   whatever the crop mix, so the default learning rate works
//   without tuning per farm.
//
// Why export to a plain artifact instead of a Burn record?
//   The prediction path only needs a dot product. Keeping Burn
//   out of it means serving never touches a tensor backend and
//   the saved model is readable JSON.
//
// Key Burn insight:
//   - Training uses Autodiff<NdArray> for gradients
//   - model.valid() drops the autodiff graph before the
//     parameters are read back as plain f32 values
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{anyhow, bail, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};

use crate::domain::model_version::ModelArtifact;
use crate::domain::sample::{Sample, MODEL_INPUTS};
use crate::domain::traits::Regressor;
use crate::ml::model::{WaterNeedModel, WaterNeedModelConfig};

type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;

/// Columns with (near) zero spread are left unscaled.
const MIN_SCALE: f64 = 1e-9;

// ─── BurnLinearRegressor ──────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct BurnLinearRegressor {
    /// Full-batch optimisation steps
    pub epochs:        usize,
    pub learning_rate: f64,
}

impl Default for BurnLinearRegressor {
    fn default() -> Self {
        Self { epochs: 500, learning_rate: 0.05 }
    }
}

impl BurnLinearRegressor {
    pub fn new(epochs: usize, learning_rate: f64) -> Self {
        Self { epochs, learning_rate }
    }
}

impl Regressor for BurnLinearRegressor {
    fn fit(&self, samples: &[Sample]) -> Result<ModelArtifact> {
        if samples.is_empty() {
            bail!("cannot fit on an empty training set");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            bail!("learning rate must be positive, got {}", self.learning_rate);
        }

        let device = burn::backend::ndarray::NdArrayDevice::default();
        let n      = samples.len();

        // ── Standardize inputs and target ─────────────────────────────────────
        let rows: Vec<[f64; MODEL_INPUTS]> = samples
            .iter()
            .map(|s| s.features.to_model_input())
            .collect();
        let targets: Vec<f64> = samples.iter().map(|s| s.target).collect();

        let (input_means, input_scales): (Vec<f64>, Vec<f64>) = (0..MODEL_INPUTS)
            .map(|j| mean_and_scale(rows.iter().map(|r| r[j])))
            .unzip();
        let (target_mean, target_scale) = mean_and_scale(targets.iter().copied());

        let x_flat: Vec<f32> = rows
            .iter()
            .flat_map(|row| {
                row.iter()
                    .zip(&input_means)
                    .zip(&input_scales)
                    .map(|((x, mean), scale)| ((x - mean) / scale) as f32)
            })
            .collect();
        let y_flat: Vec<f32> = targets
            .iter()
            .map(|t| ((t - target_mean) / target_scale) as f32)
            .collect();

        let x = Tensor::<TrainBackend, 2>::from_data(TensorData::new(x_flat, [n, MODEL_INPUTS]), &device);
        let y = Tensor::<TrainBackend, 2>::from_data(TensorData::new(y_flat, [n, 1]), &device);

        // ── Adam on MSE ───────────────────────────────────────────────────────
        let mut model: WaterNeedModel<TrainBackend> = WaterNeedModelConfig::new(MODEL_INPUTS).init(&device);
        let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

        let mut last_loss = f64::NAN;
        for epoch in 1..=self.epochs {
            let loss = model.forward_loss(x.clone(), y.clone());
            last_loss = loss.clone().into_scalar().elem::<f64>();
            if !last_loss.is_finite() {
                bail!("training diverged at epoch {epoch} (loss = {last_loss})");
            }

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(self.learning_rate, model, grads);
        }
        tracing::debug!("Fitted on {} samples, final standardized MSE {:.6}", n, last_loss);

        // ── Export parameters ─────────────────────────────────────────────────
        let model = model.valid();
        let weights = model
            .linear
            .weight
            .val()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("cannot read fitted weights: {e:?}"))?;
        let bias = match &model.linear.bias {
            Some(b) => b
                .val()
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| anyhow!("cannot read fitted bias: {e:?}"))?
                .first()
                .copied()
                .unwrap_or(0.0),
            None => 0.0,
        };

        let artifact = ModelArtifact {
            input_means,
            input_scales,
            weights: weights.into_iter().map(f64::from).collect(),
            bias: f64::from(bias),
            target_mean,
            target_scale,
        };
        if !artifact.is_well_formed() {
            bail!("fitted parameters are not finite");
        }
        Ok(artifact)
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────
/// Mean and population standard deviation; spread below `MIN_SCALE` becomes 1.
fn mean_and_scale(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let count = values.clone().count().max(1) as f64;
    let mean  = values.clone().sum::<f64>() / count;
    let var   = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    let scale = var.sqrt();
    (mean, if scale > MIN_SCALE { scale } else { 1.0 })
}

/// Mean absolute error of `artifact` over `samples`; NaN when `samples` is empty.
pub fn mean_absolute_error(artifact: &ModelArtifact, samples: &[Sample]) -> f64 {
    if samples.is_empty() {
        return f64::NAN;
    }
    let total: f64 = samples
        .iter()
        .map(|s| (artifact.predict(&s.features) - s.target).abs())
        .sum();
    total / samples.len() as f64
}
