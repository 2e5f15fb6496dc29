// ============================================================
// Layer 5 — Water-Need Regression Model (Burn)
// ============================================================
// A single linear layer mapping the standardized input vector
// (soil moisture, temperature, humidity, one-hot crop) to one
// standardized water-need value.
//
// Weights start at zero instead of random values: the loss is
// convex for a linear model, so zero is as good a start as any,
// and it makes repeated fits on the same split reproducible.

use burn::{
    nn::{
        loss::{MseLoss, Reduction},
        Initializer, Linear, LinearConfig,
    },
    prelude::*,
};

// #[derive(Config)] already provides Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct WaterNeedModelConfig {
    pub num_inputs: usize,
}

impl WaterNeedModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> WaterNeedModel<B> {
        let linear = LinearConfig::new(self.num_inputs, 1)
            .with_initializer(Initializer::Zeros)
            .init(device);
        WaterNeedModel { linear }
    }
}

#[derive(Module, Debug)]
pub struct WaterNeedModel<B: Backend> {
    pub linear: Linear<B>,
}

impl<B: Backend> WaterNeedModel<B> {
    /// inputs: [batch, num_inputs] → [batch, 1]
    pub fn forward(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        self.linear.forward(inputs)
    }

    /// Mean squared error against targets of shape [batch, 1].
    pub fn forward_loss(&self, inputs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        let output = self.forward(inputs);
        MseLoss::new().forward(output, targets, Reduction::Mean)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_fresh_model_predicts_zero() {
        let device = Default::default();
        let model: WaterNeedModel<NdArray> = WaterNeedModelConfig::new(3).init(&device);
        let inputs = Tensor::<NdArray, 2>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]),
            &device,
        );
        let out = model.forward(inputs);
        assert_eq!(out.dims(), [2, 1]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| *v == 0.0));
    }
}
