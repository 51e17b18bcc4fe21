use crate::candle_aux_layers::*;
use crate::candle_loss_functions::sigmoid_cross_entropy_with_logits;
use candle_core::{DType, Result, Tensor};
use candle_nn::{Activation, Linear, Module, VarBuilder};

/// Latent-space discriminator: code (n x k) -> logit (n x 1)
pub struct LatentDiscriminator {
    n_latent: usize,
    fc: StackLayers<Linear>,
    logit: Linear,
}

impl LatentDiscriminator {
    /// Variables `fc.{j}.*` with leaky relu and `logit.*`
    pub fn new(n_latent: usize, layers: &[usize], leaky_slope: f64, vs: VarBuilder) -> Result<Self> {
        let (fc, prev_dim) =
            linear_stack(n_latent, layers, Activation::LeakyRelu(leaky_slope), vs.clone())?;
        let logit = candle_nn::linear(prev_dim, 1, vs.pp("logit"))?;
        Ok(Self {
            n_latent,
            fc,
            logit,
        })
    }

    pub fn dim_latent(&self) -> usize {
        self.n_latent
    }

    /// Mean sigmoid cross entropy of the logits against a constant label
    pub fn loss_against(&self, z_nk: &Tensor, label: f32) -> Result<Tensor> {
        let logits = self.forward(z_nk)?;
        let targets = logits.ones_like()?.affine(label as f64, 0.0)?;
        sigmoid_cross_entropy_with_logits(&logits, &targets)?.mean_all()
    }

    /// Fraction of codes called real (probability > 0.5)
    pub fn accuracy(&self, z_nk: &Tensor, label: f32) -> Result<f32> {
        let real = self.forward(z_nk)?.ge(0.0)?.to_dtype(DType::F32)?;
        let hit = if label > 0.5 {
            real
        } else {
            real.affine(-1.0, 1.0)?
        };
        hit.mean_all()?.to_scalar::<f32>()
    }
}

impl Module for LatentDiscriminator {
    fn forward(&self, z_nk: &Tensor) -> Result<Tensor> {
        self.logit.forward(&self.fc.forward(z_nk)?)
    }
}
