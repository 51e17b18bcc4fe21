use crate::arch::*;
use crate::lentil_common::*;
use crate::model_conv_aae::ConvAae;
use crate::model_conv_ae::ConvAe;
use crate::model_dense_aae::DenseAae;
use crate::model_dense_vae::DenseVae;
use crate::model_sparse_ae::SparseAe;

use candle_core::{Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_util::candle_data_loader::MinibatchData;

/// Losses of one optimization step, in the order they were computed
pub struct StepLoss {
    /// the objective of the main (reconstruction) optimizer
    pub loss: f32,
    pub parts: Vec<(&'static str, f32)>,
}

impl std::fmt::Display for StepLoss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loss: {:.5}", self.loss)?;
        for (name, val) in self.parts.iter() {
            write!(f, ", {}: {:.5}", name, val)?;
        }
        Ok(())
    }
}

pub trait GenerativeModelT {
    /// One stochastic-gradient step on a minibatch
    fn train_step(&mut self, mb: &MinibatchData) -> anyhow::Result<StepLoss>;

    /// Decode latent samples `z_nk` (and labels for conditional
    /// models) into images
    fn generate(&self, z_nk: &Tensor, cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor>;

    /// Deterministic latent summary of the input (encoder mean)
    fn extract_features(&self, x: &Tensor, cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor>;
}

/// The closed set of models the driver knows how to train
pub enum GenerativeModel {
    DenseVae(DenseVae),
    SparseAe(SparseAe),
    DenseAae(DenseAae),
    ConvAe(ConvAe),
    ConvAae(ConvAae),
}

impl GenerativeModel {
    ///
    /// Instantiate the network of `arch` with all of its variables in
    /// `varmap` (prefixes `enc.`, `dec.`, `disc.`)
    ///
    pub fn build(
        arch: &Architecture,
        varmap: &VarMap,
        device: &Device,
        learning_rate: f64,
    ) -> anyhow::Result<Self> {
        let vs = VarBuilder::from_varmap(varmap, candle_core::DType::F32, device);

        let model = match arch {
            Architecture::Vae(p) | Architecture::ConditionalVae(p) | Architecture::ConcreteVae(p) => {
                GenerativeModel::DenseVae(DenseVae::new(p, &vs, varmap, learning_rate)?)
            }
            Architecture::SparseAe(p) => {
                GenerativeModel::SparseAe(SparseAe::new(p, &vs, varmap, learning_rate)?)
            }
            Architecture::Aae(p) => {
                GenerativeModel::DenseAae(DenseAae::new(p, &vs, varmap, learning_rate)?)
            }
            Architecture::ConvCae(p) => {
                GenerativeModel::ConvAe(ConvAe::new(p, false, &vs, varmap, learning_rate)?)
            }
            Architecture::ConvCvae(p) => {
                GenerativeModel::ConvAe(ConvAe::new(p, true, &vs, varmap, learning_rate)?)
            }
            Architecture::ConvAae(p) => {
                GenerativeModel::ConvAae(ConvAae::new(p, &vs, varmap, learning_rate)?)
            }
        };

        info!(
            "Built {} with {} variables",
            arch.name(),
            varmap.all_vars().len()
        );
        Ok(model)
    }

    fn inner(&self) -> &dyn GenerativeModelT {
        match self {
            GenerativeModel::DenseVae(m) => m,
            GenerativeModel::SparseAe(m) => m,
            GenerativeModel::DenseAae(m) => m,
            GenerativeModel::ConvAe(m) => m,
            GenerativeModel::ConvAae(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn GenerativeModelT {
        match self {
            GenerativeModel::DenseVae(m) => m,
            GenerativeModel::SparseAe(m) => m,
            GenerativeModel::DenseAae(m) => m,
            GenerativeModel::ConvAe(m) => m,
            GenerativeModel::ConvAae(m) => m,
        }
    }
}

impl GenerativeModelT for GenerativeModel {
    fn train_step(&mut self, mb: &MinibatchData) -> anyhow::Result<StepLoss> {
        self.inner_mut().train_step(mb)
    }

    fn generate(&self, z_nk: &Tensor, cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor> {
        self.inner().generate(z_nk, cond_nc)
    }

    fn extract_features(&self, x: &Tensor, cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor> {
        self.inner().extract_features(x, cond_nc)
    }
}

/// Read a scalar loss back; a NaN or infinite value ends the run
pub fn finite_scalar(loss: &Tensor, what: &str) -> anyhow::Result<f32> {
    let val = loss.to_scalar::<f32>()?;
    if !val.is_finite() {
        return Err(anyhow::anyhow!("non-finite {} loss: {}", what, val));
    }
    Ok(val)
}

/// One-hot labels of a minibatch, required by conditional models
pub fn required_one_hot<'a>(mb: &'a MinibatchData, arch_name: &str) -> anyhow::Result<&'a Tensor> {
    mb.one_hot
        .as_ref()
        .ok_or_else(|| ConfigError::MissingLabels(arch_name.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_loss_is_an_error() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        assert_eq!(finite_scalar(&Tensor::new(1.5f32, &dev)?, "test")?, 1.5);
        assert!(finite_scalar(&Tensor::new(f32::NAN, &dev)?, "test").is_err());
        assert!(finite_scalar(&Tensor::new(f32::INFINITY, &dev)?, "test").is_err());
        Ok(())
    }

    #[test]
    fn missing_labels_downcast() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let mb = MinibatchData {
            input: Tensor::zeros((2, 3), candle_core::DType::F32, &dev)?,
            labels: None,
            one_hot: None,
        };
        let err = required_one_hot(&mb, "conv_cae").err().expect("error");
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MissingLabels("conv_cae".into()))
        );
        Ok(())
    }
}
