use crate::arch::DenseVaeParams;
use crate::models::*;

use candle_core::Tensor;
use candle_nn::{Activation, AdamW, Optimizer, VarBuilder, VarMap};
use candle_util::candle_data_loader::MinibatchData;
use candle_util::candle_decoder_dense::*;
use candle_util::candle_encoder_dense::*;
use candle_util::candle_inference::{vars_with_prefix, AdamArgs};
use candle_util::candle_loss_functions::bernoulli_likelihood;
use candle_util::candle_model_traits::*;

///
/// Dense VAE with Bernoulli pixels:
/// loss = -E[log p(x|z)] + KL(q(z|x) || N(0,1)) [+ KL(q(c|x) || Uniform)]
///
/// Covers `vae`, `conditional_vae` (labels fed to both ends) and
/// `concrete_vae` (extra concrete code).
///
pub struct DenseVae {
    encoder: GaussianEncoder,
    decoder: DenseDecoder,
    adam: AdamW,
}

impl DenseVae {
    pub fn new(
        params: &DenseVaeParams,
        vs: &VarBuilder,
        varmap: &VarMap,
        learning_rate: f64,
    ) -> anyhow::Result<Self> {
        let encoder = GaussianEncoder::new(
            GaussianEncoderArgs {
                n_features: params.input_dim,
                n_cond: params.n_classes,
                n_latent_cont: params.latent.cont,
                n_latent_disc: params.latent.disc,
                layers: &params.encoder_layers,
                temperature: params.temperature,
            },
            vs.pp("enc"),
        )?;

        let decoder = DenseDecoder::new(
            params.input_dim,
            params.latent.total(),
            params.n_classes,
            &params.decoder_layers,
            Activation::Relu,
            OutputActivation::Sigmoid,
            vs.pp("dec"),
        )?;

        let adam = AdamArgs::new(learning_rate).build(vars_with_prefix(varmap, &["enc.", "dec."]))?;

        Ok(Self {
            encoder,
            decoder,
            adam,
        })
    }

    fn condition<'a>(&self, mb: &'a MinibatchData) -> anyhow::Result<Option<&'a Tensor>> {
        if self.encoder.dim_cond() > 0 {
            Ok(Some(required_one_hot(mb, "conditional_vae")?))
        } else {
            Ok(None)
        }
    }
}

impl GenerativeModelT for DenseVae {
    fn train_step(&mut self, mb: &MinibatchData) -> anyhow::Result<StepLoss> {
        let x_nd = &mb.input;
        let y_nc = self.condition(mb)?;

        let code = self.encoder.forward_t(x_nd, y_nc, true)?;
        let (_, llik_n) =
            self.decoder
                .forward_with_llik(&code.z, y_nc, x_nd, &bernoulli_likelihood)?;

        let kl_n = code
            .kl
            .ok_or_else(|| anyhow::anyhow!("variational encoder without KL"))?;

        let loss = (&kl_n - &llik_n)?.mean_all()?;
        let loss_val = finite_scalar(&loss, "vae")?;
        self.adam.backward_step(&loss)?;

        Ok(StepLoss {
            loss: loss_val,
            parts: vec![
                ("recon", -llik_n.mean_all()?.to_scalar::<f32>()?),
                ("kl", kl_n.mean_all()?.to_scalar::<f32>()?),
            ],
        })
    }

    fn generate(&self, z_nk: &Tensor, cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor> {
        Ok(self.decoder.forward_t(z_nk, cond_nc, false)?)
    }

    fn extract_features(&self, x: &Tensor, cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor> {
        Ok(self.encoder.forward_t(x, cond_nc, false)?.z_mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::LatentSpec;
    use candle_core::{DType, Device};
    use candle_util::candle_sampling::one_hot_labels;

    fn params(n_classes: usize, latent: LatentSpec) -> DenseVaeParams {
        DenseVaeParams {
            input_dim: 16,
            n_classes,
            encoder_layers: vec![8],
            decoder_layers: vec![8],
            latent,
            temperature: 0.5,
        }
    }

    #[test]
    fn concrete_vae_step_and_generate() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let mut model = DenseVae::new(&params(0, LatentSpec::new(5, 2, 3)?), &vs, &varmap, 1e-3)?;

        let mb = MinibatchData {
            input: Tensor::rand(0f32, 1f32, (6, 16), &dev)?,
            labels: None,
            one_hot: None,
        };
        let loss = model.train_step(&mb)?;
        assert!(loss.loss.is_finite());
        assert_eq!(loss.parts.len(), 2);

        let z = Tensor::zeros((4, 5), DType::F32, &dev)?;
        assert_eq!(model.generate(&z, None)?.dims(), &[4, 16]);
        assert_eq!(model.extract_features(&mb.input, None)?.dims(), &[6, 2]);
        Ok(())
    }

    #[test]
    fn conditional_vae_needs_labels() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let mut model = DenseVae::new(&params(3, LatentSpec::gaussian(2)), &vs, &varmap, 1e-3)?;

        let x = Tensor::rand(0f32, 1f32, (4, 16), &dev)?;
        let unlabeled = MinibatchData {
            input: x.clone(),
            labels: None,
            one_hot: None,
        };
        assert!(model.train_step(&unlabeled).is_err());

        let labels = Tensor::new(&[0u32, 1, 2, 1], &dev)?;
        let labeled = MinibatchData {
            input: x,
            one_hot: Some(one_hot_labels(&labels, 3)?),
            labels: Some(labels),
        };
        assert!(model.train_step(&labeled)?.loss.is_finite());
        Ok(())
    }
}
