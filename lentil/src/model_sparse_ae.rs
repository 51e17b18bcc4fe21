use crate::arch::SparseAeParams;
use crate::models::*;

use candle_core::Tensor;
use candle_nn::{Activation, AdamW, Optimizer, VarBuilder, VarMap};
use candle_util::candle_data_loader::MinibatchData;
use candle_util::candle_decoder_dense::*;
use candle_util::candle_encoder_dense::*;
use candle_util::candle_inference::{vars_with_prefix, AdamArgs};
use candle_util::candle_loss_functions::{l2_penalty, mean_squared_error, sparse_kl_penalty};
use candle_util::candle_model_traits::*;

///
/// Sparse autoencoder:
/// loss = mse(x, x̂) + Σ_layer β KL(p || p̂_layer) + λ Σ ||W_enc||²
///
pub struct SparseAe {
    encoder: DenseEncoder,
    decoder: DenseDecoder,
    sparsity_target: f64,
    sparsity_weight: f64,
    l2_weight: f64,
    adam: AdamW,
}

impl SparseAe {
    pub fn new(
        params: &SparseAeParams,
        vs: &VarBuilder,
        varmap: &VarMap,
        learning_rate: f64,
    ) -> anyhow::Result<Self> {
        let encoder = DenseEncoder::new(
            params.input_dim,
            params.code_dim,
            &params.hidden_layers,
            Activation::Relu,
            Some(Activation::Relu),
            vs.pp("enc"),
        )?;

        let decoder_layers: Vec<usize> = params.hidden_layers.iter().rev().cloned().collect();
        let decoder = DenseDecoder::new(
            params.input_dim,
            params.code_dim,
            0,
            &decoder_layers,
            Activation::Relu,
            OutputActivation::Sigmoid,
            vs.pp("dec"),
        )?;

        let adam = AdamArgs::new(learning_rate).build(vars_with_prefix(varmap, &["enc.", "dec."]))?;

        Ok(Self {
            encoder,
            decoder,
            sparsity_target: params.sparsity_target,
            sparsity_weight: params.sparsity_weight,
            l2_weight: params.l2_weight,
            adam,
        })
    }
}

impl GenerativeModelT for SparseAe {
    fn train_step(&mut self, mb: &MinibatchData) -> anyhow::Result<StepLoss> {
        let x_nd = &mb.input;

        let acts = self.encoder.activations(x_nd)?;
        let code_nk = acts
            .last()
            .ok_or_else(|| anyhow::anyhow!("encoder without layers"))?;
        let recon_nd = self.decoder.forward_t(code_nk, None, true)?;

        let recon = mean_squared_error(x_nd, &recon_nd)?;

        // every encoder layer is regularized once
        let mut sparsity = sparse_kl_penalty(&acts[0], self.sparsity_target, self.sparsity_weight)?;
        for act in acts.iter().skip(1) {
            sparsity = (sparsity
                + sparse_kl_penalty(act, self.sparsity_target, self.sparsity_weight)?)?;
        }

        let l2 = l2_penalty(&self.encoder.weights(), self.l2_weight)?;

        let loss = ((&recon + &sparsity)? + &l2)?;
        let loss_val = finite_scalar(&loss, "sparse ae")?;
        self.adam.backward_step(&loss)?;

        Ok(StepLoss {
            loss: loss_val,
            parts: vec![
                ("mse", recon.to_scalar::<f32>()?),
                ("sparsity", sparsity.to_scalar::<f32>()?),
                ("l2", l2.to_scalar::<f32>()?),
            ],
        })
    }

    fn generate(&self, z_nk: &Tensor, _cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor> {
        Ok(self.decoder.forward_t(z_nk, None, false)?)
    }

    fn extract_features(&self, x: &Tensor, _cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor> {
        Ok(self.encoder.forward_t(x, None, false)?.z_mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn sparse_ae_steps_update_the_encoder() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let params = SparseAeParams {
            input_dim: 12,
            hidden_layers: vec![8],
            code_dim: 4,
            sparsity_target: 0.05,
            sparsity_weight: 3.0,
            l2_weight: 0.003,
        };
        let mut model = SparseAe::new(&params, &vs, &varmap, 1e-2)?;

        let mb = MinibatchData {
            input: Tensor::rand(0f32, 1f32, (10, 12), &dev)?,
            labels: None,
            one_hot: None,
        };

        let before = model.extract_features(&mb.input, None)?.to_vec2::<f32>()?;
        for _ in 0..5 {
            let step = model.train_step(&mb)?;
            assert!(step.loss.is_finite());
            assert_eq!(step.parts.len(), 3);
        }
        let after = model.extract_features(&mb.input, None)?.to_vec2::<f32>()?;
        assert_ne!(before, after);

        let code = model.extract_features(&mb.input, None)?;
        assert_eq!(code.dims(), &[10, 4]);
        assert!(code.min_all()?.to_scalar::<f32>()? >= 0.0);
        Ok(())
    }
}
