use crate::candle_aux_layers::*;
use crate::candle_model_traits::*;
use candle_core::{Result, Tensor};
use candle_nn::{ops, Activation, Linear, Module, VarBuilder};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputActivation {
    Sigmoid,
    Tanh,
    Identity,
}

impl OutputActivation {
    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        match self {
            OutputActivation::Sigmoid => ops::sigmoid(x),
            OutputActivation::Tanh => x.tanh(),
            OutputActivation::Identity => Ok(x.clone()),
        }
    }
}

/////////////////////////
// Dense image decoder //
/////////////////////////

/// [z, y] -> fc -> out -> activation
pub struct DenseDecoder {
    n_features: usize,
    n_latent: usize,
    n_cond: usize,
    fc: StackLayers<Linear>,
    out: Linear,
    out_act: OutputActivation,
}

impl DenseDecoder {
    /// Will create a new dense decoder with the following parameters:
    /// * `fc.{}.weight` where {} is the layer index
    /// * `out.weight`
    ///
    /// # Arguments
    /// * `n_cond` - conditioning columns concatenated to the latent code
    /// * `layers` - hidden dims in the order of data flow
    pub fn new(
        n_features: usize,
        n_latent: usize,
        n_cond: usize,
        layers: &[usize],
        hidden_act: Activation,
        out_act: OutputActivation,
        vs: VarBuilder,
    ) -> Result<Self> {
        let (fc, prev_dim) = linear_stack(n_latent + n_cond, layers, hidden_act, vs.clone())?;
        let out = candle_nn::linear(prev_dim, n_features, vs.pp("out"))?;

        Ok(Self {
            n_features,
            n_latent,
            n_cond,
            fc,
            out,
            out_act,
        })
    }

    pub fn weights(&self) -> Vec<&Tensor> {
        self.fc
            .layers()
            .iter()
            .chain(std::iter::once(&self.out))
            .map(|l| l.weight())
            .collect()
    }
}

impl DecoderModuleT for DenseDecoder {
    fn forward_t(&self, z_nk: &Tensor, cond_nc: Option<&Tensor>, _train: bool) -> Result<Tensor> {
        if self.n_cond > 0 && cond_nc.is_none() {
            candle_core::bail!("this decoder is conditioned on {} label columns", self.n_cond);
        }
        let h = if self.n_cond > 0 {
            concat_condition(z_nk, cond_nc)?
        } else {
            z_nk.clone()
        };
        let h = self.fc.forward(&h)?;
        self.out_act.apply(&self.out.forward(&h)?)
    }

    fn dim_obs(&self) -> usize {
        self.n_features
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle_loss_functions::bernoulli_likelihood;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn decoder_output_in_range() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let dec = DenseDecoder::new(
            20,
            2,
            3,
            &[8],
            Activation::Relu,
            OutputActivation::Sigmoid,
            vs.pp("dec"),
        )?;

        let z = Tensor::randn(0f32, 1f32, (5, 2), &dev)?;
        let y = Tensor::zeros((5, 3), DType::F32, &dev)?;
        let x = Tensor::rand(0f32, 1f32, (5, 20), &dev)?;

        let (recon, llik) = dec.forward_with_llik(&z, Some(&y), &x, &bernoulli_likelihood)?;
        assert_eq!(recon.dims(), &[5, 20]);
        assert_eq!(llik.dims(), &[5]);
        assert!(recon.min_all()?.to_scalar::<f32>()? >= 0.0);
        assert!(recon.max_all()?.to_scalar::<f32>()? <= 1.0);

        assert!(dec.forward_t(&z, None, false).is_err());
        assert_eq!(dec.weights().len(), 2);
        Ok(())
    }

    #[test]
    fn tanh_decoder_is_bounded() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let dec = DenseDecoder::new(
            6,
            4,
            0,
            &[5, 5],
            Activation::LeakyRelu(0.2),
            OutputActivation::Tanh,
            vs,
        )?;
        let z = (Tensor::randn(0f32, 1f32, (3, 4), &dev)? * 10.0)?;
        let recon = dec.forward_t(&z, None, true)?;
        assert!(recon.abs()?.max_all()?.to_scalar::<f32>()? <= 1.0);
        Ok(())
    }
}
