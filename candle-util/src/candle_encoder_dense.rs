use crate::candle_aux_layers::*;
use crate::candle_loss_functions::{categorical_kl_loss, gaussian_kl_loss};
use crate::candle_model_traits::*;
use crate::candle_sampling::{reparameterize, sample_concrete};
use candle_core::{Result, Tensor, D};
use candle_nn::{ops, Activation, Linear, Module, ModuleT, VarBuilder};

pub struct GaussianEncoderArgs<'a> {
    pub n_features: usize,
    /// number of conditioning columns appended to the input (0 = none)
    pub n_cond: usize,
    pub n_latent_cont: usize,
    /// number of concrete categories (0 = purely Gaussian code)
    pub n_latent_disc: usize,
    pub layers: &'a [usize],
    pub temperature: f64,
}

/// Dense encoder with a Gaussian code and an optional concrete code
///
/// [x, y] -> fc -> (mu, log var) -> z
///              -> softmax -> α -> c
/// The latent sample is [z, c].
pub struct GaussianEncoder {
    n_features: usize,
    n_cond: usize,
    n_latent_cont: usize,
    n_latent_disc: usize,
    temperature: f64,
    fc: StackLayers<Linear>,
    z_mean: Linear,
    z_lnvar: Linear,
    alpha: Option<Linear>,
}

impl EncoderModuleT for GaussianEncoder {
    fn forward_t(
        &self,
        x_nd: &Tensor,
        cond_nc: Option<&Tensor>,
        train: bool,
    ) -> Result<LatentCode> {
        let h_nl = self.hidden(x_nd, cond_nc, train)?;

        let z_mean_nk = self.z_mean.forward(&h_nl)?;
        let z_lnvar_nk = self.z_lnvar.forward(&h_nl)?.clamp(-8., 8.)?;
        let z_nk = reparameterize(&z_mean_nk, &z_lnvar_nk, train)?;
        let kl_n = gaussian_kl_loss(&z_mean_nk, &z_lnvar_nk)?;

        match &self.alpha {
            Some(alpha) => {
                let alpha_nc = ops::softmax(&alpha.forward(&h_nl)?, D::Minus1)?;
                let c_nc = sample_concrete(&alpha_nc, self.temperature, train)?;
                Ok(LatentCode {
                    z: Tensor::cat(&[&z_nk, &c_nc], 1)?,
                    z_mean: z_mean_nk,
                    kl: Some(kl_n.add(&categorical_kl_loss(&alpha_nc)?)?),
                })
            }
            None => Ok(LatentCode {
                z: z_nk,
                z_mean: z_mean_nk,
                kl: Some(kl_n),
            }),
        }
    }

    fn dim_obs(&self) -> usize {
        self.n_features
    }

    fn dim_latent(&self) -> usize {
        self.n_latent_cont + self.n_latent_disc
    }
}

impl GaussianEncoder {
    fn hidden(&self, x_nd: &Tensor, cond_nc: Option<&Tensor>, train: bool) -> Result<Tensor> {
        if self.n_cond > 0 && cond_nc.is_none() {
            candle_core::bail!("this encoder is conditioned on {} label columns", self.n_cond);
        }
        let x_nd = if self.n_cond > 0 {
            concat_condition(x_nd, cond_nc)?
        } else {
            x_nd.clone()
        };
        self.fc.forward_t(&x_nd, train)
    }

    pub fn dim_cond(&self) -> usize {
        self.n_cond
    }

    /// Will create a new Gaussian encoder module with these variables:
    ///
    /// * `fc.{}.weight` where {} is the layer index
    /// * `z.mean.weight`
    /// * `z.lnvar.weight`
    /// * `alpha.weight` if the concrete code is requested
    pub fn new(args: GaussianEncoderArgs, vs: VarBuilder) -> Result<Self> {
        debug_assert!(!args.layers.is_empty());

        // (1) [data, cond] -> fc
        let (fc, prev_dim) =
            linear_stack(args.n_features + args.n_cond, args.layers, Activation::Relu, vs.clone())?;

        // (2) fc -> K
        let z_mean = candle_nn::linear(prev_dim, args.n_latent_cont, vs.pp("z.mean"))?;
        let z_lnvar = candle_nn::linear(prev_dim, args.n_latent_cont, vs.pp("z.lnvar"))?;

        let alpha = if args.n_latent_disc > 0 {
            Some(candle_nn::linear(prev_dim, args.n_latent_disc, vs.pp("alpha"))?)
        } else {
            None
        };

        Ok(Self {
            n_features: args.n_features,
            n_cond: args.n_cond,
            n_latent_cont: args.n_latent_cont,
            n_latent_disc: args.n_latent_disc,
            temperature: args.temperature,
            fc,
            z_mean,
            z_lnvar,
            alpha,
        })
    }
}

/// Dense encoder with a deterministic code
///
/// x -> fc (hidden activation) -> code (code activation)
pub struct DenseEncoder {
    n_features: usize,
    n_latent: usize,
    fc: StackLayers<Linear>,
}

impl EncoderModuleT for DenseEncoder {
    fn forward_t(
        &self,
        x_nd: &Tensor,
        _cond_nc: Option<&Tensor>,
        train: bool,
    ) -> Result<LatentCode> {
        let z_nk = self.fc.forward_t(x_nd, train)?;
        Ok(LatentCode {
            z: z_nk.clone(),
            z_mean: z_nk,
            kl: None,
        })
    }

    fn dim_obs(&self) -> usize {
        self.n_features
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}

impl DenseEncoder {
    /// Output of every layer; the last one is the code
    pub fn activations(&self, x_nd: &Tensor) -> Result<Vec<Tensor>> {
        self.fc.forward_collect(x_nd)
    }

    pub fn weights(&self) -> Vec<&Tensor> {
        self.fc.layers().iter().map(|l| l.weight()).collect()
    }

    /// Variables `fc.{}.weight`; the code layer is the last `fc`
    ///
    /// * `layers` - hidden layer dims
    /// * `hidden_act` - activation after each hidden layer
    /// * `code_act` - activation of the code layer (`None` = linear)
    pub fn new(
        n_features: usize,
        n_latent: usize,
        layers: &[usize],
        hidden_act: Activation,
        code_act: Option<Activation>,
        vs: VarBuilder,
    ) -> Result<Self> {
        let (mut fc, prev_dim) = linear_stack(n_features, layers, hidden_act, vs.clone())?;

        let code = candle_nn::linear(prev_dim, n_latent, vs.pp(format!("fc.{}", layers.len())))?;
        match code_act {
            Some(act) => fc.push_with_act(code, act),
            None => fc.push(code),
        }

        Ok(Self {
            n_features,
            n_latent,
            fc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn gaussian_encoder_with_concrete_code() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let enc = GaussianEncoder::new(
            GaussianEncoderArgs {
                n_features: 12,
                n_cond: 0,
                n_latent_cont: 2,
                n_latent_disc: 3,
                layers: &[8, 4],
                temperature: 0.5,
            },
            vs.pp("enc"),
        )?;
        assert_eq!(enc.dim_latent(), 5);

        let x = Tensor::rand(0f32, 1f32, (6, 12), &dev)?;
        let code = enc.forward_t(&x, None, true)?;
        assert_eq!(code.z.dims(), &[6, 5]);
        assert_eq!(code.z_mean.dims(), &[6, 2]);

        let kl = code.kl.expect("kl");
        assert_eq!(kl.dims(), &[6]);
        assert!(kl.min_all()?.to_scalar::<f32>()? >= -1e-4);

        // the concrete part lives on the simplex
        let c_sum = code.z.narrow(1, 2, 3)?.sum(1)?.to_vec1::<f32>()?;
        assert!(c_sum.iter().all(|s| (s - 1.0).abs() < 1e-4));
        Ok(())
    }

    #[test]
    fn conditional_encoder_requires_labels() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let enc = GaussianEncoder::new(
            GaussianEncoderArgs {
                n_features: 5,
                n_cond: 2,
                n_latent_cont: 2,
                n_latent_disc: 0,
                layers: &[4],
                temperature: 0.5,
            },
            vs,
        )?;

        let x = Tensor::rand(0f32, 1f32, (3, 5), &dev)?;
        assert!(enc.forward_t(&x, None, true).is_err());

        let y = Tensor::new(&[[1f32, 0.], [0., 1.], [1., 0.]], &dev)?;
        let code = enc.forward_t(&x, Some(&y), false)?;
        assert_eq!(code.z.to_vec2::<f32>()?, code.z_mean.to_vec2::<f32>()?);
        Ok(())
    }

    #[test]
    fn dense_encoder_exposes_every_layer() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let enc = DenseEncoder::new(10, 3, &[6], Activation::Relu, Some(Activation::Relu), vs)?;
        let x = Tensor::rand(0f32, 1f32, (4, 10), &dev)?;

        let acts = enc.activations(&x)?;
        assert_eq!(acts.len(), 2);
        assert_eq!(acts[1].dims(), &[4, 3]);
        assert_eq!(enc.weights().len(), 2);
        assert!(enc.forward_t(&x, None, true)?.kl.is_none());
        Ok(())
    }
}
