use crate::candle_aux_layers::*;
use crate::candle_loss_functions::gaussian_kl_loss;
use crate::candle_model_traits::*;
use crate::candle_sampling::reparameterize;
use candle_core::{Result, Tensor};
use candle_nn::{ops, Conv2d, ConvTranspose2d, Module, ModuleT, VarBuilder};

/// spatial size the conv stacks are built for
pub const IMAGE_SIZE: usize = 32;

/// How the last convolution is turned into a style code
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StyleCode {
    /// bounded code in (0, 1)
    Sigmoid,
    /// (mu, log var) heads with reparameterization and KL
    Gaussian,
    /// unconstrained code shaped by an adversary
    Linear,
}

pub struct ConvEncoderArgs {
    pub channels: usize,
    pub conv_filters: usize,
    pub kernel_size: usize,
    pub n_style: usize,
    pub style: StyleCode,
}

///////////////////////////
// Convolutional encoder //
///////////////////////////

/// (n, c, 32, 32) -> 16 -> 8 -> 4 -> 2 -> 1 -> style (n, k)
pub struct ConvEncoder {
    channels: usize,
    n_style: usize,
    style: StyleCode,
    blocks: Vec<ConvBlock>,
    head: Conv2d,
    lnvar_head: Option<Conv2d>,
}

impl ConvEncoder {
    /// Variables:
    /// * `conv.{j}.conv.*`, `conv.{j}.norm.*` for the four strided blocks
    /// * `style.*` (or `mu.*`) and `lnvar.*` for a Gaussian code
    pub fn new(args: ConvEncoderArgs, vs: VarBuilder) -> Result<Self> {
        let f = args.conv_filters;
        let ksize = args.kernel_size;
        let filters = [f, f * 2, f * 4, f * 4];

        let mut blocks = Vec::with_capacity(filters.len());
        let mut prev = args.channels;
        for (j, &next) in filters.iter().enumerate() {
            blocks.push(ConvBlock::new(prev, next, ksize, 2, vs.pp(format!("conv.{}", j)))?);
            prev = next;
        }

        let head_config = candle_nn::Conv2dConfig {
            padding: ksize / 2,
            stride: 2,
            ..Default::default()
        };

        let (head, lnvar_head) = match args.style {
            StyleCode::Gaussian => (
                candle_nn::conv2d(prev, args.n_style, ksize, head_config, vs.pp("mu"))?,
                Some(candle_nn::conv2d(prev, args.n_style, ksize, head_config, vs.pp("lnvar"))?),
            ),
            _ => (
                candle_nn::conv2d(prev, args.n_style, ksize, head_config, vs.pp("style"))?,
                None,
            ),
        };

        Ok(Self {
            channels: args.channels,
            n_style: args.n_style,
            style: args.style,
            blocks,
            head,
            lnvar_head,
        })
    }

    pub fn style(&self) -> StyleCode {
        self.style
    }

    fn trunk(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (_, c, h, w) = x.dims4()?;
        if c != self.channels || h != IMAGE_SIZE || w != IMAGE_SIZE {
            candle_core::bail!(
                "expected (n, {}, {}, {}) images, got {:?}",
                self.channels,
                IMAGE_SIZE,
                IMAGE_SIZE,
                x.dims()
            );
        }
        let mut h = x.clone();
        for block in self.blocks.iter() {
            h = block.forward_t(&h, train)?;
        }
        Ok(h)
    }
}

impl EncoderModuleT for ConvEncoder {
    fn forward_t(
        &self,
        x_nchw: &Tensor,
        _cond_nc: Option<&Tensor>,
        train: bool,
    ) -> Result<LatentCode> {
        let h = self.trunk(x_nchw, train)?;
        let s_nk = self.head.forward(&h)?.flatten_from(1)?;

        match (&self.style, &self.lnvar_head) {
            (StyleCode::Gaussian, Some(lnvar_head)) => {
                let lnvar_nk = lnvar_head.forward(&h)?.flatten_from(1)?.clamp(-8., 8.)?;
                let z_nk = reparameterize(&s_nk, &lnvar_nk, train)?;
                let kl_n = gaussian_kl_loss(&s_nk, &lnvar_nk)?;
                Ok(LatentCode {
                    z: z_nk,
                    z_mean: s_nk,
                    kl: Some(kl_n),
                })
            }
            (StyleCode::Sigmoid, _) => {
                let z_nk = ops::sigmoid(&s_nk)?;
                Ok(LatentCode {
                    z: z_nk.clone(),
                    z_mean: z_nk,
                    kl: None,
                })
            }
            _ => Ok(LatentCode {
                z: s_nk.clone(),
                z_mean: s_nk,
                kl: None,
            }),
        }
    }

    fn dim_obs(&self) -> usize {
        self.channels * IMAGE_SIZE * IMAGE_SIZE
    }

    fn dim_latent(&self) -> usize {
        self.n_style
    }
}

///////////////////////////
// Convolutional decoder //
///////////////////////////

/// [z, y] (n, k + c) -> (n, k + c, 1, 1) -> 2 -> 4 -> 8 -> 16 -> 32 -> (n, channels, 32, 32)
pub struct ConvDecoder {
    channels: usize,
    n_latent: usize,
    n_cond: usize,
    blocks: Vec<ConvTransposeBlock>,
    out: ConvTranspose2d,
}

impl ConvDecoder {
    /// Variables `deconv.{j}.deconv.*`, `deconv.{j}.norm.*` and `out.*`
    pub fn new(
        channels: usize,
        conv_filters: usize,
        kernel_size: usize,
        n_latent: usize,
        n_cond: usize,
        vs: VarBuilder,
    ) -> Result<Self> {
        let f = conv_filters;
        let filters = [f * 4, f * 4, f * 4, f * 2, f];

        let mut blocks = Vec::with_capacity(filters.len());
        let mut prev = n_latent + n_cond;
        for (j, &next) in filters.iter().enumerate() {
            blocks.push(ConvTransposeBlock::new(
                prev,
                next,
                kernel_size,
                2,
                vs.pp(format!("deconv.{}", j)),
            )?);
            prev = next;
        }

        let out = same_conv_transpose2d(prev, channels, kernel_size, 1, vs.pp("out"))?;

        Ok(Self {
            channels,
            n_latent,
            n_cond,
            blocks,
            out,
        })
    }
}

impl DecoderModuleT for ConvDecoder {
    fn forward_t(&self, z_nk: &Tensor, cond_nc: Option<&Tensor>, train: bool) -> Result<Tensor> {
        if self.n_cond > 0 && cond_nc.is_none() {
            candle_core::bail!("this decoder is conditioned on {} label columns", self.n_cond);
        }
        let code = if self.n_cond > 0 {
            concat_condition(z_nk, cond_nc)?
        } else {
            z_nk.clone()
        };

        let (n, k) = code.dims2()?;
        let mut h = code.reshape((n, k, 1, 1))?;
        for block in self.blocks.iter() {
            h = block.forward_t(&h, train)?;
        }
        ops::sigmoid(&self.out.forward(&h)?)
    }

    fn dim_obs(&self) -> usize {
        self.channels * IMAGE_SIZE * IMAGE_SIZE
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn encoder(style: StyleCode, vs: VarBuilder) -> Result<ConvEncoder> {
        ConvEncoder::new(
            ConvEncoderArgs {
                channels: 1,
                conv_filters: 2,
                kernel_size: 3,
                n_style: 4,
                style,
            },
            vs,
        )
    }

    #[test]
    fn conv_round_trip_shapes() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let enc = encoder(StyleCode::Gaussian, vs.pp("enc"))?;
        let dec = ConvDecoder::new(1, 2, 3, 4, 10, vs.pp("dec"))?;

        let x = Tensor::rand(0f32, 1f32, (3, 1, 32, 32), &dev)?;
        let code = enc.forward_t(&x, None, true)?;
        assert_eq!(code.z.dims(), &[3, 4]);
        assert_eq!(code.kl.as_ref().map(|kl| kl.dims().to_vec()), Some(vec![3]));

        let labels = Tensor::new(&[1u32, 4, 9], &dev)?;
        let y = crate::candle_sampling::one_hot_labels(&labels, 10)?;
        let recon = dec.forward_t(&code.z, Some(&y), true)?;
        assert_eq!(recon.dims(), x.dims());
        Ok(())
    }

    #[test]
    fn style_codes() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let x = Tensor::rand(0f32, 1f32, (2, 1, 32, 32), &dev)?;

        let sig = encoder(StyleCode::Sigmoid, vs.pp("sig"))?.forward_t(&x, None, false)?;
        assert!(sig.kl.is_none());
        assert!(sig.z.min_all()?.to_scalar::<f32>()? >= 0.0);
        assert!(sig.z.max_all()?.to_scalar::<f32>()? <= 1.0);

        let lin = encoder(StyleCode::Linear, vs.pp("lin"))?;
        assert!(lin.forward_t(&x, None, false)?.kl.is_none());

        let wrong = Tensor::rand(0f32, 1f32, (2, 1, 28, 28), &dev)?;
        assert!(lin.forward_t(&wrong, None, false).is_err());
        Ok(())
    }
}
