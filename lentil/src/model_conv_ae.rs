use crate::arch::ConvParams;
use crate::models::*;

use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer, VarBuilder, VarMap};
use candle_util::candle_conv_modules::*;
use candle_util::candle_data_loader::MinibatchData;
use candle_util::candle_inference::{vars_with_prefix, AdamArgs};
use candle_util::candle_loss_functions::mean_squared_error;
use candle_util::candle_model_traits::*;

///
/// Convolutional autoencoder that splits an image into a learned
/// style code and its (given) digit label.
///
/// * `conv_cae`: sigmoid style, loss = mse
/// * `conv_cvae`: Gaussian style, loss = mse + beta * KL
///
pub struct ConvAe {
    encoder: ConvEncoder,
    decoder: ConvDecoder,
    beta: f64,
    adam: AdamW,
}

impl ConvAe {
    pub fn new(
        params: &ConvParams,
        gaussian: bool,
        vs: &VarBuilder,
        varmap: &VarMap,
        learning_rate: f64,
    ) -> anyhow::Result<Self> {
        let style = if gaussian {
            StyleCode::Gaussian
        } else {
            StyleCode::Sigmoid
        };

        let encoder = ConvEncoder::new(
            ConvEncoderArgs {
                channels: params.channels,
                conv_filters: params.conv_filters,
                kernel_size: params.kernel_size,
                n_style: params.style_size,
                style,
            },
            vs.pp("enc"),
        )?;

        let decoder = ConvDecoder::new(
            params.channels,
            params.conv_filters,
            params.kernel_size,
            params.style_size,
            params.content_size,
            vs.pp("dec"),
        )?;

        let adam = AdamArgs::new(learning_rate)
            .with_weight_decay(params.weight_decay)
            .build(vars_with_prefix(varmap, &["enc.", "dec."]))?;

        Ok(Self {
            encoder,
            decoder,
            beta: params.beta,
            adam,
        })
    }

    fn arch_name(&self) -> &'static str {
        match self.encoder.style() {
            StyleCode::Gaussian => "conv_cvae",
            _ => "conv_cae",
        }
    }
}

impl GenerativeModelT for ConvAe {
    fn train_step(&mut self, mb: &MinibatchData) -> anyhow::Result<StepLoss> {
        let x_nchw = &mb.input;
        let y_nc = required_one_hot(mb, self.arch_name())?;

        let code = self.encoder.forward_t(x_nchw, None, true)?;
        let recon = self.decoder.forward_t(&code.z, Some(y_nc), true)?;
        let mse = mean_squared_error(x_nchw, &recon)?;

        let (loss, parts) = match code.kl {
            Some(kl_n) => {
                let kl = kl_n.mean_all()?;
                let loss = (&mse + (&kl * self.beta)?)?;
                let parts = vec![
                    ("mse", mse.to_scalar::<f32>()?),
                    ("kl", kl.to_scalar::<f32>()?),
                ];
                (loss, parts)
            }
            None => {
                let parts = vec![("mse", mse.to_scalar::<f32>()?)];
                (mse, parts)
            }
        };

        let loss_val = finite_scalar(&loss, self.arch_name())?;
        self.adam.backward_step(&loss)?;

        Ok(StepLoss {
            loss: loss_val,
            parts,
        })
    }

    fn generate(&self, z_nk: &Tensor, cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor> {
        Ok(self.decoder.forward_t(z_nk, cond_nc, false)?)
    }

    fn extract_features(&self, x: &Tensor, _cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor> {
        Ok(self.encoder.forward_t(x, None, false)?.z_mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_util::candle_sampling::one_hot_labels;

    fn params() -> ConvParams {
        ConvParams {
            channels: 1,
            conv_filters: 2,
            kernel_size: 3,
            style_size: 4,
            content_size: 10,
            beta: 1.0,
            weight_decay: 1e-4,
            disc_layers: vec![8],
            disc_leaky_slope: 0.3,
        }
    }

    fn minibatch(dev: &Device) -> anyhow::Result<MinibatchData> {
        let labels = Tensor::new(&[0u32, 3, 7, 9], dev)?;
        Ok(MinibatchData {
            input: Tensor::rand(0f32, 1f32, (4, 1, 32, 32), dev)?,
            one_hot: Some(one_hot_labels(&labels, 10)?),
            labels: Some(labels),
        })
    }

    #[test]
    fn conv_cvae_reports_mse_and_kl() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let mut model = ConvAe::new(&params(), true, &vs, &varmap, 1e-4)?;
        let mb = minibatch(&dev)?;
        let step = model.train_step(&mb)?;
        assert!(step.loss.is_finite());
        assert_eq!(step.parts.len(), 2);

        let z = model.extract_features(&mb.input, None)?;
        assert_eq!(z.dims(), &[4, 4]);
        let x_hat = model.generate(&z, mb.one_hot.as_ref())?;
        assert_eq!(x_hat.dims(), &[4, 1, 32, 32]);
        Ok(())
    }

    #[test]
    fn conv_cae_needs_labels() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let mut model = ConvAe::new(&params(), false, &vs, &varmap, 1e-4)?;
        let mut mb = minibatch(&dev)?;
        let step = model.train_step(&mb)?;
        assert_eq!(step.parts.len(), 1);

        mb.one_hot = None;
        assert!(model.train_step(&mb).is_err());
        Ok(())
    }
}
