use crate::arch::ConvParams;
use crate::models::*;

use candle_core::Tensor;
use candle_nn::{AdamW, Module, Optimizer, VarBuilder, VarMap};
use candle_util::candle_conv_modules::*;
use candle_util::candle_data_loader::MinibatchData;
use candle_util::candle_discriminator::LatentDiscriminator;
use candle_util::candle_inference::{vars_with_prefix, AdamArgs};
use candle_util::candle_loss_functions::{mean_squared_error, sigmoid_cross_entropy_with_logits};
use candle_util::candle_model_traits::*;
use candle_util::candle_sampling::sample_standard_normal;

///
/// Convolutional adversarial autoencoder on the style code.
///
/// One forward pass feeds three objectives:
/// * reconstruction mse over encoder and decoder
/// * discriminator bce on `[style; N(0, 1)]` (fake first, then real)
/// * generator bce of the style half against "real", encoder only
///
pub struct ConvAae {
    encoder: ConvEncoder,
    decoder: ConvDecoder,
    discriminator: LatentDiscriminator,
    recon_adam: AdamW,
    disc_adam: AdamW,
    gen_adam: AdamW,
}

impl ConvAae {
    pub fn new(
        params: &ConvParams,
        vs: &VarBuilder,
        varmap: &VarMap,
        learning_rate: f64,
    ) -> anyhow::Result<Self> {
        let encoder = ConvEncoder::new(
            ConvEncoderArgs {
                channels: params.channels,
                conv_filters: params.conv_filters,
                kernel_size: params.kernel_size,
                n_style: params.style_size,
                style: StyleCode::Linear,
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

        let discriminator = LatentDiscriminator::new(
            params.style_size,
            &params.disc_layers,
            params.disc_leaky_slope,
            vs.pp("disc"),
        )?;

        let adam = AdamArgs::new(learning_rate).with_weight_decay(params.weight_decay);
        let recon_adam = adam.build(vars_with_prefix(varmap, &["enc.", "dec."]))?;
        let disc_adam = adam.build(vars_with_prefix(varmap, &["disc."]))?;
        let gen_adam = adam.build(vars_with_prefix(varmap, &["enc."]))?;

        Ok(Self {
            encoder,
            decoder,
            discriminator,
            recon_adam,
            disc_adam,
            gen_adam,
        })
    }
}

impl GenerativeModelT for ConvAae {
    fn train_step(&mut self, mb: &MinibatchData) -> anyhow::Result<StepLoss> {
        let x_nchw = &mb.input;
        let y_nc = required_one_hot(mb, "conv_aae")?;

        let style_nk = self.encoder.forward_t(x_nchw, None, true)?.z;
        let recon = self.decoder.forward_t(&style_nk, Some(y_nc), true)?;
        let mse = mean_squared_error(x_nchw, &recon)?;

        let (nn, kk) = style_nk.dims2()?;
        let prior_nk = sample_standard_normal(nn, kk, x_nchw.device())?;
        let mixed = Tensor::cat(&[&style_nk, &prior_nk], 0)?;
        let logits = self.discriminator.forward(&mixed)?;
        let d_fake = logits.narrow(0, 0, nn)?;
        let d_real = logits.narrow(0, nn, nn)?;

        let ones = d_real.ones_like()?;
        let zeros = d_fake.zeros_like()?;

        let loss_real = sigmoid_cross_entropy_with_logits(&d_real, &ones)?.mean_all()?;
        let loss_fake = sigmoid_cross_entropy_with_logits(&d_fake, &zeros)?.mean_all()?;
        let d_loss = ((loss_real + loss_fake)? * 0.5)?;
        let g_loss = sigmoid_cross_entropy_with_logits(&d_fake, &ones)?.mean_all()?;

        let loss_val = finite_scalar(&mse, "conv_aae reconstruction")?;
        let d_loss_val = finite_scalar(&d_loss, "conv_aae discriminator")?;
        let g_loss_val = finite_scalar(&g_loss, "conv_aae generator")?;

        // all gradients come from the same variable values
        let recon_grads = mse.backward()?;
        let disc_grads = d_loss.backward()?;
        let gen_grads = g_loss.backward()?;

        self.recon_adam.step(&recon_grads)?;
        self.disc_adam.step(&disc_grads)?;
        self.gen_adam.step(&gen_grads)?;

        Ok(StepLoss {
            loss: loss_val,
            parts: vec![("d_loss", d_loss_val), ("g_loss", g_loss_val)],
        })
    }

    fn generate(&self, z_nk: &Tensor, cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor> {
        Ok(self.decoder.forward_t(z_nk, cond_nc, false)?)
    }

    fn extract_features(&self, x: &Tensor, _cond_nc: Option<&Tensor>) -> anyhow::Result<Tensor> {
        Ok(self.encoder.forward_t(x, None, false)?.z_mean)
    }
}
