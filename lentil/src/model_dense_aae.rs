use crate::arch::DenseAaeParams;
use crate::models::*;

use candle_core::Tensor;
use candle_nn::{Activation, AdamW, Optimizer, VarBuilder, VarMap};
use candle_util::candle_data_loader::MinibatchData;
use candle_util::candle_decoder_dense::*;
use candle_util::candle_discriminator::LatentDiscriminator;
use candle_util::candle_encoder_dense::*;
use candle_util::candle_inference::{vars_with_prefix, AdamArgs};
use candle_util::candle_loss_functions::mean_squared_error;
use candle_util::candle_model_traits::*;
use candle_util::candle_sampling::sample_standard_normal;

///
/// Adversarial autoencoder with a standard normal prior on the code.
///
/// Each step first updates the discriminator on prior samples (real)
/// against detached codes (fake), then the encoder and decoder on
/// `w_rec * mse + w_adv * bce(disc(code), real)`.
///
pub struct DenseAae {
    encoder: DenseEncoder,
    decoder: DenseDecoder,
    discriminator: LatentDiscriminator,
    recon_weight: f64,
    adversarial_weight: f64,
    ae_adam: AdamW,
    disc_adam: AdamW,
}

impl DenseAae {
    pub fn new(
        params: &DenseAaeParams,
        vs: &VarBuilder,
        varmap: &VarMap,
        learning_rate: f64,
    ) -> anyhow::Result<Self> {
        let act = Activation::LeakyRelu(params.leaky_slope);

        let encoder = DenseEncoder::new(
            params.input_dim,
            params.latent_dim,
            &params.hidden_layers,
            act,
            None,
            vs.pp("enc"),
        )?;

        let decoder_layers: Vec<usize> = params.hidden_layers.iter().rev().cloned().collect();
        let decoder = DenseDecoder::new(
            params.input_dim,
            params.latent_dim,
            0,
            &decoder_layers,
            act,
            OutputActivation::Tanh,
            vs.pp("dec"),
        )?;

        let discriminator = LatentDiscriminator::new(
            params.latent_dim,
            &params.disc_layers,
            params.leaky_slope,
            vs.pp("disc"),
        )?;

        let adam = AdamArgs::new(learning_rate).with_beta1(params.beta1);
        let ae_adam = adam.build(vars_with_prefix(varmap, &["enc.", "dec."]))?;
        let disc_adam = adam.build(vars_with_prefix(varmap, &["disc."]))?;

        Ok(Self {
            encoder,
            decoder,
            discriminator,
            recon_weight: params.recon_weight,
            adversarial_weight: params.adversarial_weight,
            ae_adam,
            disc_adam,
        })
    }
}

impl GenerativeModelT for DenseAae {
    fn train_step(&mut self, mb: &MinibatchData) -> anyhow::Result<StepLoss> {
        let x_nd = &mb.input;
        let (nn, kk) = (x_nd.dims2()?.0, self.encoder.dim_latent());

        // discriminator: prior is real, codes are fake
        let fake_nk = self.encoder.forward_t(x_nd, None, true)?.z.detach();
        let real_nk = sample_standard_normal(nn, kk, x_nd.device())?;

        let d_real = self.discriminator.loss_against(&real_nk, 1.0)?;
        let d_fake = self.discriminator.loss_against(&fake_nk, 0.0)?;
        let d_loss = ((d_real + d_fake)? * 0.5)?;
        let d_loss_val = finite_scalar(&d_loss, "discriminator")?;
        let d_acc = 0.5
            * (self.discriminator.accuracy(&real_nk, 1.0)?
                + self.discriminator.accuracy(&fake_nk, 0.0)?);
        self.disc_adam.backward_step(&d_loss)?;

        // autoencoder: reconstruct and fool the discriminator
        let z_nk = self.encoder.forward_t(x_nd, None, true)?.z;
        let recon_nd = self.decoder.forward_t(&z_nk, None, true)?;
        let mse = mean_squared_error(x_nd, &recon_nd)?;
        let g_loss = self.discriminator.loss_against(&z_nk, 1.0)?;

        let loss = ((&mse * self.recon_weight)? + (&g_loss * self.adversarial_weight)?)?;
        let loss_val = finite_scalar(&loss, "aae")?;
        self.ae_adam.backward_step(&loss)?;

        Ok(StepLoss {
            loss: loss_val,
            parts: vec![
                ("d_loss", d_loss_val),
                ("d_acc", d_acc),
                ("g_loss", g_loss.to_scalar::<f32>()?),
                ("mse", mse.to_scalar::<f32>()?),
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
