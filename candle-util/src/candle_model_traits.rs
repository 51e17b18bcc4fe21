use candle_core::{Result, Tensor};

/// What an encoder hands to the decoder and to the loss
pub struct LatentCode {
    /// latent sample fed to the decoder (n x k); labels are appended by the decoder
    pub z: Tensor,
    /// deterministic summary of the continuous part (n x k_cont)
    pub z_mean: Tensor,
    /// per-sample KL divergence against the prior (n), if any
    pub kl: Option<Tensor>,
}

pub trait EncoderModuleT {
    /// An encoder that spits out a latent code
    ///
    /// # Arguments
    /// * `x_nd` - input data (n x d, or n x c x h x w)
    /// * `cond_nc` - conditioning one-hot labels (n x c)
    /// * `train` - whether to sample noise/update batchnorm or not
    fn forward_t(&self, x_nd: &Tensor, cond_nc: Option<&Tensor>, train: bool)
        -> Result<LatentCode>;

    fn dim_obs(&self) -> usize;

    /// dimension of the latent code excluding conditioning
    fn dim_latent(&self) -> usize;
}

pub trait DecoderModuleT {
    /// A decoder that spits out reconstruction
    fn forward_t(&self, z_nk: &Tensor, cond_nc: Option<&Tensor>, train: bool) -> Result<Tensor>;

    /// A decoder that spits out reconstruction and log-likelihood
    /// * `z_nk` - latent states
    /// * `cond_nc` - conditioning labels
    /// * `x_nd` - observed data to validate with
    /// * `llik` - fn (observed, reconstruction) -> log-likelihood
    fn forward_with_llik<LlikFn>(
        &self,
        z_nk: &Tensor,
        cond_nc: Option<&Tensor>,
        x_nd: &Tensor,
        llik: &LlikFn,
    ) -> Result<(Tensor, Tensor)>
    where
        LlikFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
    {
        let recon = self.forward_t(z_nk, cond_nc, true)?;
        let llik = llik(x_nd, &recon)?;
        Ok((recon, llik))
    }

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}

/// Concatenate a latent code with optional conditioning columns
pub fn concat_condition(z_nk: &Tensor, cond_nc: Option<&Tensor>) -> Result<Tensor> {
    match cond_nc {
        Some(cond) => Tensor::cat(&[z_nk, &cond.to_dtype(z_nk.dtype())?], 1),
        None => Ok(z_nk.clone()),
    }
}
