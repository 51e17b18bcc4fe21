use crate::candle_loss_functions::EPSILON;
use candle_core::{DType, Device, Result, Tensor, D};
use candle_nn::ops;

///
/// z = mu + sigma * eps
/// where eps ~ N(0, 1)
///
/// # Arguments
/// * `z_mean` - mean of Gaussian distribution
/// * `z_lnvar` - log variance of Gaussian distribution
/// * `train` - draw noise if true, otherwise return the mean
pub fn reparameterize(z_mean: &Tensor, z_lnvar: &Tensor, train: bool) -> Result<Tensor> {
    if z_mean.dims() != z_lnvar.dims() {
        candle_core::bail!(
            "mean {:?} and log-variance {:?} must have the same shape",
            z_mean.dims(),
            z_lnvar.dims()
        );
    }

    if train {
        let eps = Tensor::randn_like(z_mean, 0., 1.)?;
        z_mean + (z_lnvar * 0.5)?.exp()? * eps
    } else {
        Ok(z_mean.clone())
    }
}

///
/// Relaxed one-hot sample from a concrete (Gumbel-softmax) distribution
///
/// g = -log(-log(u + eps) + eps), u ~ U(0, 1)
/// c = softmax( (log(α + eps) + g) / τ )
///
/// # Arguments
/// * `alpha_nk` - class probabilities (n x K)
/// * `temperature` - τ > 0; the sample approaches one-hot as τ -> 0
/// * `train` - if false, return the one-hot argmax of `alpha_nk`
pub fn sample_concrete(alpha_nk: &Tensor, temperature: f64, train: bool) -> Result<Tensor> {
    if temperature <= 0.0 || !temperature.is_finite() {
        candle_core::bail!("concrete temperature must be positive, got {}", temperature);
    }

    if !train {
        return argmax_one_hot(alpha_nk);
    }

    let unif = Tensor::rand_like(alpha_nk, 0., 1.)?;
    let gumbel = ((unif + EPSILON)?.log()?.neg()? + EPSILON)?.log()?.neg()?;
    let logits = (((alpha_nk + EPSILON)?.log()? + gumbel)? / temperature)?;
    ops::softmax(&logits, D::Minus1)
}

/// Hard one-hot vector of the largest entry in each row
pub fn argmax_one_hot(prob_nk: &Tensor) -> Result<Tensor> {
    let n_cat = prob_nk.dim(D::Minus1)?;
    let idx_n = prob_nk.argmax(D::Minus1)?;
    one_hot_labels(&idx_n, n_cat)?.to_dtype(prob_nk.dtype())
}

/// One-hot encode integer labels (n) into an (n x K) `f32` matrix
pub fn one_hot_labels(labels_n: &Tensor, n_classes: usize) -> Result<Tensor> {
    candle_nn::encoding::one_hot(labels_n.to_dtype(DType::U32)?, n_classes, 1f32, 0f32)
}

/// Samples of the standard normal prior (n x k)
pub fn sample_standard_normal(n: usize, k: usize, device: &Device) -> Result<Tensor> {
    Tensor::randn(0f32, 1f32, (n, k), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn reparameterized_moments() -> Result<()> {
        let dev = Device::Cpu;
        let n = 20_000;
        let mu = Tensor::full(2f32, (n, 1), &dev)?;
        let lnvar = Tensor::zeros((n, 1), DType::F32, &dev)?;

        let z = reparameterize(&mu, &lnvar, true)?;
        let mean = z.mean_all()?.to_scalar::<f32>()?;
        let var = z
            .broadcast_sub(&z.mean_all()?)?
            .sqr()?
            .mean_all()?
            .to_scalar::<f32>()?;

        assert_abs_diff_eq!(mean, 2.0, epsilon = 0.05);
        assert_abs_diff_eq!(var, 1.0, epsilon = 0.05);
        Ok(())
    }

    #[test]
    fn reparameterize_returns_mean_in_eval() -> Result<()> {
        let dev = Device::Cpu;
        let mu = Tensor::new(&[[0.5f32, -1.0]], &dev)?;
        let lnvar = Tensor::new(&[[3f32, 3.0]], &dev)?;
        let z = reparameterize(&mu, &lnvar, false)?;
        assert_eq!(z.to_vec2::<f32>()?, mu.to_vec2::<f32>()?);

        let bad = Tensor::zeros((1, 3), DType::F32, &dev)?;
        assert!(reparameterize(&mu, &bad, true).is_err());
        Ok(())
    }

    #[test]
    fn concrete_samples_on_simplex() -> Result<()> {
        let dev = Device::Cpu;
        let alpha = ops::softmax(&Tensor::randn(0f32, 1f32, (32, 10), &dev)?, D::Minus1)?;

        for temperature in [0.1, 0.5, 1.0, 5.0] {
            let c = sample_concrete(&alpha, temperature, true)?;
            for s in c.sum(D::Minus1)?.to_vec1::<f32>()? {
                assert_abs_diff_eq!(s, 1.0, epsilon = 1e-4);
            }
        }

        assert!(sample_concrete(&alpha, 0.0, true).is_err());
        Ok(())
    }

    #[test]
    fn concrete_eval_is_one_hot() -> Result<()> {
        let dev = Device::Cpu;
        let alpha = Tensor::new(&[[0.1f32, 0.7, 0.2], [0.6, 0.3, 0.1]], &dev)?;
        let c = sample_concrete(&alpha, 0.5, false)?.to_vec2::<f32>()?;
        assert_eq!(c, vec![vec![0., 1., 0.], vec![1., 0., 0.]]);
        Ok(())
    }
}
