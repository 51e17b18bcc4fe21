use candle_core::{Result, Tensor, D};

/// probability floor to keep `log` away from zero
pub const EPSILON: f64 = 1e-8;

/// KL divergence loss between a Gaussian and the standard normal prior
///
/// -0.5 * sum_k (1 + log(sigma^2) - mu^2 - sigma^2)
///
/// * `z_mean` - mean of Gaussian distribution (n x k)
/// * `z_lnvar` - log variance of Gaussian distribution (n x k)
///
/// Returns one value per sample (n); callers average over the batch.
pub fn gaussian_kl_loss(z_mean: &Tensor, z_lnvar: &Tensor) -> Result<Tensor> {
    let z_var = z_lnvar.exp()?;
    (z_var - 1. + z_mean.powf(2.)? - z_lnvar)?.sum(z_mean.rank() - 1)? * 0.5
}

/// KL divergence of a categorical distribution against the uniform one
///
/// kl(i) = sum_k α(i,k) * ( log α(i,k) - log(1/K) )
///
/// * `alpha_nk` - class probabilities (n x K), clipped to `[EPSILON, 1]`
pub fn categorical_kl_loss(alpha_nk: &Tensor) -> Result<Tensor> {
    let n_cat = alpha_nk.dim(D::Minus1)? as f64;
    let alpha_nk = alpha_nk.clamp(EPSILON, 1.0)?;
    (alpha_nk.log()? + n_cat.ln())?
        .mul(&alpha_nk)?
        .sum(D::Minus1)
}

/// Sparse activation penalty (KL between Bernoulli rates)
///
/// p̂(h) = mean_i a(i,h)
/// penalty = weight * sum_h [ p log(p/p̂) + (1-p) log((1-p)/(1-p̂)) ]
///
/// * `act_nh` - hidden activations (n x h)
/// * `target` - target activation probability `p` in (0, 1)
/// * `weight` - sparsity weight
pub fn sparse_kl_penalty(act_nh: &Tensor, target: f64, weight: f64) -> Result<Tensor> {
    if !(target > 0.0 && target < 1.0) {
        candle_core::bail!("sparsity target must be in (0, 1), got {}", target);
    }

    let p = target;
    let q = 1.0 - target;

    let p_hat = act_nh.mean(0)?.clamp(EPSILON, 1.0 - EPSILON)?;

    // p * (log p - log p̂)
    let on_h = p_hat.log()?.affine(-p, p * p.ln())?;
    // (1-p) * (log (1-p) - log (1-p̂))
    let off_h = p_hat.affine(-1.0, 1.0)?.log()?.affine(-q, q * q.ln())?;

    on_h.add(&off_h)?.sum_all()? * weight
}

/// Bernoulli log-likelihood of data in [0, 1]
///
/// llik(i) = sum_d x(i,d) * log p(i,d) + (1 - x(i,d)) * log(1 - p(i,d))
///
/// Equals `-input_dim * binary_cross_entropy` averaged over features.
///
/// * `x_nd` - data tensor (observed data), any shape with samples first
/// * `p_nd` - reconstruction probabilities, same shape
pub fn bernoulli_likelihood(x_nd: &Tensor, p_nd: &Tensor) -> Result<Tensor> {
    let log_p = (p_nd + EPSILON)?.log()?;
    let log_q = (p_nd.affine(-1.0, 1.0)? + EPSILON)?.log()?;

    x_nd.mul(&log_p)?
        .add(&x_nd.affine(-1.0, 1.0)?.mul(&log_q)?)?
        .flatten_from(1)?
        .sum(1)
}

/// Mean squared error over every element
pub fn mean_squared_error(x: &Tensor, hat: &Tensor) -> Result<Tensor> {
    x.sub(hat)?.sqr()?.mean_all()
}

/// Elementwise sigmoid cross entropy on logits
///
/// max(l, 0) - l * y + log(1 + exp(-|l|))
///
/// * `logits` - discriminator logits
/// * `targets` - 0/1 targets of the same shape
pub fn sigmoid_cross_entropy_with_logits(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    let softplus = (logits.abs()?.neg()?.exp()? + 1.0)?.log()?;
    logits
        .relu()?
        .sub(&logits.mul(targets)?)?
        .add(&softplus)
}

/// `lambda * sum_w ||w||^2` over a set of weight tensors
pub fn l2_penalty(weights: &[&Tensor], lambda: f64) -> Result<Tensor> {
    let mut acc: Option<Tensor> = None;
    for w in weights {
        let sq = w.sqr()?.sum_all()?;
        acc = Some(match acc {
            Some(a) => a.add(&sq)?,
            None => sq,
        });
    }
    match acc {
        Some(a) => a * lambda,
        None => candle_core::bail!("l2 penalty needs at least one weight"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candle_core::{DType, Device};

    #[test]
    fn gaussian_kl_vanishes_at_prior() -> Result<()> {
        let dev = Device::Cpu;
        let mu = Tensor::zeros((5, 3), DType::F32, &dev)?;
        let lnvar = Tensor::zeros((5, 3), DType::F32, &dev)?;

        let kl = gaussian_kl_loss(&mu, &lnvar)?;
        assert_eq!(kl.dims(), &[5]);

        for v in kl.to_vec1::<f32>()? {
            assert_eq!(v, 0.0);
        }
        Ok(())
    }

    #[test]
    fn gaussian_kl_is_non_negative() -> Result<()> {
        let dev = Device::Cpu;
        let mu = (Tensor::randn(0f32, 1f32, (64, 4), &dev)? * 3.0)?;
        let lnvar = (Tensor::randn(0f32, 1f32, (64, 4), &dev)? * 2.0)?;

        let kl = gaussian_kl_loss(&mu, &lnvar)?;
        for v in kl.to_vec1::<f32>()? {
            assert!(v >= -1e-5, "negative KL {}", v);
        }
        Ok(())
    }

    #[test]
    fn categorical_kl_bounds() -> Result<()> {
        let dev = Device::Cpu;
        let k = 4_usize;

        let uniform = Tensor::ones((2, k), DType::F32, &dev)?.affine(1.0 / k as f64, 0.0)?;
        let kl = categorical_kl_loss(&uniform)?.to_vec1::<f32>()?;
        for v in kl {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-5);
        }

        let one_hot = Tensor::new(&[[1f32, 0., 0., 0.]], &dev)?;
        let kl = categorical_kl_loss(&one_hot)?.to_vec1::<f32>()?;
        assert_abs_diff_eq!(kl[0], (k as f32).ln(), epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn sparse_penalty_minimized_at_target() -> Result<()> {
        let dev = Device::Cpu;
        let p = 0.05;

        let at_target = Tensor::full(p as f32, (10, 6), &dev)?;
        let zero = sparse_kl_penalty(&at_target, p, 3.0)?.to_scalar::<f32>()?;
        assert_abs_diff_eq!(zero, 0.0, epsilon = 1e-4);

        let near = Tensor::full(0.06f32, (10, 6), &dev)?;
        let far = Tensor::full(0.5f32, (10, 6), &dev)?;
        let near = sparse_kl_penalty(&near, p, 3.0)?.to_scalar::<f32>()?;
        let far = sparse_kl_penalty(&far, p, 3.0)?.to_scalar::<f32>()?;
        assert!(near > 0.0);
        assert!(far > near);

        assert!(sparse_kl_penalty(&at_target, 1.5, 3.0).is_err());
        Ok(())
    }

    #[test]
    fn bernoulli_likelihood_matches_closed_form() -> Result<()> {
        let dev = Device::Cpu;
        let x = Tensor::full(0.5f32, (3, 8), &dev)?;
        let p = Tensor::full(0.5f32, (3, 8), &dev)?;
        let llik = bernoulli_likelihood(&x, &p)?.to_vec1::<f32>()?;
        for v in llik {
            assert_abs_diff_eq!(v, 8.0 * 0.5f32.ln(), epsilon = 1e-4);
        }
        Ok(())
    }

    #[test]
    fn sigmoid_cross_entropy_at_zero_logit() -> Result<()> {
        let dev = Device::Cpu;
        let logits = Tensor::zeros((4, 1), DType::F32, &dev)?;
        let ones = Tensor::ones((4, 1), DType::F32, &dev)?;
        let ce = sigmoid_cross_entropy_with_logits(&logits, &ones)?
            .mean_all()?
            .to_scalar::<f32>()?;
        assert_abs_diff_eq!(ce, 2f32.ln(), epsilon = 1e-5);

        // large logits must not overflow
        let big = Tensor::new(&[[80f32], [-80.]], &dev)?;
        let targets = Tensor::new(&[[1f32], [0.]], &dev)?;
        let ce = sigmoid_cross_entropy_with_logits(&big, &targets)?.to_vec2::<f32>()?;
        assert!(ce.iter().flatten().all(|v| v.is_finite() && *v < 1e-6));
        Ok(())
    }

    #[test]
    fn l2_penalty_sums_squares() -> Result<()> {
        let dev = Device::Cpu;
        let a = Tensor::new(&[1f32, 2.], &dev)?;
        let b = Tensor::new(&[[3f32]], &dev)?;
        let pen = l2_penalty(&[&a, &b], 0.5)?.to_scalar::<f32>()?;
        assert_abs_diff_eq!(pen, 7.0, epsilon = 1e-6);
        assert!(l2_penalty(&[], 1.0).is_err());
        Ok(())
    }
}
