use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{Activation, Optimizer, VarBuilder, VarMap};
use candle_util::candle_checkpoint::*;
use candle_util::candle_decoder_dense::*;
use candle_util::candle_encoder_dense::*;
use candle_util::candle_inference::*;
use candle_util::candle_loss_functions::bernoulli_likelihood;
use candle_util::candle_model_traits::*;

fn build_vae(varmap: &VarMap, dev: &Device) -> Result<(GaussianEncoder, DenseDecoder)> {
    let vs = VarBuilder::from_varmap(varmap, DType::F32, dev);
    let encoder = GaussianEncoder::new(
        GaussianEncoderArgs {
            n_features: 9,
            n_cond: 0,
            n_latent_cont: 2,
            n_latent_disc: 3,
            layers: &[6],
            temperature: 0.5,
        },
        vs.pp("enc"),
    )?;
    let decoder = DenseDecoder::new(
        9,
        5,
        0,
        &[6],
        Activation::Relu,
        OutputActivation::Sigmoid,
        vs.pp("dec"),
    )?;
    Ok((encoder, decoder))
}

#[test]
fn vae_trains_and_restores_from_checkpoint() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let varmap = VarMap::new();
    let (encoder, decoder) = build_vae(&varmap, &dev)?;
    assert_eq!(encoder.dim_latent(), decoder.dim_latent());

    let mut adam = AdamArgs::new(1e-2).build(vars_with_prefix(&varmap, &["enc.", "dec."]))?;

    let x = Tensor::rand(0f32, 1f32, (8, 9), &dev)?.ge(0.5)?.to_dtype(DType::F32)?;
    for _ in 0..3 {
        let code = encoder.forward_t(&x, None, true)?;
        let (recon, llik) = decoder.forward_with_llik(&code.z, None, &x, &bernoulli_likelihood)?;
        assert_eq!(recon.dims(), x.dims());
        let kl = code.kl.ok_or_else(|| anyhow::anyhow!("kl"))?;
        let loss = (kl - llik)?.mean_all()?;
        assert!(loss.to_scalar::<f32>()?.is_finite());
        adam.backward_step(&loss)?;
    }

    let z = Tensor::new(&[[0.1f32, -0.3, 0.0, 1.0, 0.0]], &dev)?;
    let trained = decoder.forward_t(&z, None, false)?.to_vec2::<f32>()?;

    let tmp = tempfile::tempdir()?;
    let path = save_checkpoint(&varmap, tmp.path(), 3)?;
    assert!(path.ends_with(CHECKPOINT_FILE));

    let mut fresh = VarMap::new();
    let (_, fresh_decoder) = build_vae(&fresh, &dev)?;
    assert_ne!(fresh_decoder.forward_t(&z, None, false)?.to_vec2::<f32>()?, trained);

    load_checkpoint(&mut fresh, &path)?;
    assert_eq!(fresh_decoder.forward_t(&z, None, false)?.to_vec2::<f32>()?, trained);
    Ok(())
}
