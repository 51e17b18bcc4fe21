use crate::arch::*;
use crate::lentil_common::*;
use crate::trainer::TrainingDriver;

use candle_util::candle_inference::TrainConfig;
use std::path::Path;

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[arg(long, short = 'a', required = true, help = "Model architecture")]
    pub arch: Box<str>,

    #[arg(
        long,
        required = true,
        help = "Checkpoint file",
        long_help = "Checkpoint file written by `lentil train`:\n\
		     {output}/{arch}_ep{E}_wdecay{w}/model/{time}_{iteration}/model.ckpt\n\
		     The architecture options must match the trained model."
    )]
    pub resume: Box<str>,

    #[arg(long, short = 'o', default_value = DEFAULT_OUTPUT, help = "Output directory")]
    pub output: Box<str>,

    #[arg(long, default_value = "generated", help = "Image file tag: {output}/{arch}_{tag}.png")]
    pub tag: Box<str>,

    #[arg(long, help = "Latent dimension used in training")]
    pub latent_dim: Option<usize>,

    #[arg(long, help = "Discrete latent dimension used in training")]
    pub latent_disc_dim: Option<usize>,

    #[arg(long, value_enum, default_value = "cpu", help = "Candle device")]
    pub device: ComputeDevice,

    #[arg(long, visible_alias = "gpu", default_value_t = 0, help = "Device number")]
    pub device_no: usize,

    #[arg(long, short, help = "Verbosity")]
    pub verbose: bool,
}

pub fn generate_images(args: &GenerateArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let over = ArchOverrides {
        latent_dim: args.latent_dim,
        latent_disc_dim: args.latent_disc_dim,
        ..Default::default()
    };
    let arch = Architecture::from_name(&args.arch)?.with_overrides(&over)?;

    let config = TrainConfig {
        learning_rate: arch.default_learning_rate() as f32,
        batch_size: 100,
        num_epochs: 0,
        device: args.device.to_device(args.device_no)?,
        verbose: args.verbose,
        show_progress: false,
        save_every: 0,
        plot_every: 0,
        start_iteration: 0,
    };

    let mut driver = TrainingDriver::new(arch, config, Path::new(&*args.output));
    driver.build(None, Some(Path::new(&*args.resume)))?;
    let file = driver.visualize(&args.tag)?;
    info!("Generated {}", file.display());
    Ok(())
}
