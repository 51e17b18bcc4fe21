use crate::arch::*;
use crate::lentil_common::*;
use crate::lentil_input::*;
use crate::trainer::*;
use crate::visualize::write_features;

use candle_util::candle_data_loader::InMemoryData;
use candle_util::candle_inference::TrainConfig;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[arg(
        long,
        short = 'a',
        required = true,
        help = "Model architecture",
        long_help = "Model architecture, one of:\n\
		     vae, conditional_vae, concrete_vae, sparse_ae, aae,\n\
		     conv_cae, conv_cvae, conv_aae"
    )]
    pub arch: Box<str>,

    #[arg(
        long,
        default_value = DEFAULT_DATA_DIR,
        help = "MNIST directory",
        long_help = "Directory with the MNIST IDX files:\n\
		     {train,t10k}-images-idx3-ubyte[.gz]\n\
		     {train,t10k}-labels-idx1-ubyte[.gz]"
    )]
    pub data_dir: Box<str>,

    #[arg(long, short = 'o', default_value = DEFAULT_OUTPUT, help = "Output directory")]
    pub output: Box<str>,

    #[arg(long, short = 'e', default_value_t = 20, help = "Number of epochs")]
    pub epochs: usize,

    #[arg(
        long,
        short = 'b',
        default_value_t = 100,
        help = "Minibatch size",
        long_help = "Minibatch size; must divide the number of training images"
    )]
    pub batch_size: usize,

    #[arg(
        long,
        help = "Learning rate",
        long_help = "Adam learning rate.\n\
		     Default: 2e-4 for aae, 1e-4 for the conv models, 1e-3 otherwise"
    )]
    pub learning_rate: Option<f32>,

    #[arg(long, value_enum, default_value = "cpu", help = "Candle device")]
    pub device: ComputeDevice,

    #[arg(
        long,
        visible_alias = "gpu",
        default_value_t = 0,
        help = "Device number (cuda or metal)"
    )]
    pub device_no: usize,

    #[arg(long, help = "Restore the variables of this checkpoint before training")]
    pub resume: Option<Box<str>>,

    #[arg(long, default_value_t = 0, help = "Iteration to start counting from")]
    pub start_iteration: usize,

    #[arg(
        long,
        default_value_t = 0,
        help = "Checkpoint every this many iterations",
        long_help = "Checkpoint every this many iterations.\n\
		     The final model is always saved; 0 saves only that one."
    )]
    pub save_every: usize,

    #[arg(
        long,
        default_value_t = 0,
        help = "Write an image grid every this many epochs (0 = only at the end)"
    )]
    pub plot_every: usize,

    #[arg(long, help = "KL weight of conv_cvae")]
    pub beta: Option<f64>,

    #[arg(long, help = "Concrete temperature (> 0)")]
    pub temperature: Option<f64>,

    #[arg(
        long,
        help = "Latent dimension",
        long_help = "Latent dimension.\n\
		     Total latent size for the dense VAEs (continuous + discrete),\n\
		     code size for sparse_ae and aae, style size for the conv models"
    )]
    pub latent_dim: Option<usize>,

    #[arg(long, help = "Discrete latent dimension of concrete_vae")]
    pub latent_disc_dim: Option<usize>,

    #[arg(
        long,
        help = "Weight decay",
        long_help = "Decoupled Adam weight decay of the conv models,\n\
		     or the L2 kernel penalty of sparse_ae"
    )]
    pub weight_decay: Option<f64>,

    #[arg(long, default_value_t = false, help = "Hide the progress bar")]
    pub quiet: bool,

    #[arg(long, short, help = "Verbosity")]
    pub verbose: bool,
}

impl TrainArgs {
    pub fn overrides(&self) -> ArchOverrides {
        ArchOverrides {
            latent_dim: self.latent_dim,
            latent_disc_dim: self.latent_disc_dim,
            beta: self.beta,
            temperature: self.temperature,
            weight_decay: self.weight_decay,
        }
    }
}

/// Labelled in-memory loader for the architectures that need labels
fn data_loader(arch: &Architecture, data: &ImageDataset) -> anyhow::Result<InMemoryData> {
    if arch.needs_labels() {
        InMemoryData::new_with_labels(data.images.clone(), data.labels.clone(), data.n_classes)
    } else {
        InMemoryData::new(data.images.clone())
    }
}

pub fn fit_train(args: &TrainArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let arch = Architecture::from_name(&args.arch)?.with_overrides(&args.overrides())?;
    let device = args.device.to_device(args.device_no)?;

    let data_dir = Path::new(&*args.data_dir);
    let output = PathBuf::from(&*args.output);

    let train_data = load_mnist(data_dir, Split::Train, arch.layout())?;
    let ntrain = train_data.num_samples();

    let train_config = TrainConfig {
        learning_rate: args
            .learning_rate
            .unwrap_or(arch.default_learning_rate() as f32),
        batch_size: args.batch_size,
        num_epochs: args.epochs,
        device: device.clone(),
        verbose: args.verbose,
        show_progress: !args.quiet,
        save_every: args.save_every,
        plot_every: args.plot_every,
        start_iteration: args.start_iteration,
    };

    let mut driver = TrainingDriver::new(arch.clone(), train_config, &output);
    driver.build(Some(ntrain), args.resume.as_deref().map(Path::new))?;

    let mut loader = data_loader(&arch, &train_data)?;
    let loss_trace = driver.train(&mut loader)?;
    if let Some(last) = loss_trace.last() {
        info!("final epoch loss: {}", last);
    }

    driver.visualize("final")?;

    match load_mnist(data_dir, Split::Test, arch.layout()) {
        Ok(test_data) => {
            let cond = if arch.needs_labels() && !arch.is_conv() {
                Some(candle_util::candle_sampling::one_hot_labels(
                    &test_data.labels,
                    test_data.n_classes,
                )?)
            } else {
                None
            };
            let z = driver.extract_features(&test_data.images, cond.as_ref())?;
            let file = output.join(format!("{}_features.tsv", arch.name()));
            write_features(&z, Some(&test_data.labels), &file)?;
        }
        Err(e) => {
            warn!("skipping test features: {}", e);
        }
    }

    Ok(())
}
