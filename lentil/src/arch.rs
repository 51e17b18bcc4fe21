use crate::lentil_common::*;
use crate::lentil_input::ImageLayout;

pub const ARCH_NAMES: [&str; 8] = [
    "vae",
    "conditional_vae",
    "concrete_vae",
    "sparse_ae",
    "aae",
    "conv_cae",
    "conv_cvae",
    "conv_aae",
];

/// Continuous (Gaussian) and discrete (concrete) parts of a latent code
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatentSpec {
    pub cont: usize,
    pub disc: usize,
}

impl LatentSpec {
    pub fn new(total: usize, cont: usize, disc: usize) -> Result<Self, ConfigError> {
        if cont + disc != total || cont == 0 {
            return Err(ConfigError::LatentDimMismatch { total, cont, disc });
        }
        Ok(Self { cont, disc })
    }

    pub fn gaussian(dim: usize) -> Self {
        Self { cont: dim, disc: 0 }
    }

    pub fn total(&self) -> usize {
        self.cont + self.disc
    }
}

/// Dense VAE family (plain, conditional, concrete)
#[derive(Clone, Debug, PartialEq)]
pub struct DenseVaeParams {
    pub input_dim: usize,
    /// number of label classes fed to encoder and decoder (0 = none)
    pub n_classes: usize,
    pub encoder_layers: Vec<usize>,
    pub decoder_layers: Vec<usize>,
    pub latent: LatentSpec,
    pub temperature: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SparseAeParams {
    pub input_dim: usize,
    pub hidden_layers: Vec<usize>,
    pub code_dim: usize,
    pub sparsity_target: f64,
    pub sparsity_weight: f64,
    pub l2_weight: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DenseAaeParams {
    pub input_dim: usize,
    pub hidden_layers: Vec<usize>,
    pub latent_dim: usize,
    pub disc_layers: Vec<usize>,
    pub leaky_slope: f64,
    pub recon_weight: f64,
    pub adversarial_weight: f64,
    pub beta1: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConvParams {
    pub channels: usize,
    pub conv_filters: usize,
    pub kernel_size: usize,
    pub style_size: usize,
    pub content_size: usize,
    /// KL weight of the beta-VAE
    pub beta: f64,
    pub weight_decay: f64,
    pub disc_layers: Vec<usize>,
    pub disc_leaky_slope: f64,
}

/// Closed set of architectures; each carries its own hyperparameters
#[derive(Clone, Debug, PartialEq)]
pub enum Architecture {
    Vae(DenseVaeParams),
    ConditionalVae(DenseVaeParams),
    ConcreteVae(DenseVaeParams),
    SparseAe(SparseAeParams),
    Aae(DenseAaeParams),
    ConvCae(ConvParams),
    ConvCvae(ConvParams),
    ConvAae(ConvParams),
}

/// Command-line overrides applied on top of the defaults
#[derive(Clone, Debug, Default)]
pub struct ArchOverrides {
    pub latent_dim: Option<usize>,
    pub latent_disc_dim: Option<usize>,
    pub beta: Option<f64>,
    pub temperature: Option<f64>,
    pub weight_decay: Option<f64>,
}

const MNIST_DIM: usize = MNIST_SIZE * MNIST_SIZE;

fn conv_defaults(conv_filters: usize) -> ConvParams {
    ConvParams {
        channels: 1,
        conv_filters,
        kernel_size: 3,
        style_size: 32,
        content_size: MNIST_CLASSES,
        beta: 1.0,
        weight_decay: 0.0,
        disc_layers: vec![512],
        disc_leaky_slope: candle_util::candle_aux_layers::CONV_LEAKY_SLOPE,
    }
}

impl Architecture {
    ///
    /// Default hyperparameters for MNIST
    ///
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        let arch = match name {
            "vae" => Architecture::Vae(DenseVaeParams {
                input_dim: MNIST_DIM,
                n_classes: 0,
                encoder_layers: vec![256],
                decoder_layers: vec![256],
                latent: LatentSpec::gaussian(2),
                temperature: 0.5,
            }),
            "conditional_vae" => Architecture::ConditionalVae(DenseVaeParams {
                input_dim: MNIST_DIM,
                n_classes: MNIST_CLASSES,
                encoder_layers: vec![256, 128],
                decoder_layers: vec![128, 256],
                latent: LatentSpec::gaussian(2),
                temperature: 0.5,
            }),
            "concrete_vae" => Architecture::ConcreteVae(DenseVaeParams {
                input_dim: MNIST_DIM,
                n_classes: 0,
                encoder_layers: vec![256, 128],
                decoder_layers: vec![128, 256],
                latent: LatentSpec::new(2 + MNIST_CLASSES, 2, MNIST_CLASSES)?,
                temperature: 0.5,
            }),
            "sparse_ae" => Architecture::SparseAe(SparseAeParams {
                input_dim: MNIST_DIM,
                hidden_layers: vec![256],
                code_dim: 32,
                sparsity_target: 0.05,
                sparsity_weight: 3.0,
                l2_weight: 0.003,
            }),
            "aae" => Architecture::Aae(DenseAaeParams {
                input_dim: MNIST_DIM,
                hidden_layers: vec![512, 512],
                latent_dim: 8,
                disc_layers: vec![512, 256],
                leaky_slope: 0.2,
                recon_weight: 0.999,
                adversarial_weight: 0.001,
                beta1: 0.5,
            }),
            "conv_cae" => Architecture::ConvCae(conv_defaults(8)),
            "conv_cvae" => Architecture::ConvCvae(conv_defaults(8)),
            "conv_aae" => Architecture::ConvAae(conv_defaults(4)),
            _ => {
                return Err(ConfigError::UnknownArchitecture(
                    name.to_string(),
                    ARCH_NAMES.join(", "),
                ))
            }
        };
        Ok(arch)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Vae(_) => "vae",
            Architecture::ConditionalVae(_) => "conditional_vae",
            Architecture::ConcreteVae(_) => "concrete_vae",
            Architecture::SparseAe(_) => "sparse_ae",
            Architecture::Aae(_) => "aae",
            Architecture::ConvCae(_) => "conv_cae",
            Architecture::ConvCvae(_) => "conv_cvae",
            Architecture::ConvAae(_) => "conv_aae",
        }
    }

    ///
    /// Apply command-line overrides; returns a new record
    ///
    pub fn with_overrides(self, over: &ArchOverrides) -> Result<Self, ConfigError> {
        if let Some(t) = over.temperature {
            if t <= 0.0 || !t.is_finite() {
                return Err(ConfigError::InvalidTemperature(t));
            }
        }

        if over.latent_dim == Some(0) {
            return Err(ConfigError::ZeroLatentDim(self.name().to_string()));
        }

        let has_disc = over.latent_disc_dim.is_some_and(|d| d > 0);
        if has_disc && !matches!(self, Architecture::ConcreteVae(_)) {
            return Err(ConfigError::NoDiscreteLatent(self.name().to_string()));
        }

        let arch = match self {
            Architecture::Vae(p) => Architecture::Vae(dense_vae_overrides(p, over)?),
            Architecture::ConditionalVae(p) => {
                Architecture::ConditionalVae(dense_vae_overrides(p, over)?)
            }
            Architecture::ConcreteVae(p) => Architecture::ConcreteVae(dense_vae_overrides(p, over)?),
            Architecture::SparseAe(p) => Architecture::SparseAe(SparseAeParams {
                code_dim: over.latent_dim.unwrap_or(p.code_dim),
                l2_weight: over.weight_decay.unwrap_or(p.l2_weight),
                ..p
            }),
            Architecture::Aae(p) => Architecture::Aae(DenseAaeParams {
                latent_dim: over.latent_dim.unwrap_or(p.latent_dim),
                ..p
            }),
            Architecture::ConvCae(p) => Architecture::ConvCae(conv_overrides(p, over)),
            Architecture::ConvCvae(p) => Architecture::ConvCvae(conv_overrides(p, over)),
            Architecture::ConvAae(p) => Architecture::ConvAae(conv_overrides(p, over)),
        };
        Ok(arch)
    }

    /// Shrink the input to `dim` features (dense) or keep it (conv);
    /// handy for synthetic data
    pub fn with_input_dim(self, dim: usize) -> Self {
        match self {
            Architecture::Vae(p) => Architecture::Vae(DenseVaeParams { input_dim: dim, ..p }),
            Architecture::ConditionalVae(p) => {
                Architecture::ConditionalVae(DenseVaeParams { input_dim: dim, ..p })
            }
            Architecture::ConcreteVae(p) => {
                Architecture::ConcreteVae(DenseVaeParams { input_dim: dim, ..p })
            }
            Architecture::SparseAe(p) => Architecture::SparseAe(SparseAeParams { input_dim: dim, ..p }),
            Architecture::Aae(p) => Architecture::Aae(DenseAaeParams { input_dim: dim, ..p }),
            conv => conv,
        }
    }

    pub fn layout(&self) -> ImageLayout {
        if self.is_conv() {
            ImageLayout::Padded
        } else {
            ImageLayout::Flat
        }
    }

    /// Adam step size used when none is given
    pub fn default_learning_rate(&self) -> f64 {
        match self {
            Architecture::Aae(_) => 2e-4,
            Architecture::ConvCae(_) | Architecture::ConvCvae(_) | Architecture::ConvAae(_) => 1e-4,
            _ => 1e-3,
        }
    }

    pub fn is_conv(&self) -> bool {
        matches!(
            self,
            Architecture::ConvCae(_) | Architecture::ConvCvae(_) | Architecture::ConvAae(_)
        )
    }

    /// Whether training and decoding need class labels
    pub fn needs_labels(&self) -> bool {
        self.n_classes() > 0
    }

    pub fn n_classes(&self) -> usize {
        match self {
            Architecture::ConditionalVae(p) => p.n_classes,
            Architecture::ConvCae(p) | Architecture::ConvCvae(p) | Architecture::ConvAae(p) => {
                p.content_size
            }
            _ => 0,
        }
    }

    pub fn latent(&self) -> LatentSpec {
        match self {
            Architecture::Vae(p) | Architecture::ConditionalVae(p) | Architecture::ConcreteVae(p) => {
                p.latent
            }
            Architecture::SparseAe(p) => LatentSpec::gaussian(p.code_dim),
            Architecture::Aae(p) => LatentSpec::gaussian(p.latent_dim),
            Architecture::ConvCae(p) | Architecture::ConvCvae(p) | Architecture::ConvAae(p) => {
                LatentSpec::gaussian(p.style_size)
            }
        }
    }
}

fn dense_vae_overrides(p: DenseVaeParams, over: &ArchOverrides) -> Result<DenseVaeParams, ConfigError> {
    let latent = match (over.latent_dim, over.latent_disc_dim) {
        (None, None) => p.latent,
        (total, disc) => {
            let disc = disc.unwrap_or(p.latent.disc);
            let total = total.unwrap_or(p.latent.cont + disc);
            if total < disc {
                return Err(ConfigError::LatentDimMismatch {
                    total,
                    cont: 0,
                    disc,
                });
            }
            LatentSpec::new(total, total - disc, disc)?
        }
    };
    Ok(DenseVaeParams {
        latent,
        temperature: over.temperature.unwrap_or(p.temperature),
        ..p
    })
}

fn conv_overrides(p: ConvParams, over: &ArchOverrides) -> ConvParams {
    ConvParams {
        style_size: over.latent_dim.unwrap_or(p.style_size),
        beta: over.beta.unwrap_or(p.beta),
        weight_decay: over.weight_decay.unwrap_or(p.weight_decay),
        ..p
    }
}
