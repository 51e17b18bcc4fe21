use thiserror::Error;

/// Configuration problems caught before any training step
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown architecture `{0}`; choose one of: {1}")]
    UnknownArchitecture(String, String),

    #[error("training data size {samples} is not divisible by batch size {batch_size}")]
    IndivisibleBatch { samples: usize, batch_size: usize },

    #[error("latent dims don't add up: {cont} continuous + {disc} discrete != {total}")]
    LatentDimMismatch {
        total: usize,
        cont: usize,
        disc: usize,
    },

    #[error("architecture `{0}` needs a latent dimension above zero")]
    ZeroLatentDim(String),

    #[error("architecture `{0}` has no discrete latent code; only concrete_vae does")]
    NoDiscreteLatent(String),

    #[error("concrete temperature must be positive and finite, got {0}")]
    InvalidTemperature(f64),

    #[error("architecture `{0}` needs class labels")]
    MissingLabels(String),
}
