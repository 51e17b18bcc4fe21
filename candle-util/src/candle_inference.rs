use candle_core::Var;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};

#[derive(Clone, Debug)]
pub struct TrainConfig {
    pub learning_rate: f32,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub device: candle_core::Device,
    pub verbose: bool,
    pub show_progress: bool,
    /// checkpoint every this many iterations (0 = only at the end)
    pub save_every: usize,
    /// write image grids every this many epochs (0 = never)
    pub plot_every: usize,
    /// first iteration index, e.g., when resuming
    pub start_iteration: usize,
}

/// Adam hyperparameters, one set per optimizer
#[derive(Clone, Copy, Debug)]
pub struct AdamArgs {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl AdamArgs {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }

    pub fn with_beta1(self, beta1: f64) -> Self {
        Self { beta1, ..self }
    }

    pub fn with_weight_decay(self, weight_decay: f64) -> Self {
        Self {
            weight_decay,
            ..self
        }
    }

    /// Optimizer over `vars` only
    pub fn build(&self, vars: Vec<Var>) -> candle_core::Result<AdamW> {
        AdamW::new(
            vars,
            ParamsAdamW {
                lr: self.learning_rate,
                beta1: self.beta1,
                beta2: self.beta2,
                eps: self.eps,
                weight_decay: self.weight_decay,
            },
        )
    }
}

/// Variables whose names start with any of `prefixes`, in name order
pub fn vars_with_prefix(varmap: &VarMap, prefixes: &[&str]) -> Vec<Var> {
    let data = varmap.data().lock().unwrap_or_else(|e| e.into_inner());
    let mut named = data
        .iter()
        .filter(|(name, _)| prefixes.iter().any(|p| name.starts_with(p)))
        .map(|(name, var)| (name.clone(), var.clone()))
        .collect::<Vec<_>>();
    named.sort_by(|a, b| a.0.cmp(&b.0));
    named.into_iter().map(|(_, v)| v).collect()
}
