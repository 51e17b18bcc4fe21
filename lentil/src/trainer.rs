use crate::arch::*;
use crate::lentil_common::*;
use crate::models::*;
use crate::visualize::write_latent_grid;

use candle_core::Tensor;
use candle_nn::VarMap;
use candle_util::candle_checkpoint::*;
use candle_util::candle_data_loader::DataLoader;
use candle_util::candle_inference::TrainConfig;
use indicatif::{ProgressBar, ProgressDrawTarget};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq)]
pub enum DriverState {
    Uninitialized,
    Built,
    Training { epoch: usize, iteration: usize },
    Checkpointed { iteration: usize, path: PathBuf },
}

/// Number of minibatches per epoch; the batch size must divide the data
pub fn steps_per_epoch(num_samples: usize, batch_size: usize) -> Result<usize, ConfigError> {
    if batch_size == 0 || num_samples % batch_size != 0 {
        return Err(ConfigError::IndivisibleBatch {
            samples: num_samples,
            batch_size,
        });
    }
    Ok(num_samples / batch_size)
}

/// `<output>/<arch>_ep<epochs>_wdecay<w>`
pub fn run_directory(output: &Path, arch: &Architecture, num_epochs: usize) -> PathBuf {
    let weight_decay = match arch {
        Architecture::SparseAe(p) => p.l2_weight,
        Architecture::ConvCae(p) | Architecture::ConvCvae(p) | Architecture::ConvAae(p) => {
            p.weight_decay
        }
        _ => 0.0,
    };
    output.join(format!(
        "{}_ep{}_wdecay{}",
        arch.name(),
        num_epochs,
        weight_decay
    ))
}

///
/// Builds one model, runs the epoch/minibatch loop and writes
/// checkpoints and image grids along the way
///
pub struct TrainingDriver {
    arch: Architecture,
    config: TrainConfig,
    output: PathBuf,
    dir_header: PathBuf,
    varmap: VarMap,
    model: Option<GenerativeModel>,
    state: DriverState,
    iteration: usize,
}

impl TrainingDriver {
    pub fn new(arch: Architecture, config: TrainConfig, output: &Path) -> Self {
        let dir_header = run_directory(output, &arch, config.num_epochs);
        let iteration = config.start_iteration;
        Self {
            arch,
            config,
            output: output.to_path_buf(),
            dir_header,
            varmap: VarMap::new(),
            model: None,
            state: DriverState::Uninitialized,
            iteration,
        }
    }

    ///
    /// Validate the configuration, instantiate the network and
    /// optionally restore its variables
    ///
    /// * `num_samples` - training set size to check against the batch size
    /// * `resume` - checkpoint file of a model with the same topology
    ///
    pub fn build(&mut self, num_samples: Option<usize>, resume: Option<&Path>) -> anyhow::Result<()> {
        if let Some(ntot) = num_samples {
            steps_per_epoch(ntot, self.config.batch_size)?;
        }

        let model = GenerativeModel::build(
            &self.arch,
            &self.varmap,
            &self.config.device,
            self.config.learning_rate as f64,
        )?;

        if let Some(path) = resume {
            load_checkpoint(&mut self.varmap, path)?;
        }

        self.model = Some(model);
        self.state = DriverState::Built;
        Ok(())
    }

    fn model_ref(&self) -> anyhow::Result<&GenerativeModel> {
        self.model
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("model not built yet"))
    }

    ///
    /// Train for `num_epochs`, reshuffling every epoch; returns the
    /// average loss of each epoch
    ///
    pub fn train<D: DataLoader>(&mut self, data: &mut D) -> anyhow::Result<Vec<f32>> {
        let num_steps = steps_per_epoch(data.num_samples(), self.config.batch_size)?;

        let model = self
            .model
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("model not built yet"))?;

        let pb = ProgressBar::new(self.config.num_epochs as u64);
        if !self.config.show_progress || self.config.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        info!(
            "Training {} for {} epochs x {} steps",
            self.arch.name(),
            self.config.num_epochs,
            num_steps
        );

        let mut loss_trace = Vec::with_capacity(self.config.num_epochs);

        for epoch in 0..self.config.num_epochs {
            data.shuffle_minibatch(self.config.batch_size)?;
            let mut loss_tot = 0f32;

            for b in 0..data.num_minibatch() {
                let mb = data.minibatch_data(b, &self.config.device)?;
                let step = model.train_step(&mb)?;
                loss_tot += step.loss;

                self.iteration += 1;
                self.state = DriverState::Training {
                    epoch,
                    iteration: self.iteration,
                };

                if self.iteration % PRINT_EVERY_ITERATION == 0 {
                    info!("[{}] iteration {}, {}", epoch + 1, self.iteration, step);
                }

                if self.config.save_every > 0 && self.iteration % self.config.save_every == 0 {
                    let path = save_checkpoint(&self.varmap, &self.dir_header, self.iteration)?;
                    self.state = DriverState::Checkpointed {
                        iteration: self.iteration,
                        path,
                    };
                }
            }

            loss_trace.push(loss_tot / num_steps as f32);
            pb.inc(1);

            if self.config.verbose {
                info!(
                    "[{}] average loss: {}",
                    epoch + 1,
                    loss_trace.last().ok_or(anyhow::anyhow!("loss"))?
                );
            }

            if self.config.plot_every > 0 && (epoch + 1) % self.config.plot_every == 0 {
                write_latent_grid(
                    &*model,
                    &self.arch,
                    &self.config.device,
                    &self.output,
                    &format!("ep{}", epoch + 1),
                )?;
            }
        }

        pb.finish_and_clear();
        self.checkpoint()?;
        Ok(loss_trace)
    }

    /// Save all variables under the run directory
    pub fn checkpoint(&mut self) -> anyhow::Result<PathBuf> {
        self.model_ref()?;
        let path = save_checkpoint(&self.varmap, &self.dir_header, self.iteration)?;
        self.state = DriverState::Checkpointed {
            iteration: self.iteration,
            path: path.clone(),
        };
        Ok(path)
    }

    /// Decode the architecture's latent grid into `<output>/<arch>_<tag>.png`
    pub fn visualize(&self, tag: &str) -> anyhow::Result<PathBuf> {
        write_latent_grid(
            self.model_ref()?,
            &self.arch,
            &self.config.device,
            &self.output,
            tag,
        )
    }

    ///
    /// Encoder means of `x` (and labels `cond`), computed one batch
    /// at a time
    ///
    pub fn extract_features(&self, x: &Tensor, cond: Option<&Tensor>) -> anyhow::Result<Tensor> {
        let model = self.model_ref()?;
        let ntot = x.dim(0)?;
        let batch_size = self.config.batch_size.max(1);

        let mut chunks = vec![];
        for lb in (0..ntot).step_by(batch_size) {
            let len = batch_size.min(ntot - lb);
            let x_b = x.narrow(0, lb, len)?.to_device(&self.config.device)?;
            let c_b = match cond {
                Some(c) => Some(c.narrow(0, lb, len)?.to_device(&self.config.device)?),
                None => None,
            };
            chunks.push(model.extract_features(&x_b, c_b.as_ref())?);
        }
        Ok(Tensor::cat(&chunks, 0)?)
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn dir_header(&self) -> &Path {
        &self.dir_header
    }

    pub fn model(&self) -> Option<&GenerativeModel> {
        self.model.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnist_batches() {
        assert_eq!(steps_per_epoch(60000, 100), Ok(600));
        assert_eq!(
            steps_per_epoch(60000, 97),
            Err(ConfigError::IndivisibleBatch {
                samples: 60000,
                batch_size: 97
            })
        );
        assert!(steps_per_epoch(10, 0).is_err());
    }

    #[test]
    fn run_directory_names_the_run() -> anyhow::Result<()> {
        let arch = Architecture::from_name("conv_cvae")?;
        assert_eq!(
            run_directory(Path::new("out"), &arch, 20),
            PathBuf::from("out/conv_cvae_ep20_wdecay0")
        );
        let arch = Architecture::from_name("sparse_ae")?;
        assert_eq!(
            run_directory(Path::new("out"), &arch, 5),
            PathBuf::from("out/sparse_ae_ep5_wdecay0.003")
        );
        Ok(())
    }
}
