use anyhow::anyhow;
use candle_core::{Device, Tensor};
use rand::prelude::SliceRandom;

///
/// A helper `struct` for shuffling and creating minibatch indexes;
/// after `shuffle_minibatch` is called, `chunks` partition indexes.
///
pub struct Minibatches {
    pub samples: Vec<usize>,
    pub chunks: Vec<Vec<usize>>,
}

impl Minibatches {
    pub fn new(ntot: usize) -> Self {
        Self {
            samples: (0..ntot).collect(),
            chunks: vec![],
        }
    }

    /// Shuffle all samples and cut them into `size / batch_size`
    /// disjoint chunks. Every sample appears exactly once per epoch.
    pub fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        if batch_size == 0 || self.size() % batch_size != 0 {
            return Err(anyhow!(
                "{} samples can't be split into minibatches of {}",
                self.size(),
                batch_size
            ));
        }

        let mut rng = rand::rng();
        self.samples.shuffle(&mut rng);

        self.chunks = self
            .samples
            .chunks(batch_size)
            .map(|c| c.to_vec())
            .collect();
        Ok(())
    }

    /// Contiguous chunks in the original order (the last one may be short)
    pub fn ordered_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        if batch_size == 0 {
            return Err(anyhow!("batch size must be positive"));
        }
        self.samples.sort_unstable();
        self.chunks = self
            .samples
            .chunks(batch_size)
            .map(|c| c.to_vec())
            .collect();
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }
}

/// Gather rows `samples` of `data` (samples on the first axis) onto
/// the target device
pub fn take_rows(
    samples: &[usize],
    target_device: &Device,
    data: Option<&Tensor>,
) -> anyhow::Result<Option<Tensor>> {
    if let Some(data) = data {
        let ntot = data.dim(0)?;
        if let Some(&bad) = samples.iter().find(|&&i| i >= ntot) {
            return Err(anyhow!("invalid index = {} vs. total # = {}", bad, ntot));
        }
        let idx = Tensor::from_iter(samples.iter().map(|&i| i as u32), data.device())?;
        Ok(Some(data.index_select(&idx, 0)?.to_device(target_device)?))
    } else {
        // if the data doesn't exist
        Ok(None)
    }
}
