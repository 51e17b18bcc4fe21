use crate::candle_data_loader_util::*;
use crate::candle_sampling::one_hot_labels;
use candle_core::{DType, Device, Tensor};

pub struct MinibatchData {
    /// (n x d) or (n x c x h x w)
    pub input: Tensor,
    /// integer class labels (n)
    pub labels: Option<Tensor>,
    /// one-hot labels (n x K)
    pub one_hot: Option<Tensor>,
}

/// `DataLoader` for minibatch learning
pub trait DataLoader {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchData>;

    fn num_minibatch(&self) -> usize;

    fn num_samples(&self) -> usize;

    /// Reshuffle and repartition all the samples
    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()>;

    /// Partition the samples in their original order
    fn ordered_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()>;
}

///
/// A simple data loader for an in-memory tensor. Samples are laid
/// along the first axis; anything after that is the feature layout.
///
pub struct InMemoryData {
    input_data: Tensor,
    label_data: Option<Tensor>,
    one_hot_data: Option<Tensor>,
    minibatches: Minibatches,
}

impl InMemoryData {
    ///
    /// Create a data loader with the main data tensor `input`
    ///
    pub fn new(input: Tensor) -> anyhow::Result<Self> {
        let ntot = input.dim(0)?;
        Ok(Self {
            input_data: input,
            label_data: None,
            one_hot_data: None,
            minibatches: Minibatches::new(ntot),
        })
    }

    ///
    /// Create a data loader with the main `input` and integer
    /// `labels` (one-hot encoded into `n_classes` columns)
    ///
    pub fn new_with_labels(input: Tensor, labels: Tensor, n_classes: usize) -> anyhow::Result<Self> {
        let ntot = input.dim(0)?;
        if labels.dims() != [ntot] {
            return Err(anyhow::anyhow!(
                "{} samples but labels of shape {:?}",
                ntot,
                labels.dims()
            ));
        }
        let labels = labels.to_dtype(DType::U32)?;
        let one_hot = one_hot_labels(&labels, n_classes)?;
        Ok(Self {
            input_data: input,
            label_data: Some(labels),
            one_hot_data: Some(one_hot),
            minibatches: Minibatches::new(ntot),
        })
    }
}

impl DataLoader for InMemoryData {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchData> {
        let samples = self.minibatches.chunks.get(batch_idx).ok_or_else(|| {
            anyhow::anyhow!(
                "invalid index = {} vs. total # = {}",
                batch_idx,
                self.num_minibatch()
            )
        })?;

        let input = take_rows(samples, target_device, Some(&self.input_data))?
            .ok_or_else(|| anyhow::anyhow!("empty input"))?;
        let labels = take_rows(samples, target_device, self.label_data.as_ref())?;
        let one_hot = take_rows(samples, target_device, self.one_hot_data.as_ref())?;

        Ok(MinibatchData {
            input,
            labels,
            one_hot,
        })
    }

    fn num_minibatch(&self) -> usize {
        self.minibatches.chunks.len()
    }

    fn num_samples(&self) -> usize {
        self.minibatches.size()
    }

    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        self.minibatches.shuffle_minibatch(batch_size)
    }

    fn ordered_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        self.minibatches.ordered_minibatch(batch_size)
    }
}
