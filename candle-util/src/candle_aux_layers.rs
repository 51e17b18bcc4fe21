use candle_core::{Result, Tensor};
use candle_nn::{
    Activation, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, ConvTranspose2d,
    ConvTranspose2dConfig, Module, ModuleT, VarBuilder,
};

/// build a stack of alternating `M` and `A` layers
pub struct StackLayers<M>
where
    M: Module,
{
    module_layers: Vec<M>,
    activation_layers: Vec<Option<Activation>>,
}

impl<M> Module for StackLayers<M>
where
    M: Module,
{
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut x = input.clone();
        for (module, activation) in self.module_layers.iter().zip(self.activation_layers.iter()) {
            x = module.forward(&x)?;
            if let Some(activation) = activation {
                x = activation.forward(&x)?;
            }
        }
        Ok(x)
    }
}

impl<M> StackLayers<M>
where
    M: Module,
{
    pub fn new() -> Self {
        Self {
            module_layers: Vec::new(),
            activation_layers: Vec::new(),
        }
    }

    /// Appends a layer after all the current layers.
    pub fn push_with_act(&mut self, layer: M, activation: Activation) {
        self.module_layers.push(layer);
        self.activation_layers.push(Some(activation));
    }

    pub fn push(&mut self, layer: M) {
        self.module_layers.push(layer);
        self.activation_layers.push(None);
    }

    /// Output of every layer (after its activation), in order
    pub fn forward_collect(&self, input: &Tensor) -> Result<Vec<Tensor>> {
        let mut ret = Vec::with_capacity(self.module_layers.len());
        let mut x = input.clone();
        for (module, activation) in self.module_layers.iter().zip(self.activation_layers.iter()) {
            x = module.forward(&x)?;
            if let Some(activation) = activation {
                x = activation.forward(&x)?;
            }
            ret.push(x.clone());
        }
        Ok(ret)
    }

    pub fn layers(&self) -> &[M] {
        &self.module_layers
    }

    pub fn len(&self) -> usize {
        self.module_layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.module_layers.is_empty()
    }
}

impl<M> Default for StackLayers<M>
where
    M: Module,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A stack of linear layers sharing one activation
///
/// * `vs` - variables `fc.{j}.weight`, `fc.{j}.bias`
pub fn linear_stack(
    in_dim: usize,
    layers: &[usize],
    activation: Activation,
    vs: VarBuilder,
) -> Result<(StackLayers<candle_nn::Linear>, usize)> {
    let mut fc = StackLayers::<candle_nn::Linear>::new();
    let mut prev_dim = in_dim;
    for (j, &next_dim) in layers.iter().enumerate() {
        let name = format!("fc.{}", j);
        fc.push_with_act(candle_nn::linear(prev_dim, next_dim, vs.pp(name))?, activation);
        prev_dim = next_dim;
    }
    Ok((fc, prev_dim))
}

/// keras-style batch norm: momentum 0.99 on the running statistics
pub fn conv_batch_norm_config() -> BatchNormConfig {
    BatchNormConfig {
        eps: 1e-3,
        remove_mean: true,
        affine: true,
        momentum: 0.01,
    }
}

/// tf.keras `LeakyReLU()` default slope
pub const CONV_LEAKY_SLOPE: f64 = 0.3;

////////////////////////////////////////////
// conv -> batch norm -> leaky relu block //
////////////////////////////////////////////

pub struct ConvBlock {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBlock {
    /// `same`-padded strided convolution with variables under `vs`:
    /// * `conv.weight`, `conv.bias`
    /// * `norm.{weight,bias,running_mean,running_var}`
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        vs: VarBuilder,
    ) -> Result<Self> {
        let config = Conv2dConfig {
            padding: kernel_size / 2,
            stride,
            ..Default::default()
        };
        let conv = candle_nn::conv2d(in_channels, out_channels, kernel_size, config, vs.pp("conv"))?;
        let bn = candle_nn::batch_norm(out_channels, conv_batch_norm_config(), vs.pp("norm"))?;
        Ok(Self { conv, bn })
    }
}

impl ModuleT for ConvBlock {
    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let h = self.conv.forward(x)?;
        let h = self.bn.forward_t(&h, train)?;
        candle_nn::ops::leaky_relu(&h, CONV_LEAKY_SLOPE)
    }
}

//////////////////////////////////////////////////////
// transposed conv -> batch norm -> leaky relu block //
//////////////////////////////////////////////////////

pub struct ConvTransposeBlock {
    deconv: ConvTranspose2d,
    bn: BatchNorm,
}

/// `same`-padded transposed convolution: output = input * stride
pub fn same_conv_transpose2d(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    vs: VarBuilder,
) -> Result<ConvTranspose2d> {
    let config = ConvTranspose2dConfig {
        padding: kernel_size / 2,
        output_padding: stride - 1,
        stride,
        ..Default::default()
    };
    candle_nn::conv_transpose2d(in_channels, out_channels, kernel_size, config, vs)
}

impl ConvTransposeBlock {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        vs: VarBuilder,
    ) -> Result<Self> {
        let deconv =
            same_conv_transpose2d(in_channels, out_channels, kernel_size, stride, vs.pp("deconv"))?;
        let bn = candle_nn::batch_norm(out_channels, conv_batch_norm_config(), vs.pp("norm"))?;
        Ok(Self { deconv, bn })
    }
}

impl ModuleT for ConvTransposeBlock {
    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let h = self.deconv.forward(x)?;
        let h = self.bn.forward_t(&h, train)?;
        candle_nn::ops::leaky_relu(&h, CONV_LEAKY_SLOPE)
    }
}
