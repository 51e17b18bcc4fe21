pub mod candle_aux_layers;
pub mod candle_checkpoint;
pub mod candle_conv_modules;
pub mod candle_data_loader;
pub mod candle_data_loader_util;
pub mod candle_decoder_dense;
pub mod candle_discriminator;
pub mod candle_encoder_dense;
pub mod candle_inference;
pub mod candle_loss_functions;
pub mod candle_model_traits;
pub mod candle_sampling;

pub use candle_core;
pub use candle_nn;
