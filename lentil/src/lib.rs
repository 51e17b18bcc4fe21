pub mod arch;
pub mod error;
pub mod fit_train;
pub mod generate;
pub mod lentil_common;
pub mod lentil_input;
pub mod model_conv_aae;
pub mod model_conv_ae;
pub mod model_dense_aae;
pub mod model_dense_vae;
pub mod model_sparse_ae;
pub mod models;
pub mod trainer;
pub mod visualize;
