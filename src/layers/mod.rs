pub mod dense;
pub mod initialization;

pub use dense::{DenseLayer, LayerParams, SharedParams};
pub use initialization::WeightInit;
