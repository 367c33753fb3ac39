//! # Activation Functions Module
//!
//! Element-wise non-linearities used by the dense layers of the actor, critic
//! and semantic networks. Every activation exposes the forward map and its
//! derivative with respect to the pre-activation value, both operating on a
//! whole minibatch at once.
//!
//! ## Available Activations
//!
//! - **ReLU**: `max(0, x)` - hidden layers
//! - **LeakyReLU**: ReLU with a small negative slope
//! - **Tanh**: outputs in `[-1, 1]`
//! - **Sigmoid**: outputs in `[0, 1]`
//! - **Linear**: identity, used for every output layer so bounded action
//!   parameters are handled by inverting gradients instead of squashing

pub mod functions;

pub use functions::Activation;
