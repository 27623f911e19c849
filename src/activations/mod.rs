//! # Activation Functions
//!
//! Activations applied to dense layer outputs.
//!
//! - **Relu**: `max(0, x)`, the default for hidden layers
//! - **Linear**: identity, used for Q-value and critic heads
//! - **Sigmoid** and **Tanh**: squashing activations
//! - **Softmax**: row-wise normalisation for policy heads (REINFORCE, PPO actor)
//!
//! ```rust,no_run
//! use gymkit::activations::Activation;
//! use ndarray::array;
//!
//! let mut logits = array![[1.0, 2.0, 0.5]];
//! Activation::Softmax.apply_batch(&mut logits);
//! ```

pub mod functions;

pub use functions::Activation;
