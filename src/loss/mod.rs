//! Loss functions used to fit policies.
//!
//! [`MSE`] trains Q networks and critics, [`CrossEntropyLoss`] trains
//! REINFORCE policies against return-weighted action targets, and [`PpoLoss`]
//! carries the clipped surrogate objective together with its side inputs.

pub mod functions;
pub mod ppo;

pub use functions::{CrossEntropyLoss, Loss, MSE};
pub use ppo::PpoLoss;
