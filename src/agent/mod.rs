//! # Reinforcement Learning Agents
//!
//! Value-based agents and the [`Agent`] trait the training harness drives.
//!
//! ## Available Agents
//!
//! - **QAgent**: tabular Q-learning over hashed, discretized observations
//!   - ε-greedy exploration from a [`Schedule`](crate::schedule::Schedule)
//!   - learning rate adapted with a logarithmic decay
//! - **DqnAgent**: Deep Q-Network with a ring replay buffer and a target
//!   network synchronized every few episodes
//! - **HerAgent**: goal-conditioned DQN replaying failed episodes with the
//!   achieved final observation as the goal
//!
//! Policy-gradient and evolutionary agents live in
//! [`algorithms`](crate::algorithms).
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use gymkit::agent::{dqn, DqnAgent};
//! use gymkit::env::Space;
//!
//! // CartPole: 4 observation features, 2 actions
//! let config = dqn::default_config().replay_batch_size(32).seed(7);
//! let mut agent = DqnAgent::new(4, Space::discrete(2).unwrap(), config).unwrap();
//! ```

pub mod dqn;
pub mod her;
pub mod q;
pub mod traits;

pub use dqn::{DqnAgent, DqnConfig};
pub use her::{relabel, HerAgent, HerConfig};
pub use q::{QAgent, QConfig};
pub use traits::{Agent, Transition};
