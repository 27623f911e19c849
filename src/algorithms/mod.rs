//! # Policy-gradient and evolutionary agents
//!
//! - **ReinforceAgent**: Monte-Carlo policy gradient on discounted,
//!   z-normalized episode returns
//! - **PpoAgent**: actor-critic with generalized advantage estimation
//!   ([`gae`]) and the clipped surrogate loss
//! - **Evolver**: natural evolution strategies over the flat weights of a
//!   [`BlackBox`]; [`NesAgent`] and [`EnvBlackBox`] evolve a linear policy
//!   on a live environment
//!
//! ```rust,no_run
//! use gymkit::algorithms::nes::{self, BlackBox, Evaluation, Evolver};
//! use gymkit::error::Result;
//! use ndarray::{array, Array1, ArrayView1};
//!
//! struct Sphere;
//!
//! impl BlackBox for Sphere {
//!     fn init_weights(&self) -> Result<Array1<f32>> {
//!         Ok(Array1::zeros(2))
//!     }
//!
//!     fn run(&self, w: ArrayView1<f32>) -> Result<Evaluation> {
//!         let d = &w - &array![1.0, -1.0];
//!         Ok(Evaluation::new(-d.dot(&d)))
//!     }
//! }
//!
//! let mut evolver = Evolver::new(Sphere, nes::default_config().seed(1)).unwrap();
//! let best = evolver.evolve().unwrap().weights;
//! ```

pub mod nes;
pub mod ppo;
pub mod reinforce;

pub use nes::{BlackBox, EnvBlackBox, Evaluation, Evolution, Evolver, NesAgent, NesConfig};
pub use ppo::{gae, PpoAgent, PpoConfig};
pub use reinforce::{discounted_returns, ReinforceAgent, ReinforceConfig};
