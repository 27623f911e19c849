//! # gymkit - Reinforcement Learning against Remote Gym Environments
//!
//! gymkit trains reinforcement learning agents on environments served by a
//! Gym-compatible RPC server. It provides the environment client, a small
//! dense neural network stack, replay memories, a metrics tracker and a set
//! of agents driven by a common training harness.
//!
//! ## Key Features
//!
//! - **Environment client**: typed spaces, observation normalizers, video download
//! - **Agents**: tabular Q-learning, DQN, HER, REINFORCE, PPO and NES
//! - **Neural Networks**: dense layers with pluggable losses and optimizers
//! - **Metrics**: append-only tracker with per-episode aggregation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gymkit::agent::{dqn, DqnAgent};
//! use gymkit::env::{EnvOpts, Server};
//! use gymkit::harness::{train, HarnessConfig};
//! use gymkit::metrics::Tracker;
//!
//! # fn main() -> gymkit::error::Result<()> {
//! let server = Server::connect("http://localhost:50051")?;
//! let mut env = server.make("CartPole-v1", EnvOpts::default())?;
//! let features = env.observation_space_shape()?.iter().product();
//! let mut agent = DqnAgent::new(features, env.action_space().clone(), dqn::default_config())?;
//!
//! let tracker = Tracker::new()?;
//! let summary = train(&mut agent, &mut env, &tracker, &HarnessConfig::default().episodes(200))?;
//! println!("mean reward of the last 20 episodes: {}", summary.trailing_mean(20));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`tensor`] - Tensor alias, shape helpers, normalization and hashing
//! - [`schedule`] - Exploration and learning-rate schedules
//! - [`env`] - Environment client, spaces, normalizers and server bring-up
//! - [`metrics`] - Tracker and aggregators
//! - [`memory`] - Replay memories for each agent family
//! - [`qtable`] - Hashed tabular action values
//! - [`activations`], [`layers`], [`loss`], [`optimizer`], [`network`] - Neural network stack
//! - [`policy`] - Network façade used by the agents
//! - [`agent`] - Agent trait and value-based agents
//! - [`algorithms`] - REINFORCE, PPO and NES
//! - [`harness`] - Episode loop
//! - [`error`] - Error types and result handling

pub mod activations;
pub mod agent;
pub mod algorithms;
pub mod config;
pub mod env;
pub mod error;
pub mod harness;
pub mod layers;
pub mod loss;
pub mod memory;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod policy;
pub mod qtable;
pub mod schedule;
pub mod tensor;

#[cfg(test)]
mod tests;
