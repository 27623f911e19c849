//! # Replay memories
//!
//! - [`ReplayBuffer`]: bounded ring of [`Event`]s sampled uniformly (DQN)
//! - [`EpisodicMemory`]: episode buffer plus long-term store of [`HerEvent`]s (HER)
//! - [`RolloutMemory`]: columnar on-policy rollout of [`PpoEvent`]s (PPO)
//! - [`ReinforceMemory`]: one episode of `(state, action, reward)` (REINFORCE)

pub mod episodic;
pub mod reinforce;
pub mod ring;
pub mod rollout;

pub use episodic::EpisodicMemory;
pub use reinforce::{ReinforceMemory, Trajectory};
pub use ring::ReplayBuffer;
pub use rollout::{BatchedEvents, Events, PpoEvent, RolloutMemory};

use crate::env::Outcome;
use crate::tensor::Tensor;

/// A DQN transition: the pre-step observation, the action and its outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub state: Tensor,
    pub action: usize,
    pub outcome: Outcome,
}

impl Event {
    pub fn new(state: Tensor, action: usize, outcome: Outcome) -> Self {
        Event { state, action, outcome }
    }
}

/// A goal-conditioned transition.
///
/// `Clone` copies every tensor, so relabeling a clone never touches the
/// original.
#[derive(Clone, Debug, PartialEq)]
pub struct HerEvent {
    pub state: Tensor,
    pub goal: Tensor,
    pub action: usize,
    pub outcome: Outcome,
}

impl HerEvent {
    pub fn new(state: Tensor, goal: Tensor, action: usize, outcome: Outcome) -> Self {
        HerEvent { state, goal, action, outcome }
    }
}
