use log::{debug, info};
use ndarray::{Array2, ArrayView1, Ix1};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::traits::{Agent, Transition};
use crate::config::{seeded_rng, JsonConfig};
use crate::env::Space;
use crate::error::{GymkitError, Result};
use crate::memory::{Event, ReplayBuffer};
use crate::policy::{Policy, PolicyConfig};
use crate::schedule::{DecaySchedule, Schedule};
use crate::tensor::{argmax, stack_rows, Tensor};

/// Hyperparameters of [`DqnAgent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqnConfig {
    pub gamma: f32,
    /// Learning rate of the online policy.
    pub learning_rate: f32,
    pub eps_min: f32,
    pub eps_max: f32,
    /// Multiplicative ε decay applied on every action.
    pub eps_decay: f32,
    pub replay_batch_size: usize,
    /// Episodes between target-network synchronizations.
    pub update_target_episodes: usize,
    pub memory_size: usize,
    pub policy: PolicyConfig,
    pub seed: Option<u64>,
}

impl Default for DqnConfig {
    fn default() -> Self {
        DqnConfig {
            gamma: 0.99,
            learning_rate: 0.001,
            eps_min: 0.01,
            eps_max: 1.0,
            eps_decay: 0.995,
            replay_batch_size: 20,
            update_target_episodes: 10,
            memory_size: 10_000,
            policy: PolicyConfig::default(),
            seed: None,
        }
    }
}

impl JsonConfig for DqnConfig {}

impl DqnConfig {
    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn epsilon(mut self, eps_max: f32, eps_min: f32, eps_decay: f32) -> Self {
        self.eps_max = eps_max;
        self.eps_min = eps_min;
        self.eps_decay = eps_decay;
        self
    }

    pub fn replay_batch_size(mut self, replay_batch_size: usize) -> Self {
        self.replay_batch_size = replay_batch_size;
        self
    }

    pub fn update_target_episodes(mut self, update_target_episodes: usize) -> Self {
        self.update_target_episodes = update_target_episodes;
        self
    }

    pub fn memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
    }

    pub fn policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.replay_batch_size == 0 {
            return Err(GymkitError::invalid_parameter("replay_batch_size", "must be positive"));
        }
        if self.update_target_episodes == 0 {
            return Err(GymkitError::invalid_parameter("update_target_episodes", "must be positive"));
        }
        if self.memory_size < self.replay_batch_size {
            return Err(GymkitError::invalid_parameter(
                "memory_size",
                format!("{} cannot hold a batch of {}", self.memory_size, self.replay_batch_size),
            ));
        }
        Ok(())
    }

    pub(crate) fn epsilon_schedule(&self) -> DecaySchedule {
        DecaySchedule::new(self.eps_max, self.eps_min, self.eps_decay)
    }
}

pub fn default_config() -> DqnConfig {
    DqnConfig::default()
}

/// Largest entry of a row of action values.
pub(crate) fn max_value(row: ArrayView1<f32>) -> f32 {
    row.fold(f32::NEG_INFINITY, |max, &q| max.max(q))
}

/// Deep Q-Network agent
///
/// Learns action values with an online policy regressed against a delayed
/// target policy. Every step is stored in a ring buffer; once it holds a
/// full batch, each [`DqnAgent::learn`] fits the online policy on a uniformly
/// sampled batch. The target policy copies the online parameters every
/// `update_target_episodes` episodes.
#[derive(Debug)]
pub struct DqnAgent {
    policy: Policy,
    target: Policy,
    memory: ReplayBuffer<Event>,
    action_space: Space,
    n_actions: usize,
    epsilon: DecaySchedule,
    last_epsilon: f32,
    gamma: f32,
    batch_size: usize,
    update_target_episodes: usize,
    episodes: usize,
    rng: StdRng,
}

impl DqnAgent {
    /// Agent for flat observations of `input_size` features.
    pub fn new(input_size: usize, action_space: Space, config: DqnConfig) -> Result<Self> {
        let n_actions = action_space.n_actions()?;
        let policy_config = config.policy.clone().learning_rate(config.learning_rate);
        let policy = Policy::new("dqn", input_size, n_actions, &policy_config)?;
        Self::from_policy(policy, action_space, config)
    }

    /// Agent around an existing online policy. The target starts as a copy.
    pub fn from_policy(policy: Policy, action_space: Space, config: DqnConfig) -> Result<Self> {
        config.validate()?;
        let n_actions = action_space.n_actions()?;
        if policy.output_size() != n_actions {
            return Err(GymkitError::shape_mismatch(n_actions, policy.output_size()));
        }
        let target = policy.clone();
        let epsilon = config.epsilon_schedule();
        Ok(DqnAgent {
            policy,
            target,
            memory: ReplayBuffer::new(config.memory_size),
            action_space,
            n_actions,
            last_epsilon: epsilon.initial(),
            epsilon,
            gamma: config.gamma,
            batch_size: config.replay_batch_size,
            update_target_episodes: config.update_target_episodes,
            episodes: 0,
            rng: seeded_rng(config.seed),
        })
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }

    pub fn target(&self) -> &Policy {
        &self.target
    }

    pub fn memory(&self) -> &ReplayBuffer<Event> {
        &self.memory
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }

    /// ε-greedy action. Every call advances the ε schedule.
    pub fn action(&mut self, state: &Tensor) -> Result<usize> {
        self.last_epsilon = self.epsilon.value();
        if self.rng.gen::<f32>() < self.last_epsilon {
            return self.action_space.sample(&mut self.rng);
        }
        let q_values = self.policy.predict(state)?;
        Ok(argmax(q_values.view().into_dimensionality::<Ix1>()?))
    }

    pub fn remember(&mut self, event: Event) -> Result<()> {
        if event.action >= self.n_actions {
            return Err(GymkitError::ActionOutOfRange { action: event.action, n_actions: self.n_actions });
        }
        self.memory.remember(event);
        Ok(())
    }

    /// Fit the online policy on one sampled batch.
    ///
    /// Returns `None` without training while the memory holds fewer events
    /// than a batch.
    pub fn learn(&mut self) -> Result<Option<f32>> {
        if self.memory.len() < self.batch_size {
            return Ok(None);
        }
        let batch = self.memory.sample(self.batch_size, &mut self.rng)?;
        let states: Vec<&Tensor> = batch.iter().map(|e| &e.state).collect();
        let next_states: Vec<&Tensor> = batch.iter().map(|e| &e.outcome.observation).collect();
        let states = stack_rows(&states)?;
        let next_states = stack_rows(&next_states)?;

        let mut labels: Array2<f32> = self.policy.predict_batch(states.view())?;
        let next_q = self.target.predict_batch(next_states.view())?;
        for (i, event) in batch.iter().enumerate() {
            let reward = event.outcome.reward;
            labels[[i, event.action]] = if event.outcome.done {
                reward
            } else {
                reward + self.gamma * max_value(next_q.row(i))
            };
        }

        let loss = self.policy.fit_batch(states.view(), labels.view())?;
        debug!("dqn batch loss {:.6}", loss);
        Ok(Some(loss))
    }

    /// Copy the online parameters into the target policy.
    pub fn update_target(&mut self) -> Result<()> {
        self.policy.copy_learnables_to(&mut self.target)?;
        info!("synced target network after {} episodes", self.episodes);
        Ok(())
    }

    /// Count a finished episode and sync the target when due.
    pub fn finish_episode(&mut self) -> Result<()> {
        self.episodes += 1;
        if self.episodes % self.update_target_episodes == 0 {
            self.update_target()?;
        }
        Ok(())
    }
}

impl Agent for DqnAgent {
    fn act(&mut self, state: &Tensor, _goal: Option<&Tensor>) -> Result<usize> {
        self.action(state)
    }

    fn learn(&mut self, transition: &Transition<'_>) -> Result<()> {
        self.remember(Event::new(
            transition.state.clone(),
            transition.action,
            transition.outcome.clone(),
        ))?;
        DqnAgent::learn(self)?;
        Ok(())
    }

    fn end_episode(&mut self, _episode: usize) -> Result<()> {
        self.finish_episode()
    }

    fn exploration_rate(&self) -> Option<f32> {
        Some(self.last_epsilon)
    }
}
