use log::debug;
use ndarray::{Array1, Array2, Ix1};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::agent::{Agent, Transition};
use crate::config::{seeded_rng, JsonConfig};
use crate::env::Space;
use crate::error::{GymkitError, Result};
use crate::loss::CrossEntropyLoss;
use crate::memory::ReinforceMemory;
use crate::policy::{Policy, PolicyConfig};
use crate::tensor::{sample_categorical, stack_rows, z_norm, Tensor};

/// Hyperparameters of [`ReinforceAgent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReinforceConfig {
    pub gamma: f32,
    pub learning_rate: f32,
    /// Policy layers; the output activation should be a softmax.
    pub policy: PolicyConfig,
    pub seed: Option<u64>,
}

impl Default for ReinforceConfig {
    fn default() -> Self {
        ReinforceConfig {
            gamma: 0.99,
            learning_rate: 0.01,
            policy: PolicyConfig::default().hidden(vec![24]).output_activation(Activation::Softmax),
            seed: None,
        }
    }
}

impl JsonConfig for ReinforceConfig {}

impl ReinforceConfig {
    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
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
}

pub fn default_config() -> ReinforceConfig {
    ReinforceConfig::default()
}

/// Discounted return of every step, accumulated back to front:
/// `G_t = r_t + gamma * G_{t+1}`.
pub fn discounted_returns(rewards: &[f32], gamma: f32) -> Array1<f32> {
    let mut returns = Array1::zeros(rewards.len());
    let mut running = 0.0;
    for (t, &reward) in rewards.iter().enumerate().rev() {
        running = reward + gamma * running;
        returns[t] = running;
    }
    returns
}

/// Monte-Carlo policy gradient.
///
/// Stores one episode, then fits the softmax policy with cross-entropy
/// against a matrix holding each step's normalized return in the column of
/// the action taken.
#[derive(Debug)]
pub struct ReinforceAgent {
    policy: Policy,
    memory: ReinforceMemory,
    n_actions: usize,
    gamma: f32,
    rng: StdRng,
}

impl ReinforceAgent {
    pub fn new(input_size: usize, action_space: Space, config: ReinforceConfig) -> Result<Self> {
        let n_actions = action_space.n_actions()?;
        let policy_config = config.policy.clone().learning_rate(config.learning_rate);
        let policy = Policy::new("reinforce", input_size, n_actions, &policy_config)?;
        Ok(Self::from_policy(policy, config))
    }

    pub fn from_policy(policy: Policy, config: ReinforceConfig) -> Self {
        ReinforceAgent {
            n_actions: policy.output_size(),
            policy,
            memory: ReinforceMemory::new(),
            gamma: config.gamma,
            rng: seeded_rng(config.seed),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }

    pub fn memory(&self) -> &ReinforceMemory {
        &self.memory
    }

    /// Sample an action from the policy's distribution.
    pub fn action(&mut self, state: &Tensor) -> Result<usize> {
        let probs = self.policy.predict(state)?;
        sample_categorical(probs.view().into_dimensionality::<Ix1>()?, &mut self.rng)
    }

    pub fn store(&mut self, state: Tensor, action: usize, reward: f32) {
        self.memory.store(state, action, reward);
    }

    /// Fit the policy on the stored episode and clear it.
    ///
    /// Returns `None` when nothing was stored.
    pub fn learn_episode(&mut self) -> Result<Option<f32>> {
        let trajectory = self.memory.pop();
        if trajectory.is_empty() {
            return Ok(None);
        }
        let returns = z_norm(discounted_returns(&trajectory.rewards, self.gamma).view());

        let mut advantage = Array2::zeros((trajectory.len(), self.n_actions));
        for (t, &action) in trajectory.actions.iter().enumerate() {
            advantage[[t, action]] = returns[t];
        }
        let states = stack_rows(&trajectory.states.iter().collect::<Vec<_>>())?;

        let loss = self.policy.fit_batch_with(states.view(), advantage.view(), &CrossEntropyLoss)?;
        debug!("reinforce episode of {} steps, loss {:.6}", trajectory.len(), loss);
        Ok(Some(loss))
    }
}

impl Agent for ReinforceAgent {
    fn act(&mut self, state: &Tensor, _goal: Option<&Tensor>) -> Result<usize> {
        self.action(state)
    }

    fn learn(&mut self, transition: &Transition<'_>) -> Result<()> {
        if transition.action >= self.n_actions {
            return Err(GymkitError::ActionOutOfRange {
                action: transition.action,
                n_actions: self.n_actions,
            });
        }
        self.store(transition.state.clone(), transition.action, transition.outcome.reward);
        if transition.outcome.done {
            self.learn_episode()?;
        }
        Ok(())
    }

    /// Learn from episodes cut off before a terminal step.
    fn end_episode(&mut self, _episode: usize) -> Result<()> {
        self.learn_episode()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::OptimizerWrapper;
    use crate::policy::OptimizerKind;
    use crate::tensor::vector;

    #[test]
    fn test_discounted_returns() {
        let returns = discounted_returns(&[1.0, 1.0, 1.0], 0.5);
        assert_eq!(returns, ndarray::array![1.75, 1.5, 1.0]);
        assert!(discounted_returns(&[], 0.9).is_empty());
    }

    #[test]
    fn test_rewarded_action_becomes_likelier() {
        let config = default_config()
            .gamma(1.0)
            .learning_rate(0.01)
            .policy(default_config().policy.optimizer(OptimizerKind::Sgd).seed(11))
            .seed(11);
        let mut agent = ReinforceAgent::new(2, Space::discrete(2).unwrap(), config).unwrap();
        assert!(matches!(agent.policy().network().optimizer, OptimizerWrapper::SGD(_)));

        let s = vector(&[0.5, -0.5]);
        let before = agent.policy_mut().predict(&s).unwrap()[[0]];
        agent.store(s.clone(), 0, 1.0);
        agent.store(s.clone(), 1, 0.0);
        assert!(agent.learn_episode().unwrap().is_some());
        assert!(agent.memory().is_empty());

        let after = agent.policy_mut().predict(&s).unwrap()[[0]];
        assert!(after > before);
    }

    #[test]
    fn test_empty_episode_is_skipped() {
        let mut agent = ReinforceAgent::new(2, Space::discrete(2).unwrap(), default_config().seed(1)).unwrap();
        assert_eq!(agent.learn_episode().unwrap(), None);
    }

    #[test]
    fn test_sampled_actions_in_range() {
        let mut agent = ReinforceAgent::new(3, Space::discrete(4).unwrap(), default_config().seed(5)).unwrap();
        for _ in 0..20 {
            assert!(agent.action(&vector(&[0.1, 0.2, 0.3])).unwrap() < 4);
        }
    }
}
