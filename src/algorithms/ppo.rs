use log::debug;
use ndarray::{s, Array1, ArrayView1, Axis, Ix1};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::agent::{Agent, Transition};
use crate::config::{seeded_rng, JsonConfig};
use crate::env::Space;
use crate::error::{GymkitError, Result};
use crate::loss::PpoLoss;
use crate::memory::{Events, PpoEvent, RolloutMemory};
use crate::policy::{Policy, PolicyConfig};
use crate::tensor::{one_hot, sample_categorical, z_norm, Tensor};

/// Hyperparameters of [`PpoAgent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpoConfig {
    pub gamma: f32,
    /// GAE smoothing factor.
    pub lambda: f32,
    /// Rollout length collected before each update.
    pub batch_size: usize,
    pub clip: f32,
    pub critic_discount: f32,
    pub entropy_beta: f32,
    /// Passes over each rollout.
    pub epochs: usize,
    pub actor_learning_rate: f32,
    pub critic_learning_rate: f32,
    /// Actor layers; the output activation should be a softmax.
    pub actor: PolicyConfig,
    pub critic: PolicyConfig,
    pub seed: Option<u64>,
}

impl Default for PpoConfig {
    fn default() -> Self {
        PpoConfig {
            gamma: 0.99,
            lambda: 0.95,
            batch_size: 128,
            clip: 0.2,
            critic_discount: 0.5,
            entropy_beta: 0.001,
            epochs: 1,
            actor_learning_rate: 0.001,
            critic_learning_rate: 0.001,
            actor: PolicyConfig::default().hidden(vec![24]).output_activation(Activation::Softmax),
            critic: PolicyConfig::default().hidden(vec![24]),
            seed: None,
        }
    }
}

impl JsonConfig for PpoConfig {}

impl PpoConfig {
    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn lambda(mut self, lambda: f32) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn clip(mut self, clip: f32) -> Self {
        self.clip = clip;
        self
    }

    pub fn critic_discount(mut self, critic_discount: f32) -> Self {
        self.critic_discount = critic_discount;
        self
    }

    pub fn entropy_beta(mut self, entropy_beta: f32) -> Self {
        self.entropy_beta = entropy_beta;
        self
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn learning_rates(mut self, actor: f32, critic: f32) -> Self {
        self.actor_learning_rate = actor;
        self.critic_learning_rate = critic;
        self
    }

    pub fn actor(mut self, actor: PolicyConfig) -> Self {
        self.actor = actor;
        self
    }

    pub fn critic(mut self, critic: PolicyConfig) -> Self {
        self.critic = critic;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

pub fn default_config() -> PpoConfig {
    PpoConfig::default()
}

/// Generalized advantage estimation over a rollout of `T` steps.
///
/// `values` holds the critic value of every step plus a bootstrap value for
/// the state after the last step (`T + 1` entries); `masks` is `1 - done`.
/// Returns `(returns, advantage)`, both of length `T`, with the advantage
/// z-normalized.
pub fn gae(
    values: ArrayView1<f32>,
    masks: ArrayView1<f32>,
    rewards: ArrayView1<f32>,
    gamma: f32,
    lambda: f32,
) -> Result<(Array1<f32>, Array1<f32>)> {
    let steps = rewards.len();
    if masks.len() != steps {
        return Err(GymkitError::shape_mismatch(steps, masks.len()));
    }
    if values.len() != steps + 1 {
        return Err(GymkitError::shape_mismatch(steps + 1, values.len()));
    }

    let mut returns = Array1::zeros(steps);
    let mut running = 0.0;
    for i in (0..steps).rev() {
        let delta = rewards[i] + gamma * values[i + 1] * masks[i] - values[i];
        running = delta + gamma * lambda * masks[i] * running;
        returns[i] = running + values[i];
    }

    let advantage = z_norm((&returns - &values.slice(s![..steps])).view());
    Ok((returns, advantage))
}

/// Action chosen by [`PpoAgent::action`], completed into an event once the
/// outcome is known.
#[derive(Debug, Clone)]
struct PendingStep {
    action: usize,
    action_probs: Array1<f32>,
    q_value: f32,
}

/// Proximal Policy Optimization (PPO) Agent
///
/// Actor-critic agent trained on-policy. Steps are collected into a rollout;
/// once it reaches `batch_size`, the actor is fitted with the clipped
/// surrogate loss against GAE advantages and the critic regresses the GAE
/// returns.
#[derive(Debug)]
pub struct PpoAgent {
    actor: Policy,
    critic: Policy,
    memory: RolloutMemory,
    pending: Option<PendingStep>,
    n_actions: usize,
    config: PpoConfig,
    rng: StdRng,
}

impl PpoAgent {
    pub fn new(input_size: usize, action_space: Space, config: PpoConfig) -> Result<Self> {
        let n_actions = action_space.n_actions()?;
        let actor_config = config.actor.clone().learning_rate(config.actor_learning_rate);
        let critic_config = config.critic.clone().learning_rate(config.critic_learning_rate);
        let actor = Policy::new("actor", input_size, n_actions, &actor_config)?;
        let critic = Policy::new("critic", input_size, 1, &critic_config)?;
        Self::from_policies(actor, critic, config)
    }

    pub fn from_policies(actor: Policy, critic: Policy, config: PpoConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(GymkitError::invalid_parameter("batch_size", "must be positive"));
        }
        if critic.output_size() != 1 {
            return Err(GymkitError::shape_mismatch(1, critic.output_size()));
        }
        if actor.input_size() != critic.input_size() {
            return Err(GymkitError::shape_mismatch(actor.input_size(), critic.input_size()));
        }
        Ok(PpoAgent {
            n_actions: actor.output_size(),
            actor,
            critic,
            memory: RolloutMemory::new(),
            pending: None,
            rng: seeded_rng(config.seed),
            config,
        })
    }

    pub fn actor(&self) -> &Policy {
        &self.actor
    }

    pub fn actor_mut(&mut self) -> &mut Policy {
        &mut self.actor
    }

    pub fn critic(&self) -> &Policy {
        &self.critic
    }

    pub fn memory(&self) -> &RolloutMemory {
        &self.memory
    }

    fn value(&mut self, state: &Tensor) -> Result<f32> {
        let q = self.critic.predict(state)?;
        q.iter().next().copied().ok_or_else(|| GymkitError::shape_mismatch(1, 0))
    }

    fn probs(&mut self, state: &Tensor) -> Result<Array1<f32>> {
        Ok(self.actor.predict(state)?.into_dimensionality::<Ix1>()?)
    }

    /// Sample an action from the actor and remember its probabilities and
    /// the critic's value until the outcome arrives.
    pub fn action(&mut self, state: &Tensor) -> Result<usize> {
        let action_probs = self.probs(state)?;
        let action = sample_categorical(action_probs.view(), &mut self.rng)?;
        let q_value = self.value(state)?;
        self.pending = Some(PendingStep { action, action_probs, q_value });
        Ok(action)
    }

    /// Complete the step taken from `state` and add it to the rollout.
    pub fn remember(&mut self, state: &Tensor, action: usize, reward: f32, done: bool) -> Result<()> {
        let step = match self.pending.take() {
            Some(step) if step.action == action => step,
            _ => PendingStep { action, action_probs: self.probs(state)?, q_value: self.value(state)? },
        };
        self.memory.remember(PpoEvent {
            state: state.clone(),
            action_probs: step.action_probs,
            action_one_hot: one_hot(action, self.n_actions)?,
            q_value: step.q_value,
            mask: if done { 0.0 } else { 1.0 },
            reward,
        });
        Ok(())
    }

    /// Fit actor and critic on a popped rollout.
    ///
    /// `bootstrap` is the critic value of the state following the last step.
    /// Returns the actor and critic losses of the final epoch.
    pub fn update(&mut self, events: &Events, bootstrap: f32) -> Result<(f32, f32)> {
        let batch = events.batch()?;
        let mut values = batch.q_values.to_vec();
        values.push(bootstrap);
        let values = Array1::from(values);
        let (returns, advantage) = gae(
            values.view(),
            batch.masks.view(),
            batch.rewards.view(),
            self.config.gamma,
            self.config.lambda,
        )?;
        let returns = returns.insert_axis(Axis(1));

        let mut losses = (0.0, 0.0);
        for _ in 0..self.config.epochs.max(1) {
            let loss = PpoLoss::new(
                batch.action_probs.clone(),
                advantage.clone(),
                batch.rewards.clone(),
                batch.q_values.clone(),
            )?
            .with_clip(self.config.clip)
            .with_critic_discount(self.config.critic_discount)
            .with_entropy_beta(self.config.entropy_beta);

            let actor_loss = self.actor.fit_batch_with(batch.states.view(), batch.action_one_hots.view(), &loss)?;
            let critic_loss = self.critic.fit_batch(batch.states.view(), returns.view())?;
            losses = (actor_loss, critic_loss);
        }
        debug!("ppo update on {} steps: actor {:.6}, critic {:.6}", events.len(), losses.0, losses.1);
        Ok(losses)
    }

    /// Update once the rollout is full. `next_state` bootstraps the last value.
    pub fn learn(&mut self, next_state: &Tensor) -> Result<Option<(f32, f32)>> {
        if self.memory.len() < self.config.batch_size {
            return Ok(None);
        }
        let bootstrap = self.value(next_state)?;
        let events = self.memory.pop();
        self.update(&events, bootstrap).map(Some)
    }
}

impl Agent for PpoAgent {
    fn act(&mut self, state: &Tensor, _goal: Option<&Tensor>) -> Result<usize> {
        self.action(state)
    }

    fn learn(&mut self, transition: &Transition<'_>) -> Result<()> {
        let outcome = transition.outcome;
        self.remember(transition.state, transition.action, outcome.reward, outcome.done)?;
        PpoAgent::learn(self, &outcome.observation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Outcome;
    use crate::tensor::vector;
    use ndarray::array;

    #[test]
    fn test_gae_worked_example() {
        let values = array![0.0, 0.0, 0.0, 0.0];
        let masks = array![1.0, 1.0, 0.0];
        let rewards = array![1.0, 1.0, 1.0];
        let (returns, advantage) = gae(values.view(), masks.view(), rewards.view(), 1.0, 1.0).unwrap();
        assert_eq!(returns, array![3.0, 2.0, 1.0]);
        assert_eq!(advantage, z_norm(array![3.0, 2.0, 1.0].view()));
    }

    #[test]
    fn test_gae_masks_bootstrap() {
        let values = array![0.5, 10.0];
        let (returns, _) = gae(values.view(), array![0.0].view(), array![1.0].view(), 0.9, 0.95).unwrap();
        assert_eq!(returns, array![1.0]);
        let (returns, _) = gae(values.view(), array![1.0].view(), array![1.0].view(), 0.9, 0.95).unwrap();
        assert!((returns[0] - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_gae_rejects_bad_lengths() {
        let values = array![0.0, 0.0];
        assert!(gae(values.view(), array![1.0, 1.0].view(), array![1.0, 1.0].view(), 0.9, 0.9).is_err());
    }

    #[test]
    fn test_rollout_triggers_update() {
        let config = default_config().batch_size(4).seed(9);
        let mut agent = PpoAgent::new(2, Space::discrete(2).unwrap(), config).unwrap();
        let state = vector(&[0.1, -0.2]);
        let before = agent.actor().learnables();
        for step in 0..4 {
            let action = agent.act(&state, None).unwrap();
            assert!(action < 2);
            let outcome = Outcome { observation: state.clone(), action, reward: 1.0, done: step == 3 };
            let transition = Transition {
                episode: 0,
                timestep: step,
                state: &state,
                goal: None,
                action,
                outcome: &outcome,
            };
            Agent::learn(&mut agent, &transition).unwrap();
        }
        assert!(agent.memory().is_empty());
        assert_ne!(agent.actor().learnables(), before);
    }

    #[test]
    fn test_positive_advantage_raises_probability() {
        let config = default_config().batch_size(2).learning_rates(0.01, 0.01).seed(4);
        let mut agent = PpoAgent::new(2, Space::discrete(2).unwrap(), config).unwrap();
        let good = vector(&[1.0, 0.0]);
        let bad = vector(&[0.0, 1.0]);
        let before = agent.actor_mut().predict(&good).unwrap()[[0]];

        agent.remember(&good, 0, 1.0, true).unwrap();
        agent.remember(&bad, 1, 0.0, true).unwrap();
        let events = agent.memory.pop();
        agent.update(&events, 0.0).unwrap();

        let after = agent.actor_mut().predict(&good).unwrap()[[0]];
        assert!(after > before);
    }
}
