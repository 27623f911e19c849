use std::fmt;

use rand::rngs::StdRng;
use rand::Rng;

use super::traits::{Agent, Transition};
use crate::config::seeded_rng;
use crate::env::{Outcome, Space};
use crate::error::{GymkitError, Result};
use crate::qtable::QTable;
use crate::schedule::{DecaySchedule, Schedule};
use crate::tensor::{hash_state, Tensor};

/// Hyperparameters of the tabular Q agent.
///
/// The ε schedule is a trait object, so this config is built in code rather
/// than deserialized.
pub struct QConfig {
    pub epsilon: Box<dyn Schedule>,
    pub gamma: f32,
    /// Learning rate before the first call to [`QAgent::adapt`].
    pub alpha: f32,
    pub alpha_min: f32,
    /// Step count at which the adaptive learning rate starts to fall below 1.
    pub ada_divisor: f32,
    pub seed: Option<u64>,
}

impl fmt::Debug for QConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QConfig")
            .field("epsilon", &self.epsilon)
            .field("gamma", &self.gamma)
            .field("alpha", &self.alpha)
            .field("alpha_min", &self.alpha_min)
            .field("ada_divisor", &self.ada_divisor)
            .field("seed", &self.seed)
            .finish()
    }
}

impl Default for QConfig {
    fn default() -> Self {
        QConfig {
            epsilon: Box::new(DecaySchedule::new(1.0, 0.01, 0.995)),
            gamma: 0.99,
            alpha: 1.0,
            alpha_min: 0.1,
            ada_divisor: 25.0,
            seed: None,
        }
    }
}

impl QConfig {
    pub fn epsilon<S: Schedule + 'static>(mut self, epsilon: S) -> Self {
        self.epsilon = Box::new(epsilon);
        self
    }

    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn alpha_min(mut self, alpha_min: f32) -> Self {
        self.alpha_min = alpha_min;
        self
    }

    pub fn ada_divisor(mut self, ada_divisor: f32) -> Self {
        self.ada_divisor = ada_divisor;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

pub fn default_config() -> QConfig {
    QConfig::default()
}

/// ε-greedy agent learning a [`QTable`] with the Bellman update.
///
/// Observations must be discretized (e.g. with an equal-width bin
/// normalizer) before they reach this agent.
#[derive(Debug)]
pub struct QAgent {
    table: QTable,
    action_space: Space,
    epsilon: Box<dyn Schedule>,
    last_epsilon: f32,
    gamma: f32,
    alpha: f32,
    alpha_min: f32,
    ada_divisor: f32,
    rng: StdRng,
}

impl QAgent {
    pub fn new(action_space: Space, config: QConfig) -> Result<Self> {
        let n_actions = action_space.n_actions()?;
        if config.ada_divisor <= 0.0 {
            return Err(GymkitError::invalid_parameter("ada_divisor", "must be positive"));
        }
        Ok(QAgent {
            table: QTable::new(n_actions),
            action_space,
            last_epsilon: config.epsilon.initial(),
            epsilon: config.epsilon,
            gamma: config.gamma,
            alpha: config.alpha,
            alpha_min: config.alpha_min,
            ada_divisor: config.ada_divisor,
            rng: seeded_rng(config.seed),
        })
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// ε-greedy action. Advances the ε schedule.
    pub fn action(&mut self, state: &Tensor) -> Result<usize> {
        self.last_epsilon = self.epsilon.value();
        if self.rng.gen::<f32>() < self.last_epsilon {
            return self.action_space.sample(&mut self.rng);
        }
        Ok(self.table.get_max(state).0)
    }

    /// Bellman update of `Q(state, action)` towards the outcome.
    pub fn update(&mut self, state: &Tensor, action: usize, outcome: &Outcome) -> Result<f32> {
        let key = hash_state(state);
        let q_old = self.table.get_hashed(key, action)?;
        let (_, q_next) = self.table.get_max(&outcome.observation);
        let q_new = (1.0 - self.alpha) * q_old + self.alpha * (outcome.reward + self.gamma * q_next);
        self.table.set_hashed(key, action, q_new)?;
        Ok(q_new)
    }

    /// Recompute the learning rate for step count `t`:
    /// `max(alpha_min, min(1, 1 - log10((t + 1) / ada_divisor)))`.
    pub fn adapt(&mut self, t: usize) {
        let decayed = 1.0 - ((t as f32 + 1.0) / self.ada_divisor).log10();
        self.alpha = self.alpha_min.max(decayed.min(1.0));
    }
}

impl Agent for QAgent {
    fn act(&mut self, state: &Tensor, _goal: Option<&Tensor>) -> Result<usize> {
        self.action(state)
    }

    fn learn(&mut self, transition: &Transition<'_>) -> Result<()> {
        self.update(transition.state, transition.action, transition.outcome)?;
        Ok(())
    }

    /// The learning rate follows the episode count, re-evaluated every step.
    fn adapt(&mut self, episode: usize, _timestep: usize) {
        QAgent::adapt(self, episode);
    }

    fn exploration_rate(&self) -> Option<f32> {
        Some(self.last_epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ConstantSchedule;
    use crate::tensor::vector;

    fn outcome(observation: Tensor, reward: f32) -> Outcome {
        Outcome { observation, action: 0, reward, done: false }
    }

    #[test]
    fn test_bellman_update() {
        let config = default_config().gamma(0.5).alpha(0.5);
        let mut agent = QAgent::new(Space::discrete(2).unwrap(), config).unwrap();
        let s = vector(&[0.0, 1.0]);
        let next = vector(&[1.0, 1.0]);

        // empty table: q_new = 0.5 * 0 + 0.5 * (1 + 0.5 * 0)
        assert_eq!(agent.update(&s, 1, &outcome(next.clone(), 1.0)).unwrap(), 0.5);
        assert_eq!(agent.table().get(&s, 1).unwrap(), 0.5);

        agent.table.set(&next, 0, 2.0).unwrap();
        // 0.5 * 0.5 + 0.5 * (1 + 0.5 * 2)
        assert_eq!(agent.update(&s, 1, &outcome(next, 1.0)).unwrap(), 1.25);
    }

    #[test]
    fn test_adapt_rule() {
        let mut agent = QAgent::new(Space::discrete(2).unwrap(), default_config().alpha_min(0.1)).unwrap();
        agent.adapt(0);
        assert_eq!(agent.alpha(), 1.0);
        agent.adapt(24);
        assert!((agent.alpha() - 1.0).abs() < 1e-6);
        agent.adapt(249);
        assert!((agent.alpha() - 0.1).abs() < 1e-6);
        agent.adapt(10_000);
        assert_eq!(agent.alpha(), 0.1);
    }

    #[test]
    fn test_greedy_action() {
        let config = default_config().epsilon(ConstantSchedule::new(0.0)).seed(1);
        let mut agent = QAgent::new(Space::discrete(3).unwrap(), config).unwrap();
        let s = vector(&[2.0]);
        agent.table.set(&s, 2, 1.0).unwrap();
        assert_eq!(agent.action(&s).unwrap(), 2);
        assert_eq!(agent.exploration_rate(), Some(0.0));
    }

    #[test]
    fn test_exploration_stays_in_space() {
        let config = default_config().epsilon(ConstantSchedule::new(1.0)).seed(3);
        let mut agent = QAgent::new(Space::discrete(4).unwrap(), config).unwrap();
        for _ in 0..50 {
            assert!(agent.action(&vector(&[0.0])).unwrap() < 4);
        }
    }

    #[test]
    fn test_rejects_box_actions() {
        let space = Space::box_space(vec![0.0], vec![1.0], vec![1]).unwrap();
        assert!(matches!(QAgent::new(space, default_config()), Err(GymkitError::Unsupported(_))));
    }
}
