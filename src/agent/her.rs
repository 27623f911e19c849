use log::debug;
use ndarray::{Array2, Ix1};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::dqn::{max_value, DqnConfig};
use super::traits::{Agent, Transition};
use crate::config::{seeded_rng, JsonConfig};
use crate::env::Space;
use crate::error::{GymkitError, Result};
use crate::memory::{EpisodicMemory, HerEvent};
use crate::policy::Policy;
use crate::schedule::{DecaySchedule, Schedule};
use crate::tensor::{argmax, concat, flatten, stack_rows, Tensor};

/// Hyperparameters of [`HerAgent`]: the DQN settings plus the reward that
/// marks a reached goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HerConfig {
    #[serde(flatten)]
    pub dqn: DqnConfig,
    pub successful_reward: f32,
}

impl Default for HerConfig {
    fn default() -> Self {
        HerConfig { dqn: DqnConfig::default(), successful_reward: 0.0 }
    }
}

impl JsonConfig for HerConfig {}

impl HerConfig {
    pub fn dqn(mut self, dqn: DqnConfig) -> Self {
        self.dqn = dqn;
        self
    }

    pub fn successful_reward(mut self, successful_reward: f32) -> Self {
        self.successful_reward = successful_reward;
        self
    }
}

pub fn default_config() -> HerConfig {
    HerConfig::default()
}

/// Deep copies of `events` retargeted at the final observation of the
/// episode.
///
/// The last copy is marked terminal with `successful_reward`; the other
/// copies keep their outcomes.
pub fn relabel(events: &[HerEvent], successful_reward: f32) -> Vec<HerEvent> {
    let Some(last) = events.last() else {
        return Vec::new();
    };
    let achieved = last.outcome.observation.clone();
    let mut relabeled: Vec<HerEvent> = events
        .iter()
        .cloned()
        .map(|mut event| {
            event.goal = achieved.clone();
            event
        })
        .collect();
    if let Some(final_event) = relabeled.last_mut() {
        final_event.outcome.reward = successful_reward;
        final_event.outcome.done = true;
    }
    relabeled
}

/// Goal-conditioned DQN with hindsight experience replay.
///
/// The policy sees `concat(state, goal)`. Steps of the running episode are
/// buffered and moved to the long-term memory when the episode ends; a
/// failed episode is replayed once more with its final observation as the
/// goal.
#[derive(Debug)]
pub struct HerAgent {
    policy: Policy,
    target: Policy,
    memory: EpisodicMemory<HerEvent>,
    action_space: Space,
    n_actions: usize,
    epsilon: DecaySchedule,
    last_epsilon: f32,
    gamma: f32,
    batch_size: usize,
    update_target_episodes: usize,
    successful_reward: f32,
    episodes: usize,
    rng: StdRng,
}

impl HerAgent {
    /// Agent for flat observations of `state_size` features and goals of
    /// `goal_size` features.
    pub fn new(state_size: usize, goal_size: usize, action_space: Space, config: HerConfig) -> Result<Self> {
        let n_actions = action_space.n_actions()?;
        let policy_config = config.dqn.policy.clone().learning_rate(config.dqn.learning_rate);
        let policy = Policy::new("her", state_size + goal_size, n_actions, &policy_config)?;
        Self::from_policy(policy, action_space, config)
    }

    pub fn from_policy(policy: Policy, action_space: Space, config: HerConfig) -> Result<Self> {
        config.dqn.validate()?;
        let n_actions = action_space.n_actions()?;
        if policy.output_size() != n_actions {
            return Err(GymkitError::shape_mismatch(n_actions, policy.output_size()));
        }
        let target = policy.clone();
        let epsilon = config.dqn.epsilon_schedule();
        Ok(HerAgent {
            policy,
            target,
            memory: EpisodicMemory::with_size_limit(config.dqn.memory_size),
            action_space,
            n_actions,
            last_epsilon: epsilon.initial(),
            epsilon,
            gamma: config.dqn.gamma,
            batch_size: config.dqn.replay_batch_size,
            update_target_episodes: config.dqn.update_target_episodes,
            successful_reward: config.successful_reward,
            episodes: 0,
            rng: seeded_rng(config.dqn.seed),
        })
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn target(&self) -> &Policy {
        &self.target
    }

    pub fn memory(&self) -> &EpisodicMemory<HerEvent> {
        &self.memory
    }

    pub fn successful_reward(&self) -> f32 {
        self.successful_reward
    }

    fn input(state: &Tensor, goal: &Tensor) -> Result<Tensor> {
        concat(0, &[&flatten(state).into_dyn(), &flatten(goal).into_dyn()])
    }

    /// ε-greedy action towards `goal`. Every call advances the ε schedule.
    pub fn action(&mut self, state: &Tensor, goal: &Tensor) -> Result<usize> {
        self.last_epsilon = self.epsilon.value();
        if self.rng.gen::<f32>() < self.last_epsilon {
            return self.action_space.sample(&mut self.rng);
        }
        let q_values = self.policy.predict(&Self::input(state, goal)?)?;
        Ok(argmax(q_values.view().into_dimensionality::<Ix1>()?))
    }

    /// Append a step to the running episode.
    pub fn record(&mut self, event: HerEvent) -> Result<()> {
        if event.action >= self.n_actions {
            return Err(GymkitError::ActionOutOfRange { action: event.action, n_actions: self.n_actions });
        }
        self.memory.record(event);
        Ok(())
    }

    /// Copy the events of one episode into the long-term memory.
    pub fn remember(&mut self, events: &[HerEvent]) {
        for event in events {
            self.memory.remember(event.clone());
        }
    }

    /// Whether any step of the episode earned the successful reward.
    pub fn is_success(&self, events: &[HerEvent]) -> bool {
        events.iter().any(|e| e.outcome.reward == self.successful_reward)
    }

    /// Fit the online policy on one batch sampled from the long-term memory.
    pub fn learn(&mut self) -> Result<Option<f32>> {
        if self.memory.len() < self.batch_size {
            return Ok(None);
        }
        let batch = self.memory.sample(self.batch_size, &mut self.rng)?;
        let mut inputs = Vec::with_capacity(batch.len());
        let mut next_inputs = Vec::with_capacity(batch.len());
        for event in &batch {
            inputs.push(Self::input(&event.state, &event.goal)?);
            next_inputs.push(Self::input(&event.outcome.observation, &event.goal)?);
        }
        let states = stack_rows(&inputs.iter().collect::<Vec<_>>())?;
        let next_states = stack_rows(&next_inputs.iter().collect::<Vec<_>>())?;

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
        debug!("her batch loss {:.6}", loss);
        Ok(Some(loss))
    }

    /// Replay a failed episode as if its final observation had been the goal.
    ///
    /// Each relabeled copy is remembered and followed by a learning step.
    /// The events passed in are left untouched.
    pub fn hindsight(&mut self, events: &[HerEvent]) -> Result<Vec<HerEvent>> {
        let relabeled = relabel(events, self.successful_reward);
        for event in &relabeled {
            self.memory.remember(event.clone());
            self.learn()?;
        }
        Ok(relabeled)
    }

    /// Move the running episode to long-term memory, replay it in hindsight
    /// if it failed, and sync the target when due.
    pub fn finish_episode(&mut self) -> Result<()> {
        let events = self.memory.take_episode();
        self.remember(&events);
        if !events.is_empty() && !self.is_success(&events) {
            self.hindsight(&events)?;
        }
        self.episodes += 1;
        if self.episodes % self.update_target_episodes == 0 {
            self.policy.copy_learnables_to(&mut self.target)?;
            debug!("synced her target network after {} episodes", self.episodes);
        }
        Ok(())
    }
}

fn require_goal(goal: Option<&Tensor>) -> Result<&Tensor> {
    goal.ok_or_else(|| GymkitError::invalid_parameter("goal", "goal-conditioned agent needs a goal"))
}

impl Agent for HerAgent {
    fn act(&mut self, state: &Tensor, goal: Option<&Tensor>) -> Result<usize> {
        self.action(state, require_goal(goal)?)
    }

    fn learn(&mut self, transition: &Transition<'_>) -> Result<()> {
        let goal = require_goal(transition.goal)?;
        self.record(HerEvent::new(
            transition.state.clone(),
            goal.clone(),
            transition.action,
            transition.outcome.clone(),
        ))?;
        HerAgent::learn(self)?;
        Ok(())
    }

    fn end_episode(&mut self, _episode: usize) -> Result<()> {
        self.finish_episode()
    }

    fn exploration_rate(&self) -> Option<f32> {
        Some(self.last_epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Outcome;
    use crate::policy::PolicyConfig;
    use crate::tensor::vector;

    fn failed_episode() -> Vec<HerEvent> {
        let goal = vector(&[1.0, 1.0]);
        let observations = [vector(&[0.0, 1.0]), vector(&[1.0, 0.0]), vector(&[0.0, 0.0])];
        let mut state = vector(&[0.0, 0.0]);
        observations
            .iter()
            .enumerate()
            .map(|(i, o)| {
                let outcome = Outcome { observation: o.clone(), action: i % 2, reward: -1.0, done: i == 2 };
                let event = HerEvent::new(state.clone(), goal.clone(), i % 2, outcome);
                state = o.clone();
                event
            })
            .collect()
    }

    fn agent(batch: usize) -> HerAgent {
        let dqn = DqnConfig::default()
            .replay_batch_size(batch)
            .policy(PolicyConfig::default().hidden(vec![8]).seed(2))
            .seed(2);
        HerAgent::new(2, 2, Space::discrete(2).unwrap(), default_config().dqn(dqn)).unwrap()
    }

    #[test]
    fn test_relabel_targets_final_observation() {
        let events = failed_episode();
        let relabeled = relabel(&events, 0.0);
        let achieved = vector(&[0.0, 0.0]);
        assert!(relabeled.iter().all(|e| e.goal == achieved));
        assert_eq!(relabeled[2].outcome.reward, 0.0);
        assert!(relabeled[2].outcome.done);
        assert_eq!(relabeled[0].outcome.reward, -1.0);
        assert!(!relabeled[0].outcome.done);
        // originals are untouched
        assert_eq!(events[0].goal, vector(&[1.0, 1.0]));
        assert_eq!(events[2].outcome.reward, -1.0);
    }

    #[test]
    fn test_relabel_empty_episode() {
        assert!(relabel(&[], 0.0).is_empty());
    }

    #[test]
    fn test_hindsight_keeps_remembered_originals() {
        let mut agent = agent(2);
        let events = failed_episode();
        agent.remember(&events);
        let relabeled = agent.hindsight(&events).unwrap();

        assert_eq!(agent.memory().len(), 6);
        assert_eq!(&agent.memory().events()[..3], &events[..]);
        assert_eq!(&agent.memory().events()[3..], &relabeled[..]);
    }

    #[test]
    fn test_finish_episode_replays_failures_only() {
        let mut agent = agent(4);
        for event in failed_episode() {
            agent.record(event).unwrap();
        }
        agent.finish_episode().unwrap();
        assert_eq!(agent.memory().len(), 6);
        assert!(agent.memory().episode().is_empty());

        let mut success = failed_episode();
        success[2].outcome.reward = 0.0;
        for event in success {
            agent.record(event).unwrap();
        }
        agent.finish_episode().unwrap();
        assert_eq!(agent.memory().len(), 9);
    }

    #[test]
    fn test_act_requires_goal() {
        let mut agent = agent(1);
        let state = vector(&[0.0, 0.0]);
        assert!(agent.act(&state, None).is_err());
        assert!(agent.act(&state, Some(&vector(&[1.0, 1.0]))).unwrap() < 2);
    }
}
