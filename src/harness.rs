//! # Training harness
//!
//! Runs an [`Agent`] against an [`Env`] episode by episode, recording the
//! running episode reward and length in a [`Tracker`] after every step.
//!
//! ```rust,no_run
//! use gymkit::agent::{q, QAgent};
//! use gymkit::env::{EnvOpts, EqWidthBinNormalizer, Server};
//! use gymkit::harness::{train, HarnessConfig};
//! use gymkit::metrics::{Aggregator, Tracker};
//!
//! # fn main() -> gymkit::error::Result<()> {
//! let server = Server::connect("http://localhost:50051")?;
//! let normalizer = EqWidthBinNormalizer::new(vec![1, 1, 6, 12])
//!     .with_bounds(vec![-4.8, -0.5, -0.42, -0.87], vec![4.8, 0.5, 0.42, 0.87]);
//! let mut env = server.make("CartPole-v0", EnvOpts::default().normalizer(normalizer))?;
//! let mut agent = QAgent::new(env.action_space().clone(), q::default_config().seed(0))?;
//! let tracker = Tracker::new()?;
//!
//! let summary = train(&mut agent, &mut env, &tracker, &HarnessConfig::default().episodes(30))?;
//! println!("last 10 episodes: {}", summary.trailing_mean(10));
//! let per_episode = tracker.aggregate("episode_reward", Aggregator::Last)?;
//! # Ok(())
//! # }
//! ```

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, Transition};
use crate::config::JsonConfig;
use crate::env::Env;
use crate::error::Result;
use crate::metrics::{Aggregator, TrackOpts, Tracker};

/// Name of the tracked cumulative reward of the running episode.
pub const EPISODE_REWARD: &str = "episode_reward";
/// Name of the tracked step count of the running episode.
pub const EPISODE_STEPS: &str = "episode_steps";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub episodes: usize,
    /// Step cap per episode, on top of the env's own limit.
    pub max_steps: Option<usize>,
    /// Episodes between progress log lines.
    pub log_every: usize,
    /// Window of the trailing mean reported in progress logs.
    pub trailing_window: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig { episodes: 100, max_steps: None, log_every: 10, trailing_window: 10 }
    }
}

impl JsonConfig for HarnessConfig {}

impl HarnessConfig {
    pub fn episodes(mut self, episodes: usize) -> Self {
        self.episodes = episodes;
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn log_every(mut self, log_every: usize) -> Self {
        self.log_every = log_every;
        self
    }

    pub fn trailing_window(mut self, trailing_window: usize) -> Self {
        self.trailing_window = trailing_window;
        self
    }

    /// Effective step limit for an env reporting `env_limit` (0 = unlimited).
    pub fn step_limit(&self, env_limit: usize) -> usize {
        match (self.max_steps, env_limit) {
            (Some(cap), 0) => cap,
            (Some(cap), limit) => cap.min(limit),
            (None, 0) => usize::MAX,
            (None, limit) => limit,
        }
    }
}

pub fn default_config() -> HarnessConfig {
    HarnessConfig::default()
}

/// Iterator over episode indices `0..count`.
#[derive(Debug, Clone)]
pub struct Episodes {
    next: usize,
    count: usize,
    max_steps: usize,
}

impl Episodes {
    pub fn new(count: usize, max_steps: usize) -> Self {
        Episodes { next: 0, count, max_steps }
    }
}

impl Iterator for Episodes {
    type Item = Episode;

    fn next(&mut self) -> Option<Episode> {
        if self.next >= self.count {
            return None;
        }
        let episode = Episode { index: self.next, max_steps: self.max_steps };
        self.next += 1;
        Some(episode)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Episodes {}

/// One episode of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Episode {
    pub index: usize,
    pub max_steps: usize,
}

impl Episode {
    pub fn timesteps(&self) -> Timesteps {
        Timesteps { next: 0, limit: self.max_steps }
    }
}

/// Iterator over the timesteps of an episode, up to its step limit.
#[derive(Debug, Clone)]
pub struct Timesteps {
    next: usize,
    limit: usize,
}

impl Iterator for Timesteps {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.next >= self.limit {
            return None;
        }
        let t = self.next;
        self.next += 1;
        Some(t)
    }
}

/// Per-episode totals of a training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSummary {
    pub episode_rewards: Vec<f32>,
    pub episode_lengths: Vec<usize>,
}

impl TrainingSummary {
    pub fn episodes(&self) -> usize {
        self.episode_rewards.len()
    }

    /// Mean reward of the last `n` episodes; 0 before any episode.
    pub fn trailing_mean(&self, n: usize) -> f32 {
        let start = self.episode_rewards.len().saturating_sub(n);
        let window = &self.episode_rewards[start..];
        if window.is_empty() {
            return 0.0;
        }
        window.iter().sum::<f32>() / window.len() as f32
    }

    /// Mean reward of the up-to-`n` episodes ending at each episode.
    pub fn trailing_means(&self, n: usize) -> Vec<f32> {
        let n = n.max(1);
        (0..self.episode_rewards.len())
            .map(|end| {
                let window = &self.episode_rewards[(end + 1).saturating_sub(n)..=end];
                window.iter().sum::<f32>() / window.len() as f32
            })
            .collect()
    }

    pub fn best_reward(&self) -> Option<f32> {
        self.episode_rewards.iter().copied().reduce(f32::max)
    }
}

fn register(tracker: &Tracker, name: &str) -> Result<()> {
    if !tracker.contains(name) {
        tracker.track_value(name, 0.0, TrackOpts::default().aggregator(Aggregator::Last))?;
    }
    Ok(())
}

/// Run `config.episodes` episodes of `agent` on `env`.
///
/// Each step is adapted, acted, stepped and learned in that order, then
/// logged to `tracker` at `(episode, timestep)`. Any error aborts the run
/// and is returned as is.
pub fn train<A: Agent + ?Sized>(
    agent: &mut A,
    env: &mut Env,
    tracker: &Tracker,
    config: &HarnessConfig,
) -> Result<TrainingSummary> {
    register(tracker, EPISODE_REWARD)?;
    register(tracker, EPISODE_STEPS)?;

    let limit = config.step_limit(env.max_episode_steps());
    let mut summary = TrainingSummary::default();

    for episode in Episodes::new(config.episodes, limit) {
        tracker.zero_value(EPISODE_REWARD)?;
        tracker.zero_value(EPISODE_STEPS)?;

        let first = env.reset()?;
        let goal = first.goal;
        let mut state = first.observation;
        let mut total = 0.0;
        let mut steps = 0;

        for t in episode.timesteps() {
            agent.adapt(episode.index, t);
            let action = agent.act(&state, goal.as_ref())?;
            let outcome = env.step(action)?;
            agent.learn(&Transition {
                episode: episode.index,
                timestep: t,
                state: &state,
                goal: goal.as_ref(),
                action,
                outcome: &outcome,
            })?;

            total += outcome.reward;
            steps += 1;
            tracker.inc_value(EPISODE_REWARD, outcome.reward as f64)?;
            tracker.inc_value(EPISODE_STEPS, 1.0)?;
            tracker.log_step(episode.index, t)?;

            if outcome.done {
                break;
            }
            state = outcome.observation;
        }

        agent.end_episode(episode.index)?;
        summary.episode_rewards.push(total);
        summary.episode_lengths.push(steps);
        debug!("episode {}: reward {} in {} steps", episode.index, total, steps);

        if config.log_every > 0 && (episode.index + 1) % config.log_every == 0 {
            let epsilon = agent
                .exploration_rate()
                .map(|e| format!(", epsilon {:.3}", e))
                .unwrap_or_default();
            info!(
                "episode {}/{}: trailing mean reward {:.2}{}",
                episode.index + 1,
                config.episodes,
                summary.trailing_mean(config.trailing_window),
                epsilon
            );
        }
    }

    tracker.flush()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_iterators() {
        let episodes: Vec<Episode> = Episodes::new(3, 2).collect();
        assert_eq!(episodes.len(), 3);
        assert_eq!(episodes[2].index, 2);
        assert_eq!(episodes[0].timesteps().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(Episodes::new(0, 5).count(), 0);
    }

    #[test]
    fn test_step_limit() {
        let config = default_config();
        assert_eq!(config.step_limit(200), 200);
        assert_eq!(config.step_limit(0), usize::MAX);
        assert_eq!(config.clone().max_steps(50).step_limit(200), 50);
        assert_eq!(config.max_steps(500).step_limit(200), 200);
    }

    #[test]
    fn test_trailing_means() {
        let summary = TrainingSummary {
            episode_rewards: vec![1.0, 3.0, 5.0, 7.0],
            episode_lengths: vec![1, 3, 5, 7],
        };
        assert_eq!(summary.trailing_mean(2), 6.0);
        assert_eq!(summary.trailing_mean(10), 4.0);
        assert_eq!(summary.trailing_means(2), vec![1.0, 2.0, 4.0, 6.0]);
        assert_eq!(summary.best_reward(), Some(7.0));
        assert_eq!(TrainingSummary::default().trailing_mean(5), 0.0);
    }
}
