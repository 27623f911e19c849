use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use super::normalizer::Normalizer;
use super::space::Space;
use super::transport::{CreateEnvRequest, EnvTransport, Wrapper};
use crate::error::{GymkitError, Result};
use crate::tensor::Tensor;

/// Result of one environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub observation: Tensor,
    pub action: usize,
    pub reward: f32,
    pub done: bool,
}

/// First observation of an episode.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialObservation {
    pub observation: Tensor,
    pub goal: Option<Tensor>,
}

/// Summary of the episodes the server recorded for an env.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvResults {
    pub episodes: usize,
    pub videos: Vec<i32>,
    pub average_reward: f32,
}

/// Options for [`Env::make`].
#[derive(Debug, Default)]
pub struct EnvOpts {
    pub wrappers: Vec<Wrapper>,
    pub normalizer: Option<Box<dyn Normalizer>>,
    pub goal_normalizer: Option<Box<dyn Normalizer>>,
    pub recording: bool,
}

impl EnvOpts {
    pub fn wrapper(mut self, wrapper: Wrapper) -> Self {
        self.wrappers.push(wrapper);
        self
    }

    pub fn normalizer<N: Normalizer + 'static>(mut self, normalizer: N) -> Self {
        self.normalizer = Some(Box::new(normalizer));
        self
    }

    pub fn goal_normalizer<N: Normalizer + 'static>(mut self, normalizer: N) -> Self {
        self.goal_normalizer = Some(Box::new(normalizer));
        self
    }

    pub fn recording(mut self, recording: bool) -> Self {
        self.recording = recording;
        self
    }
}

/// Handle to one remote environment instance.
#[derive(Debug)]
pub struct Env {
    id: String,
    model_name: String,
    observation_space: Space,
    action_space: Space,
    max_episode_steps: usize,
    normalizer: Option<Box<dyn Normalizer>>,
    goal_normalizer: Option<Box<dyn Normalizer>>,
    recording: bool,
    closed: bool,
    transport: Arc<dyn EnvTransport>,
}

impl Env {
    /// Create an environment on the server and bind its normalizers.
    pub fn make(transport: Arc<dyn EnvTransport>, model_name: &str, opts: EnvOpts) -> Result<Self> {
        let response = transport.create_env(&CreateEnvRequest {
            model_name: model_name.to_string(),
            wrappers: opts.wrappers,
        })?;
        let info = response.environment;
        info.observation_space.validate()?;
        info.action_space.validate()?;

        let mut normalizer = opts.normalizer;
        if let Some(n) = normalizer.as_mut() {
            n.init(&info.observation_space)?;
        }
        let mut goal_normalizer = opts.goal_normalizer;
        if let Some(n) = goal_normalizer.as_mut() {
            n.init(&info.observation_space)?;
        }

        if opts.recording {
            let message = transport.start_record_env(&info.id)?;
            debug!("recording {}: {}", info.id, message.message);
        }

        info!(
            "created env {} ({}), max {} steps",
            info.id, model_name, info.max_episode_steps
        );
        Ok(Env {
            id: info.id,
            model_name: model_name.to_string(),
            observation_space: info.observation_space,
            action_space: info.action_space,
            max_episode_steps: info.max_episode_steps,
            normalizer,
            goal_normalizer,
            recording: opts.recording,
            closed: false,
            transport,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    pub fn action_space(&self) -> &Space {
        &self.action_space
    }

    pub fn max_episode_steps(&self) -> usize {
        self.max_episode_steps
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn observation_space_shape(&self) -> Result<Vec<usize>> {
        self.observation_space.shape()
    }

    pub fn action_space_shape(&self) -> Result<Vec<usize>> {
        self.action_space.shape()
    }

    pub fn potentials_shape(&self) -> Result<Vec<usize>> {
        self.action_space.potentials_shape()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(GymkitError::invalid_parameter("env", format!("{} is closed", self.id)));
        }
        Ok(())
    }

    fn normalize(&self, observation: Tensor) -> Result<Tensor> {
        match &self.normalizer {
            Some(n) => n.norm(&observation),
            None => Ok(observation),
        }
    }

    pub fn reset(&mut self) -> Result<InitialObservation> {
        self.ensure_open()?;
        let response = self.transport.reset_env(&self.id)?;
        let observation = self.normalize(response.observation.to_tensor()?)?;
        let goal = match response.goal {
            Some(goal) => {
                let goal = goal.to_tensor()?;
                Some(match &self.goal_normalizer {
                    Some(n) => n.norm(&goal)?,
                    None => goal,
                })
            }
            None => None,
        };
        Ok(InitialObservation { observation, goal })
    }

    pub fn step(&mut self, action: usize) -> Result<Outcome> {
        self.ensure_open()?;
        let wire_action = i32::try_from(action)
            .map_err(|_| GymkitError::invalid_parameter("action", format!("{} does not fit in i32", action)))?;
        let response = self.transport.step_env(&self.id, wire_action)?;
        Ok(Outcome {
            observation: self.normalize(response.observation.to_tensor()?)?,
            action,
            reward: response.reward,
            done: response.done,
        })
    }

    /// Ask the server for a random valid action.
    pub fn sample_action(&self) -> Result<usize> {
        self.ensure_open()?;
        let value = self.transport.sample_action(&self.id)?.value;
        usize::try_from(value)
            .map_err(|_| GymkitError::Network(format!("server sampled negative action {}", value)))
    }

    pub fn render(&self) -> Result<Tensor> {
        self.ensure_open()?;
        self.transport.render_env(&self.id)?.frame.to_tensor()
    }

    pub fn results(&self) -> Result<EnvResults> {
        let response = self.transport.results(&self.id)?;
        let episodes = response.episode_results.len();
        let average_reward = if episodes == 0 {
            0.0
        } else {
            response.episode_results.iter().map(|r| r.reward).sum::<f32>() / episodes as f32
        };
        Ok(EnvResults {
            episodes,
            videos: response.videos.iter().map(|v| v.episode_id).collect(),
            average_reward,
        })
    }

    /// Download every recorded video into `dir` as `<env id>_<episode>.mp4`.
    pub fn videos<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut paths = Vec::new();
        for episode_id in self.results()?.videos {
            let path = dir.join(format!("{}_{}.mp4", self.id, episode_id));
            let mut sink = BufWriter::new(File::create(&path)?);
            let bytes = self.transport.get_video(&self.id, episode_id, &mut sink)?;
            sink.flush()?;
            debug!("wrote {} bytes to {}", bytes, path.display());
            paths.push(path);
        }
        Ok(paths)
    }

    /// Delete the environment on the server. Further calls fail.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let message = self.transport.delete_env(&self.id)?;
        self.closed = true;
        info!("closed env {}: {}", self.id, message.message);
        Ok(())
    }
}

impl Drop for Env {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!("failed to close env {}: {}", self.id, e);
            }
        }
    }
}
