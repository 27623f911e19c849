use std::thread;

use crossbeam_channel::{bounded, Sender};
use log::{debug, info};
use ndarray::{s, Array1, Array2, ArrayView1, Axis, Ix1};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::agent::{Agent, Transition};
use crate::config::{seeded_rng, JsonConfig};
use crate::env::{Env, Space};
use crate::error::{GymkitError, Result};
use crate::layers::WeightInit;
use crate::policy::{Policy, PolicyConfig};
use crate::tensor::{argmax, z_norm, Tensor};

/// Hyperparameters of the [`Evolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NesConfig {
    /// Population size per generation.
    pub npop: usize,
    /// Number of generations.
    pub ngen: usize,
    /// Perturbation scale.
    pub sigma: f32,
    /// Step size.
    pub alpha: f32,
    pub seed: Option<u64>,
}

impl Default for NesConfig {
    fn default() -> Self {
        NesConfig { npop: 50, ngen: 300, sigma: 0.1, alpha: 0.001, seed: None }
    }
}

impl JsonConfig for NesConfig {}

impl NesConfig {
    pub fn npop(mut self, npop: usize) -> Self {
        self.npop = npop;
        self
    }

    pub fn ngen(mut self, ngen: usize) -> Self {
        self.ngen = ngen;
        self
    }

    pub fn sigma(mut self, sigma: f32) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

pub fn default_config() -> NesConfig {
    NesConfig::default()
}

/// Score of one weight vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub reward: f32,
    /// The weights already solve the task; evolution stops early.
    pub solved: bool,
}

impl Evaluation {
    pub fn new(reward: f32) -> Self {
        Evaluation { reward, solved: false }
    }

    pub fn solved(mut self, solved: bool) -> Self {
        self.solved = solved;
        self
    }
}

/// Message sent by a worker once its population member is evaluated.
#[derive(Debug)]
pub struct EvalResult {
    pub id: usize,
    pub result: Result<Evaluation>,
}

/// Task optimized by the [`Evolver`].
///
/// Evaluations of one generation run concurrently on worker threads, so
/// implementations must be shareable across threads.
pub trait BlackBox: Sync {
    /// Starting point of the search.
    fn init_weights(&self) -> Result<Array1<f32>>;

    fn run(&self, weights: ArrayView1<f32>) -> Result<Evaluation>;

    /// Evaluate `weights` and send the result tagged with `id`.
    fn run_async(&self, id: usize, weights: Array1<f32>, results: Sender<EvalResult>) {
        let result = self.run(weights.view());
        if results.send(EvalResult { id, result }).is_err() {
            debug!("results channel closed before worker {} reported", id);
        }
    }
}

/// Outcome of [`Evolver::evolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Evolution {
    pub weights: Array1<f32>,
    /// Generations evaluated.
    pub generations: usize,
    pub solved: bool,
    /// Mean population reward of the last generation, or the solving member's reward.
    pub mean_reward: f32,
}

/// Natural evolution strategies over a flat weight vector.
///
/// Each generation draws mirrored standard-normal perturbations, evaluates
/// `w + sigma * noise` for every member on its own worker, and moves `w`
/// along the reward-weighted noise:
/// `w += alpha / (npop * sigma) * noise^T * znorm(rewards)`.
#[derive(Debug)]
pub struct Evolver<B: BlackBox> {
    black_box: B,
    config: NesConfig,
    rng: StdRng,
}

impl<B: BlackBox> Evolver<B> {
    pub fn new(black_box: B, config: NesConfig) -> Result<Self> {
        if config.npop == 0 {
            return Err(GymkitError::invalid_parameter("npop", "population must not be empty"));
        }
        if config.sigma <= 0.0 {
            return Err(GymkitError::invalid_parameter("sigma", "must be positive"));
        }
        Ok(Evolver { black_box, rng: seeded_rng(config.seed), config })
    }

    pub fn black_box(&self) -> &B {
        &self.black_box
    }

    /// Perturbations for one generation; the last `npop / 2` rows negate the first ones.
    fn sample_noise(&mut self, width: usize) -> Array2<f32> {
        let npop = self.config.npop;
        let half = npop / 2;
        let base: Array2<f32> = Array2::random_using((npop - half, width), StandardNormal, &mut self.rng);
        let mut noise = Array2::zeros((npop, width));
        noise.slice_mut(s![..npop - half, ..]).assign(&base);
        for i in 0..half {
            noise.row_mut(npop - half + i).assign(&base.row(i).mapv(|x| -x));
        }
        noise
    }

    /// Evaluate every row of `candidates` on its own worker.
    ///
    /// All workers are joined before any result is read. Results come back
    /// ordered by population index.
    fn evaluate(&self, candidates: &Array2<f32>) -> Result<Vec<Evaluation>> {
        let npop = candidates.nrows();
        let (sender, receiver) = bounded(npop);
        let black_box = &self.black_box;
        thread::scope(|scope| {
            for (id, row) in candidates.axis_iter(Axis(0)).enumerate() {
                let sender = sender.clone();
                let weights = row.to_owned();
                scope.spawn(move || black_box.run_async(id, weights, sender));
            }
        });
        drop(sender);

        let mut evaluations: Vec<Option<Evaluation>> = vec![None; npop];
        for message in receiver.try_iter() {
            let evaluation = message
                .result
                .map_err(|e| GymkitError::Worker(format!("member {}: {}", message.id, e)))?;
            if let Some(slot) = evaluations.get_mut(message.id) {
                *slot = Some(evaluation);
            }
        }
        evaluations
            .into_iter()
            .enumerate()
            .map(|(id, e)| e.ok_or_else(|| GymkitError::Worker(format!("member {} sent no result", id))))
            .collect()
    }

    /// Run the search from the black box's initial weights.
    pub fn evolve(&mut self) -> Result<Evolution> {
        let mut weights = self.black_box.init_weights()?;
        let width = weights.len();
        let npop = self.config.npop;
        let step = self.config.alpha / (npop as f32 * self.config.sigma);
        let mut mean_reward = f32::NAN;

        for generation in 0..self.config.ngen {
            let noise = self.sample_noise(width);
            let candidates = &noise * self.config.sigma + &weights.view().insert_axis(Axis(0));
            let evaluations = self.evaluate(&candidates)?;

            if let Some(id) = evaluations.iter().position(|e| e.solved) {
                info!("generation {}: member {} solved the task", generation, id);
                return Ok(Evolution {
                    weights: candidates.row(id).to_owned(),
                    generations: generation + 1,
                    solved: true,
                    mean_reward: evaluations[id].reward,
                });
            }

            let rewards: Array1<f32> = evaluations.iter().map(|e| e.reward).collect();
            mean_reward = rewards.mean().unwrap_or(f32::NAN);
            let standardized = z_norm(rewards.view());
            weights = weights + noise.t().dot(&standardized) * step;

            if generation % 10 == 0 {
                debug!("generation {}: mean reward {:.6}", generation, mean_reward);
            }
        }

        info!("evolution finished after {} generations, mean reward {:.6}", self.config.ngen, mean_reward);
        Ok(Evolution { weights, generations: self.config.ngen, solved: false, mean_reward })
    }
}

/// Policy of a single bias-free linear layer with injected weights.
///
/// Acts greedily on the layer's outputs.
#[derive(Debug, Clone)]
pub struct NesAgent {
    policy: Policy,
}

impl NesAgent {
    pub fn new(input_size: usize, n_actions: usize) -> Result<Self> {
        let config = PolicyConfig::default()
            .hidden(Vec::new())
            .output_activation(Activation::Linear)
            .use_bias(false)
            .init(WeightInit::Zeros)
            .seed(0);
        Ok(NesAgent { policy: Policy::new("nes", input_size, n_actions, &config)? })
    }

    pub fn weight_count(&self) -> usize {
        self.policy.parameter_count()
    }

    pub fn weights(&self) -> Array1<f32> {
        self.policy.learnables()
    }

    /// Replace the layer's weights with a flat, row-major `[inputs, actions]` vector.
    pub fn set_weights(&mut self, weights: ArrayView1<f32>) -> Result<()> {
        self.policy.set_learnables(weights)
    }

    pub fn action(&mut self, state: &Tensor) -> Result<usize> {
        let outputs = self.policy.predict(state)?;
        Ok(argmax(outputs.view().into_dimensionality::<Ix1>()?))
    }
}

impl Agent for NesAgent {
    fn act(&mut self, state: &Tensor, _goal: Option<&Tensor>) -> Result<usize> {
        self.action(state)
    }

    /// Weights only change through the evolver.
    fn learn(&mut self, _transition: &Transition<'_>) -> Result<()> {
        Ok(())
    }
}

/// Scores a weight vector by the total reward of one episode.
///
/// Each call makes its own environment with `make_env`, so concurrent
/// evaluations never share an env handle.
pub struct EnvBlackBox<F>
where
    F: Fn() -> Result<Env> + Sync,
{
    make_env: F,
    input_size: usize,
    n_actions: usize,
    max_steps: Option<usize>,
    solved_reward: Option<f32>,
}

impl<F> EnvBlackBox<F>
where
    F: Fn() -> Result<Env> + Sync,
{
    pub fn new(make_env: F, input_size: usize, action_space: &Space) -> Result<Self> {
        Ok(EnvBlackBox {
            make_env,
            input_size,
            n_actions: action_space.n_actions()?,
            max_steps: None,
            solved_reward: None,
        })
    }

    /// Cap episodes below the env's own step limit.
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Episode reward at which the task counts as solved.
    pub fn solved_reward(mut self, solved_reward: f32) -> Self {
        self.solved_reward = Some(solved_reward);
        self
    }

    pub fn agent(&self, weights: ArrayView1<f32>) -> Result<NesAgent> {
        let mut agent = NesAgent::new(self.input_size, self.n_actions)?;
        agent.set_weights(weights)?;
        Ok(agent)
    }
}

impl<F> BlackBox for EnvBlackBox<F>
where
    F: Fn() -> Result<Env> + Sync,
{
    fn init_weights(&self) -> Result<Array1<f32>> {
        Ok(Array1::zeros(self.input_size * self.n_actions))
    }

    fn run(&self, weights: ArrayView1<f32>) -> Result<Evaluation> {
        let mut agent = self.agent(weights)?;
        let mut env = (self.make_env)()?;
        let limit = match (self.max_steps, env.max_episode_steps()) {
            (Some(cap), 0) => cap,
            (Some(cap), env_limit) => cap.min(env_limit),
            (None, 0) => usize::MAX,
            (None, env_limit) => env_limit,
        };

        let mut state = env.reset()?.observation;
        let mut total = 0.0;
        for _ in 0..limit {
            let outcome = env.step(agent.action(&state)?)?;
            total += outcome.reward;
            if outcome.done {
                break;
            }
            state = outcome.observation;
        }
        env.close()?;

        let solved = self.solved_reward.map_or(false, |target| total >= target);
        Ok(Evaluation::new(total).solved(solved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Target {
        solution: Array1<f32>,
    }

    impl BlackBox for Target {
        fn init_weights(&self) -> Result<Array1<f32>> {
            Ok(Array1::zeros(self.solution.len()))
        }

        fn run(&self, weights: ArrayView1<f32>) -> Result<Evaluation> {
            let d = &weights - &self.solution;
            Ok(Evaluation::new(-d.dot(&d)))
        }
    }

    #[test]
    fn test_mirrored_noise() {
        let target = Target { solution: array![0.0, 0.0] };
        let mut evolver = Evolver::new(target, default_config().npop(5).seed(1)).unwrap();
        let noise = evolver.sample_noise(2);
        assert_eq!(noise.dim(), (5, 2));
        assert_eq!(noise.row(3), noise.row(0).mapv(|x| -x));
        assert_eq!(noise.row(4), noise.row(1).mapv(|x| -x));
    }

    #[test]
    fn test_moves_towards_solution() {
        let target = Target { solution: array![0.1, 0.8, -0.5] };
        let mut evolver = Evolver::new(target, default_config().ngen(20).seed(3)).unwrap();
        let result = evolver.evolve().unwrap();
        let d = &result.weights - &array![0.1, 0.8, -0.5];
        assert!(d.dot(&d) < 0.9);
        assert_eq!(result.generations, 20);
        assert!(!result.solved);
    }

    struct SolvedOnSecondCall {
        calls: AtomicUsize,
    }

    impl BlackBox for SolvedOnSecondCall {
        fn init_weights(&self) -> Result<Array1<f32>> {
            Ok(array![0.0])
        }

        fn run(&self, _weights: ArrayView1<f32>) -> Result<Evaluation> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Evaluation::new(0.0).solved(call >= 4))
        }
    }

    #[test]
    fn test_stops_when_solved() {
        let black_box = SolvedOnSecondCall { calls: AtomicUsize::new(0) };
        let mut evolver = Evolver::new(black_box, default_config().npop(4).seed(0)).unwrap();
        let result = evolver.evolve().unwrap();
        assert!(result.solved);
        assert_eq!(result.generations, 2);
    }

    struct Failing;

    impl BlackBox for Failing {
        fn init_weights(&self) -> Result<Array1<f32>> {
            Ok(array![0.0, 0.0])
        }

        fn run(&self, _weights: ArrayView1<f32>) -> Result<Evaluation> {
            Err(GymkitError::Network("env unreachable".to_string()))
        }
    }

    #[test]
    fn test_worker_error_is_fatal() {
        let mut evolver = Evolver::new(Failing, default_config().npop(3).seed(0)).unwrap();
        assert!(matches!(evolver.evolve(), Err(GymkitError::Worker(_))));
    }

    #[test]
    fn test_nes_agent_uses_injected_weights() {
        let mut agent = NesAgent::new(2, 3).unwrap();
        assert_eq!(agent.weight_count(), 6);
        // row-major [inputs, actions]: input 0 votes for action 2
        agent.set_weights(array![0.0, 0.0, 1.0, 0.0, 1.0, 0.0].view()).unwrap();
        assert_eq!(agent.action(&crate::tensor::vector(&[1.0, 0.0])).unwrap(), 2);
        assert_eq!(agent.action(&crate::tensor::vector(&[0.0, 1.0])).unwrap(), 1);
        assert!(agent.set_weights(array![0.0].view()).is_err());
    }
}
