//! # Policy façade
//!
//! [`Policy`] is the narrow interface agents use to talk to a neural network:
//! predict on single observations or batches, fit with MSE or a custom loss,
//! and copy parameters into a target policy. Inputs of any rank are flattened
//! row-major before they reach the network.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::config::JsonConfig;
use crate::error::{GymkitError, Result};
use crate::layers::{DenseLayer, WeightInit};
use crate::loss::{Loss, MSE};
use crate::metrics::{Probe, TrackOpts, Tracker};
use crate::network::NeuralNetwork;
use crate::optimizer::{Adam, OptimizerWrapper, SGD};
use crate::tensor::{flatten, Tensor};

/// Optimizer choice for a policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum OptimizerKind {
    Sgd,
    #[default]
    Adam,
}

impl OptimizerKind {
    fn build(self) -> OptimizerWrapper {
        match self {
            OptimizerKind::Sgd => OptimizerWrapper::SGD(SGD::new()),
            OptimizerKind::Adam => OptimizerWrapper::Adam(Adam::default()),
        }
    }
}

/// Architecture and training hyperparameters of a policy network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Hidden layer widths.
    pub hidden: Vec<usize>,
    pub hidden_activation: Activation,
    pub output_activation: Activation,
    pub optimizer: OptimizerKind,
    pub learning_rate: f32,
    pub use_bias: bool,
    /// Overrides the per-activation default initialization.
    pub init: Option<WeightInit>,
    pub seed: Option<u64>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            hidden: vec![24, 24],
            hidden_activation: Activation::Relu,
            output_activation: Activation::Linear,
            optimizer: OptimizerKind::Adam,
            learning_rate: 0.001,
            use_bias: true,
            init: None,
            seed: None,
        }
    }
}

impl JsonConfig for PolicyConfig {}

impl PolicyConfig {
    pub fn hidden(mut self, hidden: Vec<usize>) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn hidden_activation(mut self, activation: Activation) -> Self {
        self.hidden_activation = activation;
        self
    }

    pub fn output_activation(mut self, activation: Activation) -> Self {
        self.output_activation = activation;
        self
    }

    pub fn optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn use_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn init(mut self, init: WeightInit) -> Self {
        self.init = Some(init);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A named network with its learning rate and last training loss.
#[derive(Debug)]
pub struct Policy {
    name: String,
    network: NeuralNetwork,
    learning_rate: f32,
    last_loss: Arc<Mutex<f64>>,
}

impl Clone for Policy {
    /// Deep copy with an independent loss cell.
    fn clone(&self) -> Self {
        Policy {
            name: self.name.clone(),
            network: self.network.clone(),
            learning_rate: self.learning_rate,
            last_loss: Arc::new(Mutex::new(self.last_loss())),
        }
    }
}

impl Policy {
    /// Build a policy mapping `input_size` features to `output_size` outputs.
    pub fn new(name: &str, input_size: usize, output_size: usize, config: &PolicyConfig) -> Result<Self> {
        if input_size == 0 || output_size == 0 {
            return Err(GymkitError::invalid_parameter(
                "policy",
                format!("sizes must be positive, got {} -> {}", input_size, output_size),
            ));
        }
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut sizes = vec![input_size];
        sizes.extend(config.hidden.iter().copied());
        sizes.push(output_size);

        let last = sizes.len() - 2;
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, window)| {
                let activation = if i == last { config.output_activation } else { config.hidden_activation };
                let init = config.init.unwrap_or_else(|| WeightInit::for_activation(activation));
                let layer = DenseLayer::new(window[0], window[1], activation, init, &mut rng);
                if config.use_bias { layer } else { layer.without_bias() }
            })
            .collect();

        let network = NeuralNetwork::from_layers(layers, config.optimizer.build())?;
        Ok(Self::from_network(name, network, config.learning_rate))
    }

    pub fn from_network(name: &str, network: NeuralNetwork, learning_rate: f32) -> Self {
        Policy {
            name: name.to_string(),
            network,
            learning_rate,
            last_loss: Arc::new(Mutex::new(0.0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> &NeuralNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut NeuralNetwork {
        &mut self.network
    }

    pub fn input_size(&self) -> usize {
        self.network.input_size()
    }

    pub fn output_size(&self) -> usize {
        self.network.output_size()
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    /// Loss of the most recent fit.
    pub fn last_loss(&self) -> f64 {
        self.last_loss.lock().map(|v| *v).unwrap_or(f64::NAN)
    }

    /// Expose this policy's training loss as a node-backed `<name>_loss` value.
    pub fn attach_tracker(&self, tracker: &Tracker) -> Result<String> {
        let cell = Arc::clone(&self.last_loss);
        let probe: Probe = Arc::new(move || cell.lock().map(|v| *v).unwrap_or(f64::NAN));
        tracker.track_value(&format!("{}_loss", self.name), probe, TrackOpts::default())
    }

    fn input_row(&self, x: &Tensor) -> Result<Array1<f32>> {
        if x.len() != self.input_size() {
            return Err(GymkitError::shape_mismatch(self.input_size(), x.shape()));
        }
        Ok(flatten(x))
    }

    /// Outputs for one observation, as a 1-D tensor.
    pub fn predict(&mut self, x: &Tensor) -> Result<Tensor> {
        let row = self.input_row(x)?;
        Ok(self.network.forward(row.view())?.into_dyn())
    }

    /// Outputs for one flat input vector.
    pub fn predict_vector(&mut self, x: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.network.forward(x)
    }

    /// Outputs for a batch of flat inputs, one per row.
    pub fn predict_batch(&mut self, xs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.network.forward_batch(xs)
    }

    /// One MSE step on a single example.
    pub fn fit(&mut self, x: &Tensor, y: &Tensor) -> Result<f32> {
        let row = self.input_row(x)?;
        let target = flatten(y);
        self.fit_batch(row.view().insert_axis(Axis(0)), target.view().insert_axis(Axis(0)))
    }

    /// One MSE step on a batch.
    pub fn fit_batch(&mut self, xs: ArrayView2<f32>, ys: ArrayView2<f32>) -> Result<f32> {
        self.fit_batch_with(xs, ys, &MSE)
    }

    /// One step on a batch with a custom loss.
    pub fn fit_batch_with(&mut self, xs: ArrayView2<f32>, ys: ArrayView2<f32>, loss: &dyn Loss) -> Result<f32> {
        if xs.nrows() != ys.nrows() {
            return Err(GymkitError::shape_mismatch(xs.nrows(), ys.nrows()));
        }
        let value = self.network.train_batch(xs, ys, loss, self.learning_rate)?;
        if let Ok(mut cell) = self.last_loss.lock() {
            *cell = value as f64;
        }
        Ok(value)
    }

    /// Deep copy of parameters into `other`, which must share this architecture.
    pub fn copy_learnables_to(&self, other: &mut Policy) -> Result<()> {
        self.network.copy_learnables_to(&mut other.network)
    }

    pub fn learnables(&self) -> Array1<f32> {
        self.network.learnables()
    }

    pub fn set_learnables(&mut self, flat: ArrayView1<f32>) -> Result<()> {
        self.network.set_learnables(flat)
    }

    pub fn parameter_count(&self) -> usize {
        self.network.parameter_count()
    }

    /// Persist the network with bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        self.network.save(path)
    }

    pub fn load<P: AsRef<Path>>(name: &str, path: P, learning_rate: f32) -> Result<Self> {
        Ok(Self::from_network(name, NeuralNetwork::load(path)?, learning_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::vector;

    fn config() -> PolicyConfig {
        PolicyConfig::default().hidden(vec![8]).seed(5)
    }

    #[test]
    fn test_seeded_policies_match() {
        let a = Policy::new("a", 3, 2, &config()).unwrap();
        let b = Policy::new("b", 3, 2, &config()).unwrap();
        assert_eq!(a.learnables(), b.learnables());
    }

    #[test]
    fn test_predict_checks_input() {
        let mut p = Policy::new("q", 3, 2, &config()).unwrap();
        assert_eq!(p.predict(&vector(&[0.1, 0.2, 0.3])).unwrap().len(), 2);
        assert!(matches!(p.predict(&vector(&[0.1])), Err(GymkitError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_copy_learnables_is_deep() {
        let source = Policy::new("q", 3, 2, &config()).unwrap();
        let mut target = Policy::new("t", 3, 2, &config().seed(6)).unwrap();
        source.copy_learnables_to(&mut target).unwrap();
        assert_eq!(source.learnables(), target.learnables());

        let mut source = source;
        source
            .fit(&vector(&[1.0, 1.0, 1.0]), &vector(&[10.0, -10.0]))
            .unwrap();
        assert_ne!(source.learnables(), target.learnables());
    }

    #[test]
    fn test_loss_probe_tracks_fits() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Tracker::with_path(dir.path().join("t.jsonl")).unwrap();
        let mut p = Policy::new("actor", 3, 2, &config()).unwrap();
        let name = p.attach_tracker(&tracker).unwrap();
        assert_eq!(name, "actor_loss");
        let loss = p.fit(&vector(&[1.0, 0.0, 0.0]), &vector(&[1.0, 1.0])).unwrap();
        assert_eq!(tracker.get_value("actor_loss").unwrap(), loss as f64);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("policy.bin");
        let p = Policy::new("q", 3, 2, &config()).unwrap();
        p.save(&path).unwrap();
        let loaded = Policy::load("q", &path, 0.001).unwrap();
        assert_eq!(p.learnables(), loaded.learnables());
    }
}
