use bincode::{deserialize, serialize};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::activations::Activation;
use crate::error::{GymkitError, Result};
use crate::layers::{DenseLayer, WeightInit};
use crate::loss::{Loss, MSE};
use crate::optimizer::{Optimizer, OptimizerWrapper};

/// A feed-forward network of dense layers trained by backpropagation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NeuralNetwork {
    pub layers: Vec<DenseLayer>,
    pub optimizer: OptimizerWrapper,
}

impl NeuralNetwork {
    /// Create a network with the given layer sizes and one activation per layer.
    /// Weights are drawn from the recommended initialization for each activation.
    pub fn new<R: Rng + ?Sized>(
        layer_sizes: &[usize],
        activations: &[Activation],
        optimizer: OptimizerWrapper,
        rng: &mut R,
    ) -> Result<Self> {
        if layer_sizes.len() < 2 || layer_sizes.len() - 1 != activations.len() {
            return Err(GymkitError::invalid_parameter(
                "layer_sizes",
                format!(
                    "{} sizes need {} activations, got {}",
                    layer_sizes.len(),
                    layer_sizes.len().saturating_sub(1),
                    activations.len()
                ),
            ));
        }

        let layers = layer_sizes
            .windows(2)
            .zip(activations.iter())
            .map(|(window, &activation)| {
                DenseLayer::new(window[0], window[1], activation, WeightInit::for_activation(activation), rng)
            })
            .collect::<Vec<_>>();

        Ok(NeuralNetwork { layers, optimizer })
    }

    /// Build a network from already constructed layers.
    pub fn from_layers(layers: Vec<DenseLayer>, optimizer: OptimizerWrapper) -> Result<Self> {
        if layers.is_empty() {
            return Err(GymkitError::invalid_parameter("layers", "network needs at least one layer"));
        }
        for pair in layers.windows(2) {
            if pair[0].output_size() != pair[1].input_size() {
                return Err(GymkitError::shape_mismatch(pair[0].output_size(), pair[1].input_size()));
            }
        }
        Ok(NeuralNetwork { layers, optimizer })
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, DenseLayer::input_size)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, DenseLayer::output_size)
    }

    /// Perform a forward pass for a single input vector.
    pub fn forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        let output = self.forward_batch(input.insert_axis(Axis(0)))?;
        Ok(output.index_axis_move(Axis(0), 0))
    }

    /// Perform a forward pass for a batch of input vectors.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.input_size() {
            return Err(GymkitError::shape_mismatch(
                (inputs.nrows(), self.input_size()),
                inputs.dim(),
            ));
        }
        let mut current_output = inputs.to_owned();
        for layer in &mut self.layers {
            current_output = layer.forward_batch(current_output.view());
        }
        Ok(current_output)
    }

    /// Compute gradients for every layer's weights and biases, first layer first.
    fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Result<Vec<(Array2<f32>, Array1<f32>)>> {
        let mut gradients = Vec::with_capacity(self.layers.len());
        let mut current_error = output_errors.to_owned();

        for layer in self.layers.iter().rev() {
            let grads = layer.backward_batch(current_error.view())?;
            gradients.push((grads.weights, grads.biases));
            current_error = grads.input_error;
        }

        gradients.reverse();
        Ok(gradients)
    }

    /// One optimization step on a batch with an arbitrary loss.
    ///
    /// Returns the loss of the batch before the update.
    pub fn train_batch(
        &mut self,
        inputs: ArrayView2<f32>,
        targets: ArrayView2<f32>,
        loss: &dyn Loss,
        learning_rate: f32,
    ) -> Result<f32> {
        let outputs = self.forward_batch(inputs)?;
        if outputs.dim() != targets.dim() {
            return Err(GymkitError::shape_mismatch(outputs.dim(), targets.dim()));
        }
        let value = loss.compute_batch(outputs.view(), targets);
        let output_errors = loss.gradient_batch(outputs.view(), targets);
        let gradients = self.backward_batch(output_errors.view())?;

        self.optimizer.step();
        for (index, (layer, (weight_gradients, bias_gradients))) in
            self.layers.iter_mut().zip(gradients).enumerate()
        {
            self.optimizer.update_weights(index, &mut layer.weights, &weight_gradients, learning_rate);
            if layer.use_bias {
                self.optimizer.update_biases(index, &mut layer.biases, &bias_gradients, learning_rate);
            }
        }
        Ok(value)
    }

    /// Train on a batch against mean squared error.
    pub fn train_minibatch(
        &mut self,
        inputs: ArrayView2<f32>,
        targets: ArrayView2<f32>,
        learning_rate: f32,
    ) -> Result<f32> {
        self.train_batch(inputs, targets, &MSE, learning_rate)
    }

    /// Number of learnable scalars.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(DenseLayer::parameter_count).sum()
    }

    /// All learnables flattened in layer order: weights row-major, then biases.
    pub fn learnables(&self) -> Array1<f32> {
        let mut flat = Vec::with_capacity(self.parameter_count());
        for layer in &self.layers {
            flat.extend(layer.weights.iter().copied());
            if layer.use_bias {
                flat.extend(layer.biases.iter().copied());
            }
        }
        Array1::from(flat)
    }

    /// Overwrite all learnables from a flat vector laid out as [`NeuralNetwork::learnables`].
    pub fn set_learnables(&mut self, flat: ArrayView1<f32>) -> Result<()> {
        if flat.len() != self.parameter_count() {
            return Err(GymkitError::shape_mismatch(self.parameter_count(), flat.len()));
        }
        let mut offset = 0;
        for layer in &mut self.layers {
            let n = layer.weights.len();
            let (rows, cols) = layer.weights.dim();
            let weights = flat.slice(s![offset..offset + n]).to_owned().into_shape((rows, cols))?;
            layer.weights.assign(&weights);
            offset += n;
            if layer.use_bias {
                let n = layer.biases.len();
                layer.biases.assign(&flat.slice(s![offset..offset + n]));
                offset += n;
            }
        }
        Ok(())
    }

    /// Deep copy of parameters into a network of identical architecture.
    pub fn copy_learnables_to(&self, other: &mut NeuralNetwork) -> Result<()> {
        if self.layers.len() != other.layers.len() {
            return Err(GymkitError::shape_mismatch(self.layers.len(), other.layers.len()));
        }
        for (src, dst) in self.layers.iter().zip(&other.layers) {
            if src.weights.dim() != dst.weights.dim() || src.use_bias != dst.use_bias {
                return Err(GymkitError::shape_mismatch(src.weights.dim(), dst.weights.dim()));
            }
        }
        for (src, dst) in self.layers.iter().zip(other.layers.iter_mut()) {
            dst.weights.assign(&src.weights);
            dst.biases.assign(&src.biases);
        }
        Ok(())
    }

    /// Save the network, including its optimizer state, with bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serialize(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(&serialized)?;
        Ok(())
    }

    /// Load a network saved with [`NeuralNetwork::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(deserialize(&buffer)?)
    }
}
