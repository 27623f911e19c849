use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::initialization::WeightInit;
use crate::activations::Activation;
use crate::error::{GymkitError, Result};

/// A fully connected (dense) layer in a neural network
///
/// Layers built without a bias keep a zero bias vector that is never updated
/// and never exposed as a learnable.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
    pub use_bias: bool,
    #[serde(skip)]
    pre_activation_output: Option<Array2<f32>>,
    #[serde(skip)]
    outputs: Option<Array2<f32>>,
    #[serde(skip)]
    inputs: Option<Array2<f32>>,
}

/// Gradients produced by [`DenseLayer::backward_batch`].
pub struct LayerGradients {
    /// Error to hand to the previous layer.
    pub input_error: Array2<f32>,
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

impl DenseLayer {
    /// Create a dense layer with weights drawn from `init`.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Self {
        DenseLayer {
            weights: init.initialize_weights((input_size, output_size), rng),
            biases: init.initialize_biases(output_size),
            activation,
            use_bias: true,
            pre_activation_output: None,
            outputs: None,
            inputs: None,
        }
    }

    pub fn without_bias(mut self) -> Self {
        self.use_bias = false;
        self.biases.fill(0.0);
        self
    }

    pub fn with_weights(mut self, weights: Array2<f32>) -> Result<Self> {
        if weights.dim() != self.weights.dim() {
            return Err(GymkitError::shape_mismatch(self.weights.dim(), weights.dim()));
        }
        self.weights = weights;
        Ok(self)
    }

    pub fn with_biases(mut self, biases: Array1<f32>) -> Result<Self> {
        if biases.dim() != self.biases.dim() {
            return Err(GymkitError::shape_mismatch(self.biases.dim(), biases.dim()));
        }
        self.biases = biases;
        Ok(self)
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    /// Number of learnable scalars.
    pub fn parameter_count(&self) -> usize {
        self.weights.len() + if self.use_bias { self.biases.len() } else { 0 }
    }

    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Array2<f32> {
        self.inputs = Some(inputs.to_owned());
        let mut outputs = inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0));
        self.pre_activation_output = Some(outputs.clone());
        self.activation.apply_batch(&mut outputs);
        self.outputs = Some(outputs.clone());
        outputs
    }

    /// Backpropagate through the layer using the values cached by the last
    /// [`DenseLayer::forward_batch`].
    pub fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Result<LayerGradients> {
        let (pre_activation, outputs, inputs) =
            match (&self.pre_activation_output, &self.outputs, &self.inputs) {
                (Some(p), Some(o), Some(i)) => (p, o, i),
                _ => {
                    return Err(GymkitError::invalid_parameter(
                        "layer",
                        "forward_batch() must be called before backward_batch()",
                    ))
                }
            };
        if output_errors.dim() != outputs.dim() {
            return Err(GymkitError::shape_mismatch(outputs.dim(), output_errors.dim()));
        }

        let adjusted_error =
            self.activation
                .backward_batch(pre_activation.view(), outputs.view(), output_errors);
        let weights = inputs.t().dot(&adjusted_error);
        let biases = if self.use_bias {
            adjusted_error.sum_axis(Axis(0))
        } else {
            Array1::zeros(self.biases.len())
        };
        let input_error = adjusted_error.dot(&self.weights.t());

        Ok(LayerGradients { input_error, weights, biases })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer(activation: Activation) -> DenseLayer {
        DenseLayer::new(2, 2, activation, WeightInit::Zeros, &mut StdRng::seed_from_u64(0))
    }

    #[test]
    fn test_forward_applies_bias() {
        let mut l = layer(Activation::Linear).with_biases(array![0.5, -0.5]).unwrap();
        let out = l.forward_batch(array![[1.0, 2.0]].view());
        assert_eq!(out, array![[0.5, -0.5]]);
    }

    #[test]
    fn test_backward_requires_forward() {
        let l = layer(Activation::Relu);
        assert!(l.backward_batch(array![[1.0, 1.0]].view()).is_err());
    }

    #[test]
    fn test_bias_free_layer_has_no_bias_gradient() {
        let mut l = layer(Activation::Linear).without_bias();
        l.forward_batch(array![[1.0, 2.0]].view());
        let grads = l.backward_batch(array![[1.0, 1.0]].view()).unwrap();
        assert_eq!(grads.biases, array![0.0, 0.0]);
        assert_eq!(grads.weights, array![[1.0, 1.0], [2.0, 2.0]]);
        assert_eq!(l.parameter_count(), 4);
    }

    #[test]
    fn test_with_weights_checks_shape() {
        assert!(layer(Activation::Linear).with_weights(Array2::zeros((3, 2))).is_err());
    }
}
