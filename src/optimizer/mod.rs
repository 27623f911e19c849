use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Parameter update rule.
///
/// `layer` identifies which layer's parameters are being updated so stateful
/// optimizers keep separate moments per layer. [`Optimizer::step`] is called
/// once per training batch before any layer is updated.
pub trait Optimizer {
    fn update_weights(&mut self, layer: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32);
    fn update_biases(&mut self, layer: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32);
    fn step(&mut self) {}
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
}

impl OptimizerWrapper {
    /// Fresh optimizer of the same kind and hyperparameters with no
    /// accumulated state.
    pub fn reset(&self) -> Self {
        match self {
            OptimizerWrapper::SGD(_) => OptimizerWrapper::SGD(SGD::new()),
            OptimizerWrapper::Adam(adam) => {
                OptimizerWrapper::Adam(Adam::new(adam.beta1, adam.beta2, adam.epsilon))
            }
        }
    }
}

impl Optimizer for OptimizerWrapper {
    fn update_weights(&mut self, layer: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update_weights(layer, weights, gradients, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update_weights(layer, weights, gradients, learning_rate),
        }
    }

    fn update_biases(&mut self, layer: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update_biases(layer, biases, gradients, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update_biases(layer, biases, gradients, learning_rate),
        }
    }

    fn step(&mut self) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.step(),
            OptimizerWrapper::Adam(optimizer) => optimizer.step(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Optimizer for SGD {
    fn update_weights(&mut self, _layer: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        weights.zip_mut_with(gradients, |w, &g| *w -= learning_rate * g);
    }

    fn update_biases(&mut self, _layer: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        biases.zip_mut_with(gradients, |b, &g| *b -= learning_rate * g);
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m_weights: Vec<Array2<f32>>,
    v_weights: Vec<Array2<f32>>,
    m_biases: Vec<Array1<f32>>,
    v_biases: Vec<Array1<f32>>,
    pub t: usize,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            m_weights: Vec::new(),
            v_weights: Vec::new(),
            m_biases: Vec::new(),
            v_biases: Vec::new(),
            t: 0,
        }
    }

    fn ensure_weight_state(&mut self, layer: usize, dim: (usize, usize)) {
        while self.m_weights.len() <= layer {
            self.m_weights.push(Array2::zeros((0, 0)));
            self.v_weights.push(Array2::zeros((0, 0)));
        }
        if self.m_weights[layer].dim() != dim {
            self.m_weights[layer] = Array2::zeros(dim);
            self.v_weights[layer] = Array2::zeros(dim);
        }
    }

    fn ensure_bias_state(&mut self, layer: usize, len: usize) {
        while self.m_biases.len() <= layer {
            self.m_biases.push(Array1::zeros(0));
            self.v_biases.push(Array1::zeros(0));
        }
        if self.m_biases[layer].len() != len {
            self.m_biases[layer] = Array1::zeros(len);
            self.v_biases[layer] = Array1::zeros(len);
        }
    }

    fn corrections(&self) -> (f32, f32) {
        let t = self.t.max(1) as i32;
        (1.0 - self.beta1.powi(t), 1.0 - self.beta2.powi(t))
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn update_weights(&mut self, layer: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        self.ensure_weight_state(layer, weights.dim());
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let (c1, c2) = self.corrections();

        let m = &mut self.m_weights[layer];
        m.zip_mut_with(gradients, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        let v = &mut self.v_weights[layer];
        v.zip_mut_with(gradients, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        let m = &self.m_weights[layer];
        let v = &self.v_weights[layer];
        ndarray::Zip::from(weights).and(m).and(v).for_each(|w, &m, &v| {
            *w -= learning_rate * (m / c1) / ((v / c2).sqrt() + epsilon);
        });
    }

    fn update_biases(&mut self, layer: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        self.ensure_bias_state(layer, biases.len());
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let (c1, c2) = self.corrections();

        let m = &mut self.m_biases[layer];
        m.zip_mut_with(gradients, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        let v = &mut self.v_biases[layer];
        v.zip_mut_with(gradients, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        let m = &self.m_biases[layer];
        let v = &self.v_biases[layer];
        ndarray::Zip::from(biases).and(m).and(v).for_each(|b, &m, &v| {
            *b -= learning_rate * (m / c1) / ((v / c2).sqrt() + epsilon);
        });
    }

    fn step(&mut self) {
        self.t += 1;
    }
}
