use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Activation applied to the output of a dense layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum Activation {
    #[default]
    Relu,
    Linear,
    Sigmoid,
    Tanh,
    /// Row-wise softmax; turns a layer into an action-probability head.
    Softmax,
}

impl Activation {
    /// Apply the activation to a batch in-place.
    pub fn apply_batch(&self, inputs: &mut Array2<f32>) {
        match self {
            Activation::Relu => inputs.mapv_inplace(|v| v.max(0.0)),
            Activation::Linear => {}
            Activation::Sigmoid => inputs.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => inputs.mapv_inplace(|v| v.tanh()),
            Activation::Softmax => {
                for mut row in inputs.axis_iter_mut(Axis(0)) {
                    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|v| v / sum);
                }
            }
        }
    }

    /// Element-wise derivative with respect to the pre-activation values.
    ///
    /// Softmax has no element-wise derivative; use [`Activation::backward_batch`].
    pub fn derivative_batch(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => inputs.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Linear | Activation::Softmax => Array2::ones(inputs.dim()),
            Activation::Sigmoid => inputs.mapv(|v| {
                let sigmoid = 1.0 / (1.0 + (-v).exp());
                sigmoid * (1.0 - sigmoid)
            }),
            Activation::Tanh => inputs.mapv(|v| {
                let tanh_v = v.tanh();
                1.0 - tanh_v * tanh_v
            }),
        }
    }

    /// Propagate output gradients back through the activation.
    ///
    /// `pre_activation` and `outputs` are the values cached by the forward pass.
    pub fn backward_batch(
        &self,
        pre_activation: ArrayView2<f32>,
        outputs: ArrayView2<f32>,
        output_grads: ArrayView2<f32>,
    ) -> Array2<f32> {
        match self {
            Activation::Softmax => {
                // dz_i = p_i * (g_i - sum_j g_j p_j)
                let weighted = (&output_grads * &outputs).sum_axis(Axis(1)).insert_axis(Axis(1));
                &outputs * &(&output_grads - &weighted)
            }
            _ => &output_grads * &self.derivative_batch(pre_activation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let mut x = array![[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]];
        Activation::Softmax.apply_batch(&mut x);
        for row in x.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert!((x[[1, 0]] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_backward_matches_finite_difference() {
        let z = array![[0.2, -0.4, 1.1]];
        let g = array![[0.5, -1.0, 0.25]];
        let mut p = z.clone();
        Activation::Softmax.apply_batch(&mut p);
        let analytic = Activation::Softmax.backward_batch(z.view(), p.view(), g.view());

        let h = 1e-3;
        for k in 0..3 {
            let mut plus = z.clone();
            plus[[0, k]] += h;
            Activation::Softmax.apply_batch(&mut plus);
            let mut minus = z.clone();
            minus[[0, k]] -= h;
            Activation::Softmax.apply_batch(&mut minus);
            let numeric = ((&plus - &minus) * &g).sum() / (2.0 * h);
            assert!((numeric - analytic[[0, k]]).abs() < 1e-3);
        }
    }

    #[test]
    fn test_relu_derivative() {
        let d = Activation::Relu.derivative_batch(array![[-1.0, 0.0, 2.0]].view());
        assert_eq!(d, array![[0.0, 0.0, 1.0]]);
    }
}
