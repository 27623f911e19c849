use ndarray::{Array2, ArrayView2, Axis};

const EPSILON: f32 = 1e-7;

/// Trait defining the interface for loss functions
///
/// Both methods receive a batch of network outputs and a batch of targets of
/// the same shape. `gradient_batch` returns the derivative of
/// `compute_batch` with respect to each prediction.
pub trait Loss: Send + Sync {
    /// Compute the loss for a batch of predictions and targets
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32;

    /// Compute the gradient of the loss for a batch
    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Array2<f32>;
}

/// Mean Squared Error loss: `sum((p - t)^2) / (2 * batch)`
pub struct MSE;

impl Loss for MSE {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
        let diff = &predictions - &targets;
        (&diff * &diff).sum() / (2.0 * predictions.nrows().max(1) as f32)
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Array2<f32> {
        (&predictions - &targets) / predictions.nrows().max(1) as f32
    }
}

/// Cross-entropy against (possibly weighted) target distributions.
///
/// Targets need not be one-hot: REINFORCE feeds a matrix holding the
/// normalized return of each step in the column of the chosen action, which
/// turns this into the policy-gradient objective.
pub struct CrossEntropyLoss;

impl Loss for CrossEntropyLoss {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
        let batch_size = predictions.nrows().max(1) as f32;
        let mut total_loss = 0.0;
        for (pred_row, target_row) in predictions.axis_iter(Axis(0)).zip(targets.axis_iter(Axis(0))) {
            total_loss -= target_row
                .iter()
                .zip(pred_row.iter())
                .map(|(&t, &p)| t * (p + EPSILON).ln())
                .sum::<f32>();
        }
        total_loss / batch_size
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Array2<f32> {
        let batch_size = predictions.nrows().max(1) as f32;
        Array2::from_shape_fn(predictions.dim(), |(i, j)| {
            -(targets[[i, j]] / (predictions[[i, j]] + EPSILON)) / batch_size
        })
    }
}
