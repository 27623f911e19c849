use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::functions::Loss;
use crate::error::{GymkitError, Result};

const EPSILON: f32 = 1e-10;

/// Clipped surrogate objective for the PPO actor.
///
/// The loss owns the side inputs bound for one fit: the action probabilities
/// recorded at rollout time, the advantage of each step, and the rewards and
/// critic values used for the critic term. Predictions are the actor's new
/// probabilities; targets are one-hot encodings of the actions taken.
#[derive(Debug, Clone)]
pub struct PpoLoss {
    old_probs: Array2<f32>,
    advantage: Array1<f32>,
    rewards: Array1<f32>,
    values: Array1<f32>,
    clip: f32,
    critic_discount: f32,
    entropy_beta: f32,
}

impl PpoLoss {
    pub fn new(
        old_probs: Array2<f32>,
        advantage: Array1<f32>,
        rewards: Array1<f32>,
        values: Array1<f32>,
    ) -> Result<Self> {
        let rows = old_probs.nrows();
        for (name, len) in [("advantage", advantage.len()), ("rewards", rewards.len()), ("values", values.len())] {
            if len != rows {
                return Err(GymkitError::shape_mismatch(
                    format!("{} of length {}", name, rows),
                    len,
                ));
            }
        }
        Ok(PpoLoss {
            old_probs,
            advantage,
            rewards,
            values,
            clip: 0.2,
            critic_discount: 0.5,
            entropy_beta: 0.001,
        })
    }

    pub fn with_clip(mut self, clip: f32) -> Self {
        self.clip = clip;
        self
    }

    pub fn with_critic_discount(mut self, critic_discount: f32) -> Self {
        self.critic_discount = critic_discount;
        self
    }

    pub fn with_entropy_beta(mut self, entropy_beta: f32) -> Self {
        self.entropy_beta = entropy_beta;
        self
    }

    /// Probability the given row assigns to the chosen action.
    fn chosen(probs: ArrayView2<f32>, one_hot: ArrayView2<f32>) -> Array1<f32> {
        (&probs * &one_hot).sum_axis(Axis(1))
    }

    fn ratios(&self, new_chosen: &Array1<f32>, old_chosen: &Array1<f32>) -> Array1<f32> {
        Array1::from_shape_fn(new_chosen.len(), |i| {
            ((new_chosen[i] + EPSILON).ln() - (old_chosen[i] + EPSILON).ln()).exp()
        })
    }

    fn critic_term(&self) -> f32 {
        if self.rewards.is_empty() {
            return 0.0;
        }
        (&self.rewards - &self.values).mapv(|d| d * d).mean().unwrap_or(0.0)
    }
}

impl Loss for PpoLoss {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
        let n = predictions.nrows().max(1) as f32;
        let new_chosen = Self::chosen(predictions, targets);
        let old_chosen = Self::chosen(self.old_probs.view(), targets);
        let ratios = self.ratios(&new_chosen, &old_chosen);

        let actor = -ratios
            .iter()
            .zip(self.advantage.iter())
            .map(|(&r, &a)| {
                let p1 = r * a;
                let p2 = r.clamp(1.0 - self.clip, 1.0 + self.clip) * a;
                p1.min(p2)
            })
            .sum::<f32>()
            / n;

        let entropy = -predictions.mapv(|p| p * (p + EPSILON).ln()).mean().unwrap_or(0.0);

        self.critic_discount * self.critic_term() + actor - self.entropy_beta * entropy
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Array2<f32> {
        let n = predictions.nrows().max(1) as f32;
        let elements = predictions.len().max(1) as f32;
        let new_chosen = Self::chosen(predictions, targets);
        let old_chosen = Self::chosen(self.old_probs.view(), targets);
        let ratios = self.ratios(&new_chosen, &old_chosen);

        Array2::from_shape_fn(predictions.dim(), |(i, j)| {
            let p = predictions[[i, j]];
            // -beta * d(entropy)/dp
            let entropy_grad = self.entropy_beta * ((p + EPSILON).ln() + p / (p + EPSILON)) / elements;

            let r = ratios[i];
            let a = self.advantage[i];
            let p1 = r * a;
            let p2 = r.clamp(1.0 - self.clip, 1.0 + self.clip) * a;
            // The unclipped branch is the active minimum.
            let actor_grad = if p1 <= p2 {
                -targets[[i, j]] * a * r / (new_chosen[i] + EPSILON) / n
            } else {
                0.0
            };

            actor_grad + entropy_grad
        })
    }
}
