use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::tensor::{stack_rows, stack_vectors, Tensor};

/// One on-policy PPO step.
#[derive(Clone, Debug, PartialEq)]
pub struct PpoEvent {
    pub state: Tensor,
    pub action_probs: Array1<f32>,
    pub action_one_hot: Array1<f32>,
    pub q_value: f32,
    /// `1 - done`
    pub mask: f32,
    pub reward: f32,
}

/// A popped rollout, one entry per step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Events {
    pub states: Vec<Tensor>,
    pub action_probs: Vec<Array1<f32>>,
    pub action_one_hots: Vec<Array1<f32>>,
    pub q_values: Vec<f32>,
    pub masks: Vec<f32>,
    pub rewards: Vec<f32>,
}

/// A rollout with every field stacked along axis 0.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchedEvents {
    /// `[T, features]`, each state flattened.
    pub states: Array2<f32>,
    pub action_probs: Array2<f32>,
    pub action_one_hots: Array2<f32>,
    pub q_values: Array1<f32>,
    pub masks: Array1<f32>,
    pub rewards: Array1<f32>,
}

impl Events {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Stack the rollout. Fails on an empty rollout or ragged rows.
    pub fn batch(&self) -> Result<BatchedEvents> {
        let states: Vec<&Tensor> = self.states.iter().collect();
        Ok(BatchedEvents {
            states: stack_rows(&states)?,
            action_probs: stack_vectors(&self.action_probs)?,
            action_one_hots: stack_vectors(&self.action_one_hots)?,
            q_values: Array1::from(self.q_values.clone()),
            masks: Array1::from(self.masks.clone()),
            rewards: Array1::from(self.rewards.clone()),
        })
    }
}

/// Unbounded columnar store filled until the agent pops it.
#[derive(Clone, Debug, Default)]
pub struct RolloutMemory {
    events: Events,
}

impl RolloutMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&mut self, event: PpoEvent) {
        self.events.states.push(event.state);
        self.events.action_probs.push(event.action_probs);
        self.events.action_one_hots.push(event.action_one_hot);
        self.events.q_values.push(event.q_value);
        self.events.masks.push(event.mask);
        self.events.rewards.push(event.reward);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Return every stored row and clear the memory.
    pub fn pop(&mut self) -> Events {
        std::mem::take(&mut self.events)
    }
}
