use crate::tensor::Tensor;

/// One episode of `(state, action, reward)` triples.
#[derive(Clone, Debug, Default)]
pub struct ReinforceMemory {
    states: Vec<Tensor>,
    actions: Vec<usize>,
    rewards: Vec<f32>,
}

/// Contents of a [`ReinforceMemory`] handed out by `pop`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trajectory {
    pub states: Vec<Tensor>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f32>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

impl ReinforceMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, state: Tensor, action: usize, reward: f32) {
        self.states.push(state);
        self.actions.push(action);
        self.rewards.push(reward);
    }

    /// Return everything stored and clear the memory.
    pub fn pop(&mut self) -> Trajectory {
        Trajectory {
            states: std::mem::take(&mut self.states),
            actions: std::mem::take(&mut self.actions),
            rewards: std::mem::take(&mut self.rewards),
        }
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}
