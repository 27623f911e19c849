use std::collections::HashMap;

use crate::error::{GymkitError, Result};
use crate::tensor::{hash_state, Tensor};

/// Tabular action values keyed by the hash of an observation.
///
/// Only discretized observations should reach the table; continuous values
/// almost never repeat and collide unpredictably.
#[derive(Clone, Debug)]
pub struct QTable {
    n_actions: usize,
    values: HashMap<u32, Vec<f32>>,
}

impl QTable {
    pub fn new(n_actions: usize) -> Self {
        QTable { n_actions, values: HashMap::new() }
    }

    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    /// Number of states with stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn check_action(&self, action: usize) -> Result<()> {
        if action >= self.n_actions {
            return Err(GymkitError::ActionOutOfRange { action, n_actions: self.n_actions });
        }
        Ok(())
    }

    /// Value of `action` in `state`; `0.0` for unseen states.
    pub fn get(&self, state: &Tensor, action: usize) -> Result<f32> {
        self.get_hashed(hash_state(state), action)
    }

    pub fn get_hashed(&self, key: u32, action: usize) -> Result<f32> {
        self.check_action(action)?;
        Ok(self.values.get(&key).map_or(0.0, |row| row[action]))
    }

    pub fn set(&mut self, state: &Tensor, action: usize, value: f32) -> Result<()> {
        self.set_hashed(hash_state(state), action, value)
    }

    pub fn set_hashed(&mut self, key: u32, action: usize, value: f32) -> Result<()> {
        self.check_action(action)?;
        let n_actions = self.n_actions;
        self.values.entry(key).or_insert_with(|| vec![0.0; n_actions])[action] = value;
        Ok(())
    }

    /// Greedy action and its value; `(0, 0.0)` for unseen states.
    /// Ties resolve to the lowest action index.
    pub fn get_max(&self, state: &Tensor) -> (usize, f32) {
        self.get_max_hashed(hash_state(state))
    }

    pub fn get_max_hashed(&self, key: u32) -> (usize, f32) {
        match self.values.get(&key) {
            Some(row) => row
                .iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (a, &q)| if q > best.1 { (a, q) } else { best }),
            None => (0, 0.0),
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::vector;

    #[test]
    fn test_missing_state_defaults() {
        let table = QTable::new(3);
        let s = vector(&[1.0, 2.0]);
        assert_eq!(table.get(&s, 2).unwrap(), 0.0);
        assert_eq!(table.get_max(&s), (0, 0.0));
        assert!(matches!(
            table.get(&s, 3),
            Err(GymkitError::ActionOutOfRange { action: 3, n_actions: 3 })
        ));
    }

    #[test]
    fn test_set_then_get() {
        let mut table = QTable::new(3);
        let s = vector(&[1.0, 2.0]);
        table.set(&s, 1, -0.5).unwrap();
        assert_eq!(table.get(&s, 1).unwrap(), -0.5);
        assert_eq!(table.get(&s, 0).unwrap(), 0.0);
        // zero-initialized neighbours win the argmax over a negative value
        assert_eq!(table.get_max(&s), (0, 0.0));

        table.set(&s, 2, 4.0).unwrap();
        assert_eq!(table.get_max(&s), (2, 4.0));
        assert!(table.set(&s, 5, 1.0).is_err());
    }

    #[test]
    fn test_clear() {
        let mut table = QTable::new(2);
        table.set(&vector(&[0.0]), 1, 1.0).unwrap();
        assert_eq!(table.len(), 1);
        table.clear();
        assert!(table.is_empty());
    }
}
