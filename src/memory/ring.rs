use rand::seq::index;
use rand::Rng;
use std::collections::VecDeque;

use crate::error::{GymkitError, Result};

/// Bounded FIFO of events with uniform sampling without replacement.
///
/// New events go to the front; once `size_limit` is exceeded the oldest
/// event is evicted from the back.
#[derive(Clone, Debug)]
pub struct ReplayBuffer<E> {
    buffer: VecDeque<E>,
    size_limit: usize,
}

impl<E> ReplayBuffer<E> {
    pub fn new(size_limit: usize) -> Self {
        ReplayBuffer {
            buffer: VecDeque::with_capacity(size_limit.min(1 << 16)),
            size_limit,
        }
    }

    pub fn remember(&mut self, event: E) {
        self.buffer.push_front(event);
        while self.buffer.len() > self.size_limit {
            self.buffer.pop_back();
        }
    }

    /// Draw `batch_size` distinct events uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<&E>> {
        if self.buffer.len() < batch_size {
            return Err(GymkitError::NotEnoughData {
                requested: batch_size,
                available: self.buffer.len(),
            });
        }
        Ok(index::sample(rng, self.buffer.len(), batch_size)
            .into_iter()
            .map(|i| &self.buffer[i])
            .collect())
    }

    /// Events from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
