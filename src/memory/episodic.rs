use rand::seq::index;
use rand::Rng;

use crate::error::{GymkitError, Result};

/// Episode buffer plus a long-term event store.
///
/// Events of the running episode are appended with [`EpisodicMemory::record`]
/// and handed back by [`EpisodicMemory::take_episode`]; learning samples only
/// come from the long-term store filled by [`EpisodicMemory::remember`].
/// Cloning the memory deep-copies every event.
#[derive(Clone, Debug)]
pub struct EpisodicMemory<E> {
    episode: Vec<E>,
    events: Vec<E>,
    size_limit: Option<usize>,
}

impl<E> Default for EpisodicMemory<E> {
    fn default() -> Self {
        EpisodicMemory { episode: Vec::new(), events: Vec::new(), size_limit: None }
    }
}

impl<E> EpisodicMemory<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Long-term store keeping at most `size_limit` events, dropping the oldest.
    pub fn with_size_limit(size_limit: usize) -> Self {
        EpisodicMemory { size_limit: Some(size_limit), ..Self::default() }
    }

    /// Append an event to the running episode.
    pub fn record(&mut self, event: E) {
        self.episode.push(event);
    }

    /// Events of the running episode, in step order.
    pub fn episode(&self) -> &[E] {
        &self.episode
    }

    /// Take the running episode, leaving it empty.
    pub fn take_episode(&mut self) -> Vec<E> {
        std::mem::take(&mut self.episode)
    }

    /// Add an event to the long-term store.
    pub fn remember(&mut self, event: E) {
        self.events.push(event);
        if let Some(limit) = self.size_limit {
            if self.events.len() > limit {
                let excess = self.events.len() - limit;
                self.events.drain(..excess);
            }
        }
    }

    pub fn events(&self) -> &[E] {
        &self.events
    }

    /// Draw `batch_size` distinct long-term events uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<&E>> {
        if self.events.len() < batch_size {
            return Err(GymkitError::NotEnoughData {
                requested: batch_size,
                available: self.events.len(),
            });
        }
        Ok(index::sample(rng, self.events.len(), batch_size)
            .into_iter()
            .map(|i| &self.events[i])
            .collect())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
