use crate::env::Outcome;
use crate::error::Result;
use crate::tensor::Tensor;

/// One environment step as seen by a learning agent.
#[derive(Debug, Clone, Copy)]
pub struct Transition<'a> {
    pub episode: usize,
    pub timestep: usize,
    /// Observation the action was chosen from.
    pub state: &'a Tensor,
    /// Goal of the running episode, for goal-conditioned environments.
    pub goal: Option<&'a Tensor>,
    pub action: usize,
    pub outcome: &'a Outcome,
}

/// Trait for agents driven by the training harness.
///
/// For every step the harness calls [`Agent::adapt`], then [`Agent::act`],
/// steps the environment and hands the result to [`Agent::learn`]. Once the
/// episode is over it calls [`Agent::end_episode`].
pub trait Agent {
    /// Select an action for `state`.
    fn act(&mut self, state: &Tensor, goal: Option<&Tensor>) -> Result<usize>;

    /// Store the step and learn from it, immediately or once enough data is buffered.
    fn learn(&mut self, transition: &Transition<'_>) -> Result<()>;

    /// Adjust hyperparameters before the next step.
    fn adapt(&mut self, _episode: usize, _timestep: usize) {}

    /// Called after the last step of every episode.
    fn end_episode(&mut self, _episode: usize) -> Result<()> {
        Ok(())
    }

    /// Current exploration rate, for agents that explore ε-greedily.
    fn exploration_rate(&self) -> Option<f32> {
        None
    }
}
