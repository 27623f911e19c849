use ndarray::IxDyn;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{GymkitError, Result};
use crate::tensor::Tensor;

/// Set of valid actions or observations, as reported by the env server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Space {
    Discrete {
        n: usize,
    },
    MultiDiscrete {
        nvec: Vec<usize>,
    },
    MultiBinary {
        n: usize,
    },
    Box {
        low: Vec<f32>,
        high: Vec<f32>,
        shape: Vec<usize>,
    },
    /// Any variant this client does not understand (tuple, dict, ...).
    #[serde(other)]
    Unknown,
}

/// Bounds of a box space as tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSpace {
    pub low: Tensor,
    pub high: Tensor,
    pub shape: Vec<usize>,
}

impl Space {
    pub fn discrete(n: usize) -> Result<Self> {
        let space = Space::Discrete { n };
        space.validate()?;
        Ok(space)
    }

    pub fn box_space(low: Vec<f32>, high: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        let space = Space::Box { low, high, shape };
        space.validate()?;
        Ok(space)
    }

    /// Check the structural invariants of the space.
    pub fn validate(&self) -> Result<()> {
        match self {
            Space::Discrete { n } | Space::MultiBinary { n } if *n == 0 => Err(GymkitError::invalid_parameter(
                "space",
                "discrete and multi-binary spaces need n > 0",
            )),
            Space::MultiDiscrete { nvec } if nvec.is_empty() || nvec.contains(&0) => Err(
                GymkitError::invalid_parameter("space", "multi-discrete sizes must be positive"),
            ),
            Space::Box { low, high, shape } => {
                let size: usize = shape.iter().product();
                if low.len() != size || high.len() != size {
                    return Err(GymkitError::shape_mismatch(
                        shape,
                        format!("low {} / high {}", low.len(), high.len()),
                    ));
                }
                Ok(())
            }
            Space::Unknown => Err(GymkitError::Unsupported("unknown space variant".to_string())),
            _ => Ok(()),
        }
    }

    /// Shape of one element of the space.
    pub fn shape(&self) -> Result<Vec<usize>> {
        match self {
            Space::Discrete { .. } => Ok(vec![1]),
            Space::MultiDiscrete { nvec } => Ok(vec![nvec.len()]),
            Space::MultiBinary { n } => Ok(vec![*n]),
            Space::Box { shape, .. } => Ok(shape.clone()),
            Space::Unknown => Err(GymkitError::Unsupported("unknown space variant".to_string())),
        }
    }

    /// Shape of the per-action output a policy must produce for this space.
    pub fn potentials_shape(&self) -> Result<Vec<usize>> {
        match self {
            Space::Discrete { n } => Ok(vec![*n]),
            Space::MultiDiscrete { nvec } => Ok(nvec.clone()),
            Space::MultiBinary { n } => Ok(vec![*n]),
            Space::Box { shape, .. } => Ok(shape.clone()),
            Space::Unknown => Err(GymkitError::Unsupported("unknown space variant".to_string())),
        }
    }

    /// Number of distinct actions of an integer-valued space.
    ///
    /// Multi-discrete and multi-binary actions are counted as the size of
    /// their product space.
    pub fn cardinality(&self) -> Result<usize> {
        match self {
            Space::Discrete { n } => Ok(*n),
            Space::MultiDiscrete { nvec } => Ok(nvec.iter().product()),
            Space::MultiBinary { n } => 1usize
                .checked_shl(*n as u32)
                .ok_or_else(|| GymkitError::Unsupported(format!("multi-binary space of {} bits", n))),
            Space::Box { .. } => Err(GymkitError::Unsupported("continuous action space".to_string())),
            Space::Unknown => Err(GymkitError::Unsupported("unknown space variant".to_string())),
        }
    }

    /// Number of actions a discrete-action agent chooses from.
    pub fn n_actions(&self) -> Result<usize> {
        match self {
            Space::Discrete { n } => Ok(*n),
            other => Err(GymkitError::Unsupported(format!(
                "agents need a discrete action space, got {:?}",
                other
            ))),
        }
    }

    /// Uniformly sample an action index from an integer-valued space.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<usize> {
        let n = self.cardinality()?;
        Ok(rng.gen_range(0..n))
    }

    pub fn as_box(&self) -> Result<BoxSpace> {
        match self {
            Space::Box { low, high, shape } => Ok(BoxSpace {
                low: Tensor::from_shape_vec(IxDyn(shape), low.clone())?,
                high: Tensor::from_shape_vec(IxDyn(shape), high.clone())?,
                shape: shape.clone(),
            }),
            other => Err(GymkitError::Unsupported(format!("{:?} is not a box space", other))),
        }
    }
}
