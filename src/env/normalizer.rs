use std::fmt;

use ndarray::IxDyn;

use super::space::Space;
use crate::error::{GymkitError, Result};
use crate::tensor::{self, EqualWidthBinner, MinMaxNorm, Tensor};

/// Transformation applied to every observation (or goal) an env returns.
///
/// `init` is called once with the env's observation space when the handle is
/// created.
pub trait Normalizer: Send + Sync + fmt::Debug {
    fn init(&mut self, _space: &Space) -> Result<()> {
        Ok(())
    }

    fn norm(&self, x: &Tensor) -> Result<Tensor>;
}

fn uninitialized(name: &str) -> GymkitError {
    GymkitError::invalid_parameter(name, "normalizer used before init")
}

/// Min-max scaling using the box bounds of the observation space.
#[derive(Debug, Clone, Default)]
pub struct MinMaxNormalizer {
    norm: Option<MinMaxNorm>,
}

impl MinMaxNormalizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Normalizer for MinMaxNormalizer {
    fn init(&mut self, space: &Space) -> Result<()> {
        let bounds = space.as_box()?;
        self.norm = Some(MinMaxNorm::new(bounds.low, bounds.high)?);
        Ok(())
    }

    fn norm(&self, x: &Tensor) -> Result<Tensor> {
        self.norm.as_ref().ok_or_else(|| uninitialized("min_max"))?.norm(x)
    }
}

/// Equal-width discretization of each observation dimension.
///
/// Bounds default to the box bounds of the observation space; explicit
/// bounds replace them, which is needed for spaces with infinite limits.
#[derive(Debug, Clone)]
pub struct EqWidthBinNormalizer {
    intervals: Vec<usize>,
    bounds: Option<(Vec<f32>, Vec<f32>)>,
    binner: Option<EqualWidthBinner>,
}

impl EqWidthBinNormalizer {
    pub fn new(intervals: Vec<usize>) -> Self {
        EqWidthBinNormalizer { intervals, bounds: None, binner: None }
    }

    pub fn with_bounds(mut self, low: Vec<f32>, high: Vec<f32>) -> Self {
        self.bounds = Some((low, high));
        self
    }
}

impl Normalizer for EqWidthBinNormalizer {
    fn init(&mut self, space: &Space) -> Result<()> {
        let (low, high) = match &self.bounds {
            Some(bounds) => bounds.clone(),
            None => {
                let bounds = space.as_box()?;
                (bounds.low.iter().copied().collect(), bounds.high.iter().copied().collect())
            }
        };
        self.binner = Some(EqualWidthBinner::new(self.intervals.clone(), low, high)?);
        Ok(())
    }

    fn norm(&self, x: &Tensor) -> Result<Tensor> {
        self.binner.as_ref().ok_or_else(|| uninitialized("eq_width_bin"))?.bin(x)
    }
}

/// Reshape observations to a fixed shape with the same element count.
#[derive(Debug, Clone)]
pub struct ReshapeNormalizer {
    shape: Vec<usize>,
}

impl ReshapeNormalizer {
    pub fn new(shape: Vec<usize>) -> Self {
        ReshapeNormalizer { shape }
    }
}

impl Normalizer for ReshapeNormalizer {
    fn norm(&self, x: &Tensor) -> Result<Tensor> {
        let size: usize = self.shape.iter().product();
        if size != x.len() {
            return Err(GymkitError::shape_mismatch(&self.shape, x.shape()));
        }
        Ok(Tensor::from_shape_vec(IxDyn(&self.shape), x.iter().copied().collect())?)
    }
}

/// Prefix a leading axis of size 1.
#[derive(Debug, Clone, Default)]
pub struct ExpandDimsNormalizer;

impl Normalizer for ExpandDimsNormalizer {
    fn norm(&self, x: &Tensor) -> Result<Tensor> {
        tensor::expand_dims(x, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::vector;

    fn box_space() -> Space {
        Space::box_space(vec![0.0, -1.0], vec![2.0, 1.0], vec![2]).unwrap()
    }

    #[test]
    fn test_min_max_requires_box() {
        let mut n = MinMaxNormalizer::new();
        assert!(n.norm(&vector(&[1.0, 0.0])).is_err());
        assert!(n.init(&Space::discrete(2).unwrap()).is_err());
        n.init(&box_space()).unwrap();
        assert_eq!(n.norm(&vector(&[1.0, 0.0])).unwrap(), vector(&[0.5, 0.5]));
    }

    #[test]
    fn test_bin_normalizer_bounds_override() {
        let mut n = EqWidthBinNormalizer::new(vec![2, 4]).with_bounds(vec![0.0, 0.0], vec![1.0, 1.0]);
        n.init(&Space::discrete(3).unwrap()).unwrap();
        assert_eq!(n.norm(&vector(&[0.9, 0.3])).unwrap(), vector(&[1.0, 1.0]));
        assert!(matches!(n.norm(&vector(&[1.5, 0.0])), Err(GymkitError::OutOfBounds { .. })));
    }

    #[test]
    fn test_bin_normalizer_needs_finite_space_bounds() {
        let space = Space::Box {
            low: vec![-4.8, -f32::MAX],
            high: vec![4.8, f32::MAX],
            shape: vec![2],
        };
        let mut n = EqWidthBinNormalizer::new(vec![1, 12]);
        assert!(matches!(n.init(&space), Err(GymkitError::InvalidParameter { .. })));

        let mut n = EqWidthBinNormalizer::new(vec![1, 12]).with_bounds(vec![-4.8, -0.87], vec![4.8, 0.87]);
        n.init(&space).unwrap();
        assert_eq!(n.norm(&vector(&[0.0, 0.8])).unwrap(), vector(&[0.0, 11.0]));
    }

    #[test]
    fn test_reshape_and_expand() {
        let r = ReshapeNormalizer::new(vec![2, 2]);
        let x = vector(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(r.norm(&x).unwrap().shape(), &[2, 2]);
        assert!(r.norm(&vector(&[1.0])).is_err());
        assert_eq!(ExpandDimsNormalizer.norm(&x).unwrap().shape(), &[1, 4]);
    }
}
