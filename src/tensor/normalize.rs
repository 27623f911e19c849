use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use super::Tensor;
use crate::error::{GymkitError, Result};

const Z_NORM_EPSILON: f32 = 1e-8;

/// Standardize a vector to zero mean and unit variance.
///
/// A small epsilon is added to the standard deviation so constant inputs
/// map to zeros instead of NaN.
pub fn z_norm(x: ArrayView1<f32>) -> Array1<f32> {
    if x.is_empty() {
        return Array1::zeros(0);
    }
    let mean = x.sum() / x.len() as f32;
    let variance = x.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / x.len() as f32;
    let std = variance.sqrt();
    x.mapv(|v| (v - mean) / (std + Z_NORM_EPSILON))
}

/// Per-element min-max scaling into `[0, 1]` using fixed bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxNorm {
    low: Tensor,
    high: Tensor,
}

impl MinMaxNorm {
    pub fn new(low: Tensor, high: Tensor) -> Result<Self> {
        if low.shape() != high.shape() {
            return Err(GymkitError::shape_mismatch(low.shape(), high.shape()));
        }
        Ok(MinMaxNorm { low, high })
    }

    /// `(x - low) / (high - low)`
    pub fn norm(&self, x: &Tensor) -> Result<Tensor> {
        self.check(x)?;
        Ok((x - &self.low) / (&self.high - &self.low))
    }

    /// Inverse of [`MinMaxNorm::norm`].
    pub fn unnorm(&self, y: &Tensor) -> Result<Tensor> {
        self.check(y)?;
        Ok(y * &(&self.high - &self.low) + &self.low)
    }

    fn check(&self, x: &Tensor) -> Result<()> {
        if x.shape() != self.low.shape() {
            return Err(GymkitError::shape_mismatch(self.low.shape(), x.shape()));
        }
        Ok(())
    }
}

/// Discretizes each dimension of a vector into equal-width bins.
///
/// Values must lie inside `[low, high]` for their dimension. The value `high`
/// itself lands in the last bin. Every `high - low` must be finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualWidthBinner {
    intervals: Vec<usize>,
    low: Vec<f32>,
    high: Vec<f32>,
}

impl EqualWidthBinner {
    pub fn new(intervals: Vec<usize>, low: Vec<f32>, high: Vec<f32>) -> Result<Self> {
        if intervals.len() != low.len() || low.len() != high.len() {
            return Err(GymkitError::shape_mismatch(
                intervals.len(),
                format!("low {} / high {}", low.len(), high.len()),
            ));
        }
        if let Some(dim) = intervals.iter().position(|&n| n == 0) {
            return Err(GymkitError::invalid_parameter(
                "intervals",
                format!("dimension {} has zero bins", dim),
            ));
        }
        if let Some(dim) = low.iter().zip(&high).position(|(l, h)| !(l < h)) {
            return Err(GymkitError::invalid_parameter(
                "bounds",
                format!("dimension {} has low >= high", dim),
            ));
        }
        if let Some(dim) = low.iter().zip(&high).position(|(l, h)| !(h - l).is_finite()) {
            return Err(GymkitError::invalid_parameter(
                "bounds",
                format!("dimension {} has an infinite width, pass explicit finite bounds", dim),
            ));
        }
        Ok(EqualWidthBinner { intervals, low, high })
    }

    pub fn intervals(&self) -> &[usize] {
        &self.intervals
    }

    /// Bin index of every element, returned as a float tensor of the input's shape.
    pub fn bin(&self, x: &Tensor) -> Result<Tensor> {
        if x.len() != self.intervals.len() {
            return Err(GymkitError::shape_mismatch(self.intervals.len(), x.shape()));
        }
        let mut out = x.clone();
        for (dim, v) in out.iter_mut().enumerate() {
            *v = self.bin_value(dim, *v)? as f32;
        }
        Ok(out)
    }

    fn bin_value(&self, dim: usize, value: f32) -> Result<usize> {
        let (low, high) = (self.low[dim], self.high[dim]);
        if !(low..=high).contains(&value) {
            return Err(GymkitError::OutOfBounds { dim, value, low, high });
        }
        let n = self.intervals[dim];
        let width = (high - low) / n as f32;
        let index = ((value - low) / width).floor() as usize;
        Ok(index.min(n - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::vector;
    use ndarray::array;

    #[test]
    fn test_min_max_norm_roundtrip() {
        let norm = MinMaxNorm::new(vector(&[0.0, -1.0]), vector(&[10.0, 1.0])).unwrap();
        let x = vector(&[5.0, 0.5]);
        let y = norm.norm(&x).unwrap();
        assert_eq!(y, vector(&[0.5, 0.75]));
        assert_eq!(norm.unnorm(&y).unwrap(), x);
        assert!(norm.norm(&vector(&[1.0])).is_err());
    }

    #[test]
    fn test_z_norm() {
        let z = z_norm(array![3.0, 2.0, 1.0].view());
        assert!(z.sum().abs() < 1e-5);
        assert!(z[0] > 0.0 && z[2] < 0.0);
        assert_eq!(z_norm(array![2.0, 2.0].view()), array![0.0, 0.0]);
    }

    #[test]
    fn test_bin_edges() {
        let binner = EqualWidthBinner::new(vec![4], vec![0.0], vec![1.0]).unwrap();
        assert_eq!(binner.bin(&vector(&[0.0])).unwrap(), vector(&[0.0]));
        assert_eq!(binner.bin(&vector(&[0.3])).unwrap(), vector(&[1.0]));
        assert_eq!(binner.bin(&vector(&[1.0])).unwrap(), vector(&[3.0]));
    }

    #[test]
    fn test_bin_out_of_bounds() {
        let binner = EqualWidthBinner::new(vec![2, 2], vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        match binner.bin(&vector(&[0.5, 1.5])) {
            Err(GymkitError::OutOfBounds { dim, .. }) => assert_eq!(dim, 1),
            other => panic!("expected OutOfBounds, got {:?}", other),
        }
    }

    #[test]
    fn test_bin_rejects_zero_intervals() {
        assert!(EqualWidthBinner::new(vec![0], vec![0.0], vec![1.0]).is_err());
    }

    #[test]
    fn test_bin_rejects_unbounded_dimensions() {
        // gym reports cart-pole velocities as +/- f32::MAX
        let low = vec![-4.8, -f32::MAX, -0.42, -f32::MAX];
        let high = vec![4.8, f32::MAX, 0.42, f32::MAX];
        match EqualWidthBinner::new(vec![1, 1, 6, 12], low, high) {
            Err(GymkitError::InvalidParameter { name, reason }) => {
                assert_eq!(name, "bounds");
                assert!(reason.contains("dimension 1"));
            }
            other => panic!("expected InvalidParameter, got {:?}", other),
        }
        assert!(EqualWidthBinner::new(vec![2], vec![f32::NEG_INFINITY], vec![0.0]).is_err());
    }
}
