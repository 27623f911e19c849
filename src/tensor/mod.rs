//! # Tensor Utilities
//!
//! Thin helpers over `ndarray` dynamic-rank arrays. Every observation, goal and
//! network input in the crate is a [`Tensor`] (`ArrayD<f32>`); the helpers here
//! cover the shape juggling the agents need (batching rows, adding or removing
//! singleton axes, one-hot encoding) and the small numerical pieces shared by
//! several agents (argmax, softmax, categorical sampling, state hashing).

pub mod normalize;

use ndarray::{Array1, Array2, ArrayD, ArrayView1, Axis, IxDyn};
use ndarray_rand::RandomExt;
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{GymkitError, Result};

pub use normalize::{z_norm, EqualWidthBinner, MinMaxNorm};

/// Dynamic-rank float tensor used for observations, goals and network io.
pub type Tensor = ArrayD<f32>;

/// Build a tensor of the given shape from flat row-major data.
pub fn from_flat(data: Vec<f32>, shape: &[usize]) -> Result<Tensor> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(GymkitError::shape_mismatch(shape, data.len()));
    }
    Ok(ArrayD::from_shape_vec(IxDyn(shape), data)?)
}

/// Build a 1-D tensor from a slice.
pub fn vector(data: &[f32]) -> Tensor {
    Array1::from(data.to_vec()).into_dyn()
}

/// Row-major flattening of any tensor.
pub fn flatten(x: &Tensor) -> Array1<f32> {
    x.iter().copied().collect()
}

/// Insert a singleton axis at `axis`.
pub fn expand_dims(x: &Tensor, axis: usize) -> Result<Tensor> {
    if axis > x.ndim() {
        return Err(GymkitError::invalid_parameter(
            "axis".to_string(),
            format!("{} exceeds rank {}", axis, x.ndim()),
        ));
    }
    Ok(x.clone().insert_axis(Axis(axis)))
}

/// Remove the singleton axis at `axis`.
pub fn squeeze(x: &Tensor, axis: usize) -> Result<Tensor> {
    match x.shape().get(axis) {
        Some(1) => Ok(x.clone().index_axis_move(Axis(axis), 0)),
        _ => Err(GymkitError::shape_mismatch(
            format!("size 1 at axis {}", axis),
            x.shape(),
        )),
    }
}

/// Concatenate tensors along an existing axis.
pub fn concat(axis: usize, tensors: &[&Tensor]) -> Result<Tensor> {
    if tensors.is_empty() {
        return Err(GymkitError::NotEnoughData { requested: 1, available: 0 });
    }
    let views: Vec<_> = tensors.iter().map(|t| t.view()).collect();
    ndarray::concatenate(Axis(axis), &views).map_err(|_| {
        GymkitError::shape_mismatch(
            tensors[0].shape(),
            tensors.iter().map(|t| t.shape().to_vec()).collect::<Vec<_>>(),
        )
    })
}

/// Flatten each tensor into a row and stack the rows into a batch matrix.
///
/// All tensors must hold the same number of elements.
pub fn stack_rows(tensors: &[&Tensor]) -> Result<Array2<f32>> {
    let first = tensors
        .first()
        .ok_or(GymkitError::NotEnoughData { requested: 1, available: 0 })?;
    let width = first.len();
    let mut batch = Array2::zeros((tensors.len(), width));
    for (mut row, tensor) in batch.axis_iter_mut(Axis(0)).zip(tensors) {
        if tensor.len() != width {
            return Err(GymkitError::shape_mismatch(first.shape(), tensor.shape()));
        }
        row.iter_mut().zip(tensor.iter()).for_each(|(r, &v)| *r = v);
    }
    Ok(batch)
}

/// Stack 1-D vectors into a batch matrix.
pub fn stack_vectors(rows: &[Array1<f32>]) -> Result<Array2<f32>> {
    let width = rows
        .first()
        .map(|r| r.len())
        .ok_or(GymkitError::NotEnoughData { requested: 1, available: 0 })?;
    let views: Vec<_> = rows.iter().map(|r| r.view().insert_axis(Axis(0))).collect();
    ndarray::concatenate(Axis(0), &views)
        .map_err(|_| GymkitError::shape_mismatch(width, "ragged rows"))
}

/// One-hot vector of length `n` with a 1 at `index`.
pub fn one_hot(index: usize, n: usize) -> Result<Array1<f32>> {
    if index >= n {
        return Err(GymkitError::ActionOutOfRange { action: index, n_actions: n });
    }
    let mut v = Array1::zeros(n);
    v[index] = 1.0;
    Ok(v)
}

/// Index of the largest element. Ties resolve to the lowest index; an empty
/// view yields 0.
pub fn argmax(x: ArrayView1<f32>) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &v) in x.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

/// Numerically stable softmax of a vector.
pub fn softmax(x: ArrayView1<f32>) -> Array1<f32> {
    let max = x.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let exp = x.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Clamp every element into `[low, high]`.
pub fn clip(x: &Tensor, low: f32, high: f32) -> Tensor {
    x.mapv(|v| v.clamp(low, high))
}

/// Tensor of Gaussian samples.
pub fn gaussian<R: Rng + ?Sized>(shape: &[usize], mean: f32, std: f32, rng: &mut R) -> Result<Tensor> {
    let normal = Normal::new(mean, std).map_err(|e| {
        GymkitError::invalid_parameter("std", e.to_string())
    })?;
    Ok(ArrayD::random_using(IxDyn(shape), normal, rng))
}

/// Draw an index from a categorical distribution.
///
/// Weights need not be normalized but must be non-negative with a positive sum.
pub fn sample_categorical<R: Rng + ?Sized>(probs: ArrayView1<f32>, rng: &mut R) -> Result<usize> {
    let dist = WeightedIndex::new(probs.iter().map(|&p| p.max(0.0))).map_err(|e| {
        GymkitError::invalid_parameter("probs", e.to_string())
    })?;
    Ok(dist.sample(rng))
}

/// Canonical textual form of a tensor: its shape followed by its elements.
pub fn canonical_string(x: &Tensor) -> String {
    let elements: Vec<String> = x.iter().map(|v| format!("{:?}", v)).collect();
    format!("{:?}[{}]", x.shape(), elements.join(","))
}

/// 32-bit FNV-1a hash of the canonical form of a tensor.
///
/// Equal tensors always hash equally; used as the key of tabular Q values.
pub fn hash_state(x: &Tensor) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    canonical_string(x)
        .bytes()
        .fold(OFFSET_BASIS, |hash, byte| (hash ^ byte as u32).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_expand_then_squeeze_restores_shape() {
        let x = from_flat(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        for axis in 0..=2 {
            let expanded = expand_dims(&x, axis).unwrap();
            assert_eq!(expanded.ndim(), 3);
            assert_eq!(squeeze(&expanded, axis).unwrap(), x);
        }
    }

    #[test]
    fn test_squeeze_rejects_non_singleton_axis() {
        let x = from_flat(vec![1.0, 2.0], &[2]).unwrap();
        assert!(matches!(squeeze(&x, 0), Err(GymkitError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_from_flat_checks_length() {
        assert!(from_flat(vec![1.0, 2.0, 3.0], &[2, 2]).is_err());
    }

    #[test]
    fn test_concat_and_stack() {
        let a = vector(&[1.0, 2.0]);
        let b = vector(&[3.0]);
        assert_eq!(flatten(&concat(0, &[&a, &b]).unwrap()), array![1.0, 2.0, 3.0]);

        let c = vector(&[3.0, 4.0]);
        let batch = stack_rows(&[&a, &c]).unwrap();
        assert_eq!(batch, array![[1.0, 2.0], [3.0, 4.0]]);
        assert!(stack_rows(&[&a, &b]).is_err());
    }

    #[test]
    fn test_one_hot_and_argmax() {
        let v = one_hot(2, 4).unwrap();
        assert_eq!(v, array![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(argmax(v.view()), 2);
        assert!(one_hot(4, 4).is_err());
        assert_eq!(argmax(array![1.0, 3.0, 3.0].view()), 1);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(array![1.0, 2.0, 3.0].view());
        assert!((p.sum() - 1.0).abs() < 1e-6);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn test_sample_categorical_respects_zero_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let i = sample_categorical(array![0.0, 1.0, 0.0].view(), &mut rng).unwrap();
            assert_eq!(i, 1);
        }
    }

    #[test]
    fn test_hash_state_is_stable() {
        let a = vector(&[0.0, 1.0, 2.0]);
        let b = vector(&[0.0, 1.0, 2.0]);
        let c = vector(&[0.0, 1.0, 3.0]);
        assert_eq!(hash_state(&a), hash_state(&b));
        assert_ne!(hash_state(&a), hash_state(&c));

        let reshaped = from_flat(vec![0.0, 1.0, 2.0], &[1, 3]).unwrap();
        assert_ne!(hash_state(&a), hash_state(&reshaped));
    }

    #[test]
    fn test_gaussian_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let g = gaussian(&[3, 2], 0.0, 1.0, &mut rng).unwrap();
        assert_eq!(g.shape(), &[3, 2]);
    }
}
