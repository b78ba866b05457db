//! Dense `f32` tensor backed by `ndarray`.
//!
//! [`Tensor`] is the batch container used by the input pipeline: flattened
//! per-example buffers, embedding tables and the vectors assembled from them.
//! It supports the handful of operations the pipeline needs (column slicing,
//! concatenation, flattening and row gathers) and reports shape problems as
//! [`TensorError`] values instead of panicking.

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{TensorError, TensorResult};

/// A dynamically ranked, row-major `f32` tensor.
///
/// # Examples
///
/// ```
/// use funrec_tensor::Tensor;
///
/// let t = Tensor::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
/// let cols = t.narrow(1, 1, 3).unwrap();
/// assert_eq!(cols.shape(), &[2, 2]);
/// assert_eq!(cols.to_vec(), vec![2.0, 3.0, 5.0, 6.0]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    /// Creates a tensor filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    /// Creates a tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::ones(IxDyn(shape)),
        }
    }

    /// Creates a tensor from row-major data.
    ///
    /// # Panics
    ///
    /// Panics if the data length does not match the shape.
    pub fn from_slice(data: &[f32], shape: &[usize]) -> Self {
        match Self::from_vec(data.to_vec(), shape) {
            Ok(tensor) => tensor,
            Err(e) => panic!(
                "Data length {} does not match shape {:?}: {}",
                data.len(),
                shape,
                e
            ),
        }
    }

    /// Creates a tensor from an owned row-major buffer.
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> TensorResult<Self> {
        let expected_len = checked_numel(shape)?;
        if data.len() != expected_len {
            return Err(TensorError::InvalidShape(format!(
                "{} elements cannot fill shape {:?}",
                data.len(),
                shape
            )));
        }
        let data = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| TensorError::InvalidShape(e.to_string()))?;
        Ok(Self { data })
    }

    /// Wraps an existing ndarray.
    pub fn from_ndarray(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    /// Samples every element independently from `N(mean, std^2)`.
    pub fn randn<R: Rng + ?Sized>(
        shape: &[usize],
        mean: f32,
        std: f32,
        rng: &mut R,
    ) -> TensorResult<Self> {
        let normal = Normal::new(mean, std)
            .map_err(|e| TensorError::Other(format!("invalid normal distribution: {}", e)))?;
        let numel = checked_numel(shape)?;
        let mut data = Vec::with_capacity(numel);
        for _ in 0..numel {
            data.push(normal.sample(&mut *rng));
        }
        Self::from_vec(data, shape)
    }

    /// Returns the shape.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Returns the number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns the leading (batch) dimension, or 0 for a scalar.
    pub fn batch_size(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    /// Copies the elements out in row-major order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Truncates every element toward zero and returns it as an index.
    pub fn to_indices(&self) -> Vec<i64> {
        self.data.iter().map(|&v| v.trunc() as i64).collect()
    }

    /// Returns a reference to the underlying ndarray.
    pub fn as_ndarray(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// Returns a mutable reference to the underlying ndarray.
    pub fn as_ndarray_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    /// Consumes the tensor and returns the underlying ndarray.
    pub fn into_ndarray(self) -> ArrayD<f32> {
        self.data
    }

    /// Returns the half-open range `[start, end)` along `axis`.
    ///
    /// This is the `x[:, start:end]` column slice for `axis == 1`.
    pub fn narrow(&self, axis: usize, start: usize, end: usize) -> TensorResult<Self> {
        self.check_axis(axis)?;
        let len = self.shape()[axis];
        if start > end || end > len {
            return Err(TensorError::InvalidShape(format!(
                "range {}..{} out of bounds for axis {} of length {}",
                start, end, axis, len
            )));
        }
        let view = self.data.slice_axis(Axis(axis), Slice::from(start..end));
        Ok(Self {
            data: view.to_owned(),
        })
    }

    /// Gathers rows (entries along axis 0) in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> TensorResult<Self> {
        self.check_axis(0)?;
        let len = self.shape()[0];
        if let Some(&bad) = rows.iter().find(|&&row| row >= len) {
            return Err(TensorError::InvalidShape(format!(
                "row {} out of bounds for {} rows",
                bad, len
            )));
        }
        Ok(Self {
            data: self.data.select(Axis(0), rows),
        })
    }

    /// Concatenates tensors along `axis`.
    ///
    /// All tensors must share rank and agree on every other dimension.
    pub fn cat(tensors: &[Tensor], axis: usize) -> TensorResult<Self> {
        let first = tensors.first().ok_or(TensorError::EmptyInput)?;
        first.check_axis(axis)?;
        for t in &tensors[1..] {
            let compatible = t.ndim() == first.ndim()
                && t
                    .shape()
                    .iter()
                    .zip(first.shape())
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(TensorError::ShapeMismatch {
                    expected: first.shape().to_vec(),
                    got: t.shape().to_vec(),
                });
            }
        }
        let views: Vec<ArrayViewD<'_, f32>> = tensors.iter().map(|t| t.data.view()).collect();
        let data = ndarray::concatenate(Axis(axis), &views)
            .map_err(|e| TensorError::InvalidShape(e.to_string()))?;
        Ok(Self { data })
    }

    /// Concatenates tensors along their last axis (`dim=-1`).
    pub fn cat_last(tensors: &[Tensor]) -> TensorResult<Self> {
        let first = tensors.first().ok_or(TensorError::EmptyInput)?;
        if first.ndim() == 0 {
            return Err(TensorError::InvalidAxis { axis: 0, ndim: 0 });
        }
        Self::cat(tensors, first.ndim() - 1)
    }

    /// Collapses every axis from `start_dim` onward into one.
    ///
    /// `flatten(1)` turns `[B, N, D]` into `[B, N * D]`.
    pub fn flatten(&self, start_dim: usize) -> TensorResult<Self> {
        self.check_axis(start_dim)?;
        let shape = self.shape();
        let mut new_shape: Vec<usize> = shape[..start_dim].to_vec();
        new_shape.push(checked_numel(&shape[start_dim..])?);
        self.reshape(&new_shape)
    }

    /// Returns a copy with a new shape holding the same number of elements.
    pub fn reshape(&self, new_shape: &[usize]) -> TensorResult<Self> {
        let new_numel = checked_numel(new_shape)?;
        if new_numel != self.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: new_shape.to_vec(),
                got: self.shape().to_vec(),
            });
        }
        Self::from_vec(self.to_vec(), new_shape)
    }

    /// Applies a function element-wise.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f32) -> f32,
    {
        Self {
            data: self.data.mapv(f),
        }
    }

    fn check_axis(&self, axis: usize) -> TensorResult<()> {
        if axis >= self.ndim() {
            return Err(TensorError::InvalidAxis {
                axis,
                ndim: self.ndim(),
            });
        }
        Ok(())
    }
}

/// Element count of `shape`, or an error if it does not fit in `usize`.
fn checked_numel(shape: &[usize]) -> TensorResult<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| TensorError::InvalidShape(format!("shape {:?} overflows usize", shape)))
}

impl From<ArrayD<f32>> for Tensor {
    fn from(data: ArrayD<f32>) -> Self {
        Self::from_ndarray(data)
    }
}

impl From<Tensor> for ArrayD<f32> {
    fn from(tensor: Tensor) -> Self {
        tensor.into_ndarray()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zeros_and_ones() {
        let z = Tensor::zeros(&[2, 3, 4]);
        assert_eq!(z.shape(), &[2, 3, 4]);
        assert_eq!(z.numel(), 24);
        assert!(z.to_vec().iter().all(|&x| x == 0.0));
        assert!(Tensor::ones(&[2]).to_vec().iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_from_vec_rejects_bad_length() {
        assert!(Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]).is_err());
    }

    #[test]
    #[should_panic(expected = "does not match shape")]
    fn test_from_slice_panics_on_bad_length() {
        let _ = Tensor::from_slice(&[1.0, 2.0, 3.0], &[2, 2]);
    }

    #[test]
    fn test_narrow_columns() {
        let t = Tensor::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let c = t.narrow(1, 0, 1).unwrap();
        assert_eq!(c.shape(), &[2, 1]);
        assert_eq!(c.to_vec(), vec![1.0, 4.0]);

        let empty = t.narrow(1, 2, 2).unwrap();
        assert_eq!(empty.shape(), &[2, 0]);

        assert!(t.narrow(1, 2, 4).is_err());
        assert!(t.narrow(2, 0, 1).is_err());
    }

    #[test]
    fn test_select_rows() {
        let t = Tensor::from_slice(&[0.0, 0.0, 1.0, 1.0, 2.0, 2.0], &[3, 2]);
        let rows = t.select_rows(&[2, 0, 2]).unwrap();
        assert_eq!(rows.shape(), &[3, 2]);
        assert_eq!(rows.to_vec(), vec![2.0, 2.0, 0.0, 0.0, 2.0, 2.0]);
        assert!(t.select_rows(&[3]).is_err());
    }

    #[test]
    fn test_cat_last_axis() {
        let a = Tensor::from_slice(&[1.0, 2.0], &[2, 1]);
        let b = Tensor::from_slice(&[3.0, 4.0, 5.0, 6.0], &[2, 2]);
        let c = Tensor::cat_last(&[a, b]).unwrap();
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.to_vec(), vec![1.0, 3.0, 4.0, 2.0, 5.0, 6.0]);
    }

    #[test]
    fn test_cat_rejects_mismatch() {
        let a = Tensor::zeros(&[2, 1]);
        let b = Tensor::zeros(&[3, 1]);
        assert!(matches!(
            Tensor::cat_last(&[a, b]),
            Err(TensorError::ShapeMismatch { .. })
        ));
        assert!(matches!(Tensor::cat_last(&[]), Err(TensorError::EmptyInput)));
    }

    #[test]
    fn test_flatten_from_dim_one() {
        let t = Tensor::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 1, 3]);
        let f = t.flatten(1).unwrap();
        assert_eq!(f.shape(), &[2, 3]);
        assert_eq!(f.to_vec(), t.to_vec());
        assert!(Tensor::zeros(&[4]).flatten(1).is_err());
    }

    #[test]
    fn test_flatten_after_narrow_keeps_row_major_order() {
        let t = Tensor::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let narrowed = t.narrow(1, 1, 3).unwrap();
        let reshaped = narrowed.reshape(&[4]).unwrap();
        assert_eq!(reshaped.to_vec(), vec![2.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn test_to_indices_truncates() {
        let t = Tensor::from_slice(&[0.0, 1.9, 2.0, -0.5], &[4]);
        assert_eq!(t.to_indices(), vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_randn_is_seeded() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        let x = Tensor::randn(&[4, 3], 0.0, 1.0, &mut a).unwrap();
        let y = Tensor::randn(&[4, 3], 0.0, 1.0, &mut b).unwrap();
        assert_eq!(x, y);
        assert_eq!(x.shape(), &[4, 3]);
    }

    #[test]
    fn test_oversized_shapes_are_rejected_before_allocation() {
        let huge = [1usize << 33, 1usize << 33, 1usize << 33];
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            Tensor::randn(&huge, 0.0, 1.0, &mut rng),
            Err(TensorError::InvalidShape(_))
        ));
        assert!(matches!(
            Tensor::from_vec(vec![], &huge),
            Err(TensorError::InvalidShape(_))
        ));
        assert!(Tensor::zeros(&[2, 2]).reshape(&huge).is_err());
    }

    #[test]
    #[should_panic(expected = "overflows usize")]
    fn test_from_slice_panics_on_overflowing_shape() {
        let _ = Tensor::from_slice(&[], &[usize::MAX, 2]);
    }

    #[test]
    fn test_randn_rejects_negative_std() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Tensor::randn(&[2], 0.0, -1.0, &mut rng).is_err());
    }
}
