//! Tensor primitives for funrec feature inputs.
//!
//! This crate provides the small tensor substrate the input pipeline is built
//! on: an `ndarray`-backed [`Tensor`] holding `f32` values of any rank, the
//! [`DType`] a feature column declares, and the [`Device`] an embedding table
//! is placed on.
//!
//! # Example
//!
//! ```rust
//! use funrec_tensor::Tensor;
//!
//! // Two examples, three columns each.
//! let x = Tensor::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
//!
//! // Column slice `x[:, 0:2]`.
//! let ids = x.narrow(1, 0, 2).unwrap();
//! assert_eq!(ids.to_indices(), vec![1, 2, 4, 5]);
//!
//! // Concatenate along the last axis and flatten per example.
//! let joined = Tensor::cat_last(&[ids, x.narrow(1, 2, 3).unwrap()]).unwrap();
//! assert_eq!(joined.flatten(1).unwrap().shape(), &[2, 3]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod device;
pub mod dtype;
pub mod tensor;

pub use device::Device;
pub use dtype::DType;
pub use tensor::Tensor;

/// Error types for tensor operations.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// Shape mismatch error.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape.
        got: Vec<usize>,
    },

    /// Invalid shape error.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Axis out of range for the tensor rank.
    #[error("Invalid axis {axis} for tensor of rank {ndim}")]
    InvalidAxis {
        /// The requested axis.
        axis: usize,
        /// The tensor rank.
        ndim: usize,
    },

    /// An operation that needs at least one tensor got none.
    #[error("Empty tensor list")]
    EmptyInput,

    /// Unrecognised device string.
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    /// Unrecognised dtype string.
    #[error("Invalid dtype: {0}")]
    InvalidDType(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

/// Result type for tensor operations.
pub type TensorResult<T> = Result<T, TensorError>;
