//! Sequence pooling for variable-length sparse features.
//!
//! A varlen feature is looked up as a padded `[batch, maxlen, dim]` sequence.
//! [`SequencePooling`] reduces it to one `[batch, 1, dim]` vector per example,
//! ignoring padded positions. Padding is found one of two ways:
//!
//! - **mask mode**: a `[batch, maxlen]` mask whose non-zero entries are valid
//!   positions (upstream derives it as `ids != 0`, so id 0 is padding);
//! - **length mode**: a `[batch, 1]` true length per example; positions at
//!   or past the length are padding.

use std::fmt;
use std::str::FromStr;

use funrec_tensor::{Tensor, TensorError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{InputError, InputResult};

/// Reduction applied over the unpadded positions of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Combiner {
    /// Sum of the valid position vectors.
    Sum,
    /// Sum divided by `max(1, valid positions)`.
    #[default]
    Mean,
}

impl Combiner {
    /// Returns the mode string (`"sum"` or `"mean"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Combiner::Sum => "sum",
            Combiner::Mean => "mean",
        }
    }
}

impl fmt::Display for Combiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Combiner {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(Combiner::Sum),
            "mean" => Ok(Combiner::Mean),
            other => Err(InputError::InvalidCombinerMode {
                mode: other.to_string(),
            }),
        }
    }
}

impl Serialize for Combiner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Combiner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Padding-aware pooling over `[batch, maxlen, dim]` sequences.
///
/// # Example
///
/// ```
/// use funrec_inputs::pooling::{Combiner, SequencePooling};
/// use funrec_tensor::Tensor;
///
/// let seq = Tensor::from_slice(&[1.0, 1.0, 2.0, 2.0, 0.0, 0.0], &[1, 3, 2]);
/// let mask = Tensor::from_slice(&[1.0, 1.0, 0.0], &[1, 3]);
///
/// let pooled = SequencePooling::new(Combiner::Mean, true)
///     .pool(&seq, &mask)
///     .unwrap();
/// assert_eq!(pooled.shape(), &[1, 1, 2]);
/// assert_eq!(pooled.to_vec(), vec![1.5, 1.5]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePooling {
    mode: Combiner,
    supports_masking: bool,
}

impl SequencePooling {
    /// Creates a pooling layer.
    ///
    /// With `supports_masking` the second `pool` input is a position mask,
    /// otherwise it is a per-example length.
    pub fn new(mode: Combiner, supports_masking: bool) -> Self {
        Self {
            mode,
            supports_masking,
        }
    }

    /// Returns the reduction mode.
    pub fn mode(&self) -> Combiner {
        self.mode
    }

    /// Returns whether the layer expects a mask rather than lengths.
    pub fn supports_masking(&self) -> bool {
        self.supports_masking
    }

    /// Pools `seq` (`[batch, maxlen, dim]`) into `[batch, 1, dim]`.
    pub fn pool(&self, seq: &Tensor, mask_or_length: &Tensor) -> InputResult<Tensor> {
        if seq.ndim() != 3 {
            return Err(TensorError::InvalidShape(format!(
                "sequence pooling expects [batch, maxlen, dim], got {:?}",
                seq.shape()
            ))
            .into());
        }
        let (batch, maxlen, dim) = (seq.shape()[0], seq.shape()[1], seq.shape()[2]);

        let valid = if self.supports_masking {
            mask_positions(mask_or_length, batch, maxlen)?
        } else {
            length_positions(mask_or_length, batch, maxlen)?
        };

        let values = seq.to_vec();
        let mut output = vec![0.0f32; batch * dim];
        for b in 0..batch {
            let mut count = 0usize;
            for t in 0..maxlen {
                if !valid[b * maxlen + t] {
                    continue;
                }
                count += 1;
                let src = (b * maxlen + t) * dim;
                for d in 0..dim {
                    output[b * dim + d] += values[src + d];
                }
            }
            if self.mode == Combiner::Mean {
                let denom = count.max(1) as f32;
                for v in &mut output[b * dim..(b + 1) * dim] {
                    *v /= denom;
                }
            }
        }

        Ok(Tensor::from_vec(output, &[batch, 1, dim])?)
    }
}

/// Parses `mode` and pools `seq` in one call.
///
/// Fails with [`InputError::InvalidCombinerMode`] for modes other than
/// `"sum"` and `"mean"`.
pub fn pool(
    seq: &Tensor,
    mask_or_length: &Tensor,
    mode: &str,
    masking: bool,
) -> InputResult<Tensor> {
    let mode: Combiner = mode.parse()?;
    SequencePooling::new(mode, masking).pool(seq, mask_or_length)
}

fn mask_positions(mask: &Tensor, batch: usize, maxlen: usize) -> InputResult<Vec<bool>> {
    if mask.numel() != batch * maxlen || mask.batch_size() != batch {
        return Err(TensorError::ShapeMismatch {
            expected: vec![batch, maxlen],
            got: mask.shape().to_vec(),
        }
        .into());
    }
    Ok(mask.as_ndarray().iter().map(|&m| m != 0.0).collect())
}

fn length_positions(lengths: &Tensor, batch: usize, maxlen: usize) -> InputResult<Vec<bool>> {
    if lengths.numel() != batch || lengths.batch_size() != batch {
        return Err(TensorError::ShapeMismatch {
            expected: vec![batch, 1],
            got: lengths.shape().to_vec(),
        }
        .into());
    }
    let mut valid = Vec::with_capacity(batch * maxlen);
    for length in lengths.to_indices() {
        let length = length.clamp(0, maxlen as i64) as usize;
        valid.extend((0..maxlen).map(|t| t < length));
    }
    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence() -> Tensor {
        Tensor::from_slice(&[1.0, 1.0, 2.0, 2.0, 0.0, 0.0], &[1, 3, 2])
    }

    #[test]
    fn test_sum_with_mask() {
        let mask = Tensor::from_slice(&[1.0, 1.0, 0.0], &[1, 3]);
        let out = pool(&sequence(), &mask, "sum", true).unwrap();
        assert_eq!(out.shape(), &[1, 1, 2]);
        assert_eq!(out.to_vec(), vec![3.0, 3.0]);
    }

    #[test]
    fn test_mean_with_mask() {
        let mask = Tensor::from_slice(&[1.0, 1.0, 0.0], &[1, 3]);
        let out = pool(&sequence(), &mask, "mean", true).unwrap();
        assert_eq!(out.to_vec(), vec![1.5, 1.5]);
    }

    #[test]
    fn test_mask_excludes_nonzero_values_at_padding() {
        let seq = Tensor::from_slice(&[1.0, 2.0, 3.0, 9.0, 9.0, 9.0], &[1, 3, 2]);
        let mask = Tensor::from_slice(&[1.0, 0.0, 0.0], &[1, 3]);
        let out = pool(&seq, &mask, "sum", true).unwrap();
        assert_eq!(out.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_mean_over_all_padding_is_zero() {
        let mask = Tensor::zeros(&[1, 3]);
        let out = pool(&sequence(), &mask, "mean", true).unwrap();
        assert_eq!(out.to_vec(), vec![0.0, 0.0]);

        let lengths = Tensor::zeros(&[1, 1]);
        let out = pool(&sequence(), &lengths, "mean", false).unwrap();
        assert_eq!(out.to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_length_mode() {
        let seq = Tensor::from_slice(
            &[
                1.0, 1.0, 2.0, 2.0, 3.0, 3.0, // example 0
                4.0, 4.0, 5.0, 5.0, 6.0, 6.0, // example 1
            ],
            &[2, 3, 2],
        );
        let lengths = Tensor::from_slice(&[2.0, 1.0], &[2, 1]);

        let sum = pool(&seq, &lengths, "sum", false).unwrap();
        assert_eq!(sum.to_vec(), vec![3.0, 3.0, 4.0, 4.0]);

        let mean = pool(&seq, &lengths, "mean", false).unwrap();
        assert_eq!(mean.to_vec(), vec![1.5, 1.5, 4.0, 4.0]);
    }

    #[test]
    fn test_length_longer_than_maxlen_is_clamped() {
        let lengths = Tensor::from_slice(&[10.0], &[1, 1]);
        let out = pool(&sequence(), &lengths, "mean", false).unwrap();
        assert_eq!(out.to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_invalid_mode() {
        let mask = Tensor::ones(&[1, 3]);
        let err = pool(&sequence(), &mask, "max", true).unwrap_err();
        assert!(matches!(err, InputError::InvalidCombinerMode { mode } if mode == "max"));
    }

    #[test]
    fn test_shape_errors() {
        let bad_mask = Tensor::ones(&[1, 2]);
        assert!(matches!(
            pool(&sequence(), &bad_mask, "sum", true),
            Err(InputError::Tensor(_))
        ));

        let flat = Tensor::ones(&[1, 6]);
        assert!(pool(&flat, &Tensor::ones(&[1, 1]), "sum", false).is_err());
    }

    #[test]
    fn test_combiner_parse_and_display() {
        assert_eq!("sum".parse::<Combiner>().unwrap(), Combiner::Sum);
        assert_eq!(Combiner::Mean.to_string(), "mean");
        assert_eq!(Combiner::default(), Combiner::Mean);
        assert!("Mean".parse::<Combiner>().is_err());
    }
}
