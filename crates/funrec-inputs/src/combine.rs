//! Merges resolved feature inputs into one flat tensor per example.

use funrec_tensor::Tensor;

use crate::error::{InputError, InputResult};

fn flatten_cat(tensors: &[Tensor]) -> InputResult<Tensor> {
    Ok(Tensor::cat_last(tensors)?.flatten(1)?)
}

/// Concatenates sparse embeddings and dense values into `[batch, features]`.
///
/// Each side is concatenated along its last axis and flattened from axis 1;
/// the two results are then joined with sparse first. A side that is empty
/// is left out, and two empty sides fail with [`InputError::NoInputFeatures`].
///
/// # Example
///
/// ```
/// use funrec_inputs::combine::combined_dnn_input;
/// use funrec_tensor::Tensor;
///
/// let emb = Tensor::from_slice(&[0.1, 0.2], &[1, 1, 2]);
/// let price = Tensor::from_slice(&[3.2], &[1, 1]);
///
/// let out = combined_dnn_input(&[emb], &[price]).unwrap();
/// assert_eq!(out.shape(), &[1, 3]);
/// assert_eq!(out.to_vec(), vec![0.1, 0.2, 3.2]);
/// ```
pub fn combined_dnn_input(sparse: &[Tensor], dense: &[Tensor]) -> InputResult<Tensor> {
    match (sparse.is_empty(), dense.is_empty()) {
        (false, false) => {
            let sparse = flatten_cat(sparse)?;
            let dense = flatten_cat(dense)?;
            Ok(Tensor::cat_last(&[sparse, dense])?)
        }
        (false, true) => flatten_cat(sparse),
        (true, false) => flatten_cat(dense),
        (true, true) => Err(InputError::NoInputFeatures),
    }
}
