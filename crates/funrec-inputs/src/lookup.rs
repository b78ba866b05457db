//! Embedding lookups over the flattened input buffer.
//!
//! Every function here takes the batch buffer `X` (`[batch, width]`), the
//! [`FeatureLayout`] built from the same descriptor list, and resolves
//! features by slicing `X[:, start:end]`:
//!
//! | function                     | feature kind | output per feature          |
//! |------------------------------|--------------|-----------------------------|
//! | [`embedding_lookup`]         | sparse       | `[batch, 1, dim]`, grouped  |
//! | [`varlen_embedding_lookup`]  | varlen       | `[batch, maxlen, dim]`      |
//! | [`varlen_pooling_list`]      | varlen       | `[batch, 1, dim]`           |
//! | [`dense_input`]              | dense        | `[batch, dimension]`        |
//! | [`maxlen_lookup`]            | length       | `[batch, 1]`                |

use std::collections::HashMap;

use funrec_tensor::Tensor;
use tracing::{debug, warn};

use crate::embedding::EmbeddingTableSet;
use crate::error::{InputError, InputResult};
use crate::feature::{
    sparse_columns, varlen_columns, FeatureColumn, FeatureGroup, SparseFeat, VarLenSparseFeat,
};
use crate::layout::FeatureLayout;
use crate::pooling::SequencePooling;

/// Feature filters for [`embedding_lookup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupOptions {
    /// Only these features are looked up; empty means all.
    pub return_feat_list: Vec<String>,
    /// Features to mask in hashed lookups.
    ///
    /// Hashed features are rejected, so this never changes results.
    pub mask_feat_list: Vec<String>,
}

impl LookupOptions {
    /// Creates options that look up every feature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the lookup to `names`.
    pub fn return_features<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.return_feat_list = names.into_iter().map(Into::into).collect();
        self
    }

    /// Records features to mask.
    pub fn mask_features<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mask_feat_list = names.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if `name` passes the return filter.
    pub fn selects(&self, name: &str) -> bool {
        self.return_feat_list.is_empty() || self.return_feat_list.iter().any(|n| n == name)
    }
}

/// Embeddings keyed by feature group, in first-seen group order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedEmbeddings {
    groups: Vec<(FeatureGroup, Vec<Tensor>)>,
}

impl GroupedEmbeddings {
    fn push(&mut self, group: &FeatureGroup, embedding: Tensor) {
        match self.groups.iter_mut().find(|(g, _)| g == group) {
            Some((_, list)) => list.push(embedding),
            None => self.groups.push((group.clone(), vec![embedding])),
        }
    }

    /// Returns the embeddings of a group, in descriptor order.
    pub fn get(&self, group: &str) -> Option<&[Tensor]> {
        self.groups
            .iter()
            .find(|(g, _)| g.as_str() == group)
            .map(|(_, list)| list.as_slice())
    }

    /// Returns the groups in first-seen order.
    pub fn groups(&self) -> impl Iterator<Item = &FeatureGroup> {
        self.groups.iter().map(|(g, _)| g)
    }

    /// Returns the number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if nothing was looked up.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Flattens every group's list into one, groups in first-seen order.
    pub fn into_list(self) -> Vec<Tensor> {
        self.groups.into_iter().flat_map(|(_, list)| list).collect()
    }
}

fn slice(x: &Tensor, layout: &FeatureLayout, name: &str) -> InputResult<Tensor> {
    let range = layout.require(name)?;
    Ok(x.narrow(1, range.start, range.end)?)
}

fn reject_hashed(feat: &SparseFeat) -> InputResult<()> {
    if feat.use_hash() {
        warn!(feature = feat.name(), "hashed lookup requested");
        return Err(InputError::UnsupportedFeature {
            name: feat.name().to_string(),
            reason: "feature hashing on the fly is not supported".to_string(),
        });
    }
    Ok(())
}

/// Looks up sparse features and groups the `[batch, 1, dim]` results.
///
/// Features outside `options.return_feat_list` are skipped. Within a group
/// the order follows `features`.
pub fn embedding_lookup(
    x: &Tensor,
    tables: &EmbeddingTableSet,
    layout: &FeatureLayout,
    features: &[&SparseFeat],
    options: &LookupOptions,
) -> InputResult<GroupedEmbeddings> {
    let mut grouped = GroupedEmbeddings::default();
    for feat in features.iter().filter(|f| options.selects(f.name())) {
        reject_hashed(feat)?;
        let ids = slice(x, layout, feat.name())?;
        let embedding = tables.for_feature(feat)?.lookup(&ids)?;
        debug!(
            feature = feat.name(),
            group = %feat.group_name(),
            shape = ?embedding.shape(),
            "sparse lookup"
        );
        grouped.push(feat.group_name(), embedding);
    }
    Ok(grouped)
}

/// Looks up each sequence feature without pooling.
///
/// Returns feature name to `[batch, maxlen, dim]`.
pub fn varlen_embedding_lookup(
    x: &Tensor,
    tables: &EmbeddingTableSet,
    layout: &FeatureLayout,
    features: &[&VarLenSparseFeat],
) -> InputResult<HashMap<String, Tensor>> {
    let mut sequences = HashMap::with_capacity(features.len());
    for feat in features {
        reject_hashed(feat.sparse_feat())?;
        let ids = slice(x, layout, feat.name())?;
        let sequence = tables.for_feature(feat.sparse_feat())?.lookup(&ids)?;
        sequences.insert(feat.name().to_string(), sequence);
    }
    Ok(sequences)
}

/// Pools each sequence feature's looked-up embeddings to `[batch, 1, dim]`.
///
/// A feature without a length column is masked by `X[:, seq] != 0`; one with
/// a length column is cut at the length read from `X`.
pub fn varlen_pooling_list(
    embeddings: &HashMap<String, Tensor>,
    x: &Tensor,
    layout: &FeatureLayout,
    features: &[&VarLenSparseFeat],
) -> InputResult<Vec<Tensor>> {
    features
        .iter()
        .map(|feat| {
            let sequence = embeddings
                .get(feat.name())
                .ok_or_else(|| InputError::MissingFeature {
                    name: feat.name().to_string(),
                })?;
            match feat.length_name() {
                None => {
                    let mask = slice(x, layout, feat.name())?
                        .map(|id| if id.trunc() != 0.0 { 1.0 } else { 0.0 });
                    SequencePooling::new(feat.combiner(), true).pool(sequence, &mask)
                }
                Some(length_name) => {
                    let range =
                        layout
                            .range(length_name)
                            .ok_or_else(|| InputError::MissingLengthColumn {
                                message: format!(
                                    "`{}` has no column for length feature `{}`",
                                    feat.name(),
                                    length_name
                                ),
                            })?;
                    let lengths = x.narrow(1, range.start, range.end)?;
                    SequencePooling::new(feat.combiner(), false).pool(sequence, &lengths)
                }
            }
        })
        .collect()
}

/// Returns the `[batch, dimension]` slice of every dense column, in order.
pub fn dense_input(
    x: &Tensor,
    layout: &FeatureLayout,
    columns: &[FeatureColumn],
) -> InputResult<Vec<Tensor>> {
    columns
        .iter()
        .filter_map(|c| match c {
            FeatureColumn::Dense(feat) => Some(slice(x, layout, feat.name())),
            _ => None,
        })
        .collect()
}

/// Returns the `[batch, 1]` slice of the first length column named.
///
/// Models that consume raw sequences (rather than pooled ones) need the true
/// lengths; an empty `length_columns` fails with
/// [`InputError::MissingLengthColumn`].
pub fn maxlen_lookup(
    x: &Tensor,
    layout: &FeatureLayout,
    length_columns: &[String],
) -> InputResult<Tensor> {
    let name = length_columns
        .first()
        .ok_or_else(|| InputError::MissingLengthColumn {
            message: "a length column is required for sequence inputs".to_string(),
        })?;
    slice(x, layout, name)
}

/// Resolves every feature of `columns` into model-ready inputs.
///
/// Returns `(sparse, dense)`: sparse lookups (groups flattened) followed by
/// pooled sequence vectors, and dense slices. Both lists feed
/// [`combined_dnn_input`](crate::combine::combined_dnn_input).
pub fn input_from_feature_columns(
    x: &Tensor,
    layout: &FeatureLayout,
    columns: &[FeatureColumn],
    tables: &EmbeddingTableSet,
) -> InputResult<(Vec<Tensor>, Vec<Tensor>)> {
    let sparse = sparse_columns(columns);
    let varlen = varlen_columns(columns);

    let mut sparse_list =
        embedding_lookup(x, tables, layout, &sparse, &LookupOptions::default())?.into_list();
    let sequences = varlen_embedding_lookup(x, tables, layout, &varlen)?;
    sparse_list.extend(varlen_pooling_list(&sequences, x, layout, &varlen)?);

    let dense_list = dense_input(x, layout, columns)?;
    debug!(
        sparse = sparse_list.len(),
        dense = dense_list.len(),
        "resolved feature inputs"
    );
    Ok((sparse_list, dense_list))
}
