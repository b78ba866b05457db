//! Column layout of the flattened per-example input buffer.
//!
//! A model receives one `[batch, width]` buffer per batch. [`build_layout`]
//! assigns each feature a half-open column range of that buffer, in
//! descriptor order:
//!
//! - a sparse feature takes 1 column;
//! - a dense feature takes `dimension` columns;
//! - a varlen feature takes `maxlen` columns, followed by 1 column for its
//!   `length_name` if that name has not been placed yet.
//!
//! A name that already has a range is skipped, so the first declaration wins
//! and a shared length feature is only allocated once.
//!
//! [`LayoutCache`] hands out the same [`FeatureLayout`] for an equal
//! descriptor list so every lookup over that list agrees on the offsets.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{InputError, InputResult};
use crate::feature::FeatureColumn;

/// A half-open column range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRange {
    /// First column.
    pub start: usize,
    /// One past the last column.
    pub end: usize,
}

impl ColumnRange {
    /// Creates a range.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if the range has no columns.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One feature's place in the layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    /// Feature name.
    pub name: String,
    /// Assigned columns.
    #[serde(flatten)]
    pub range: ColumnRange,
}

/// Ordered mapping from feature name to column range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureLayout {
    entries: Vec<LayoutEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl FeatureLayout {
    /// Returns the range of `name`, if placed.
    pub fn range(&self, name: &str) -> Option<ColumnRange> {
        self.index.get(name).map(|&i| self.entries[i].range)
    }

    /// Returns the range of `name` or [`InputError::MissingFeature`].
    pub fn require(&self, name: &str) -> InputResult<ColumnRange> {
        self.range(name).ok_or_else(|| InputError::MissingFeature {
            name: name.to_string(),
        })
    }

    /// Returns true if `name` has a range.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns the feature names in layout order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Iterates over entries in layout order.
    pub fn iter(&self) -> impl Iterator<Item = &LayoutEntry> {
        self.entries.iter()
    }

    /// Returns the number of placed features.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is placed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the total number of columns the buffer must have.
    pub fn total_width(&self) -> usize {
        self.entries.last().map(|e| e.range.end).unwrap_or(0)
    }

    fn place(&mut self, name: &str, cursor: &mut usize, width: usize) -> InputResult<()> {
        let end = cursor
            .checked_add(width)
            .ok_or_else(|| InputError::InvalidFeatureConfig {
                message: format!(
                    "feature `{}` at column {} with width {} overflows the input width",
                    name, cursor, width
                ),
            })?;
        let range = ColumnRange::new(*cursor, end);
        debug!(feature = name, start = range.start, end = range.end, "placed feature");
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push(LayoutEntry {
            name: name.to_string(),
            range,
        });
        *cursor = end;
        Ok(())
    }
}

/// Computes the column layout for an ordered descriptor list.
///
/// Fails with [`InputError::InvalidFeatureConfig`] if the total width does
/// not fit in `usize`.
///
/// # Example
///
/// ```
/// use funrec_inputs::feature::{DenseFeat, FeatureColumn, SparseFeat, VarLenSparseFeat};
/// use funrec_inputs::layout::{build_layout, ColumnRange};
///
/// let hist = SparseFeat::new("hist_item", 100).unwrap();
/// let columns: Vec<FeatureColumn> = vec![
///     SparseFeat::new("user_id", 10).unwrap().into(),
///     DenseFeat::new("price", 2).unwrap().into(),
///     VarLenSparseFeat::builder(hist, 5).length_name("hist_len").build().unwrap().into(),
/// ];
///
/// let layout = build_layout(&columns).unwrap();
/// assert_eq!(layout.range("user_id"), Some(ColumnRange::new(0, 1)));
/// assert_eq!(layout.range("price"), Some(ColumnRange::new(1, 3)));
/// assert_eq!(layout.range("hist_item"), Some(ColumnRange::new(3, 8)));
/// assert_eq!(layout.range("hist_len"), Some(ColumnRange::new(8, 9)));
/// assert_eq!(layout.total_width(), 9);
/// ```
pub fn build_layout(columns: &[FeatureColumn]) -> InputResult<FeatureLayout> {
    let mut layout = FeatureLayout::default();
    let mut cursor = 0usize;

    for column in columns {
        if layout.contains(column.name()) {
            debug!(feature = column.name(), "feature already placed, skipping");
            continue;
        }
        match column {
            FeatureColumn::Sparse(feat) => layout.place(feat.name(), &mut cursor, 1)?,
            FeatureColumn::Dense(feat) => {
                layout.place(feat.name(), &mut cursor, feat.dimension())?
            }
            FeatureColumn::VarLenSparse(feat) => {
                layout.place(feat.name(), &mut cursor, feat.maxlen())?;
                if let Some(length_name) = feat.length_name() {
                    if !layout.contains(length_name) {
                        layout.place(length_name, &mut cursor, 1)?;
                    }
                }
            }
        }
    }

    Ok(layout)
}

/// Returns every name the layout of `columns` places, in order.
///
/// Length columns introduced by varlen features are included.
pub fn get_feature_names(columns: &[FeatureColumn]) -> InputResult<Vec<String>> {
    Ok(build_layout(columns)?.names().map(str::to_string).collect())
}

/// Structural fingerprint of a descriptor list.
///
/// Descriptors compare by name only; the cache key also captures kind,
/// width and length column so differently shaped lists never share a layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayoutKey(Vec<(&'static str, String, usize, Option<String>)>);

impl LayoutKey {
    /// Fingerprints a descriptor list.
    pub fn of(columns: &[FeatureColumn]) -> Self {
        Self(
            columns
                .iter()
                .map(|c| {
                    let length_name = match c {
                        FeatureColumn::VarLenSparse(feat) => {
                            feat.length_name().map(str::to_string)
                        }
                        _ => None,
                    };
                    (c.kind(), c.name().to_string(), c.width(), length_name)
                })
                .collect(),
        )
    }
}

/// Memoises layouts per distinct descriptor list.
#[derive(Debug, Default)]
pub struct LayoutCache {
    layouts: RwLock<HashMap<LayoutKey, Arc<FeatureLayout>>>,
}

impl LayoutCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached layout for `columns`, building it on first use.
    ///
    /// Layouts that fail to build are not cached.
    pub fn get_or_build(&self, columns: &[FeatureColumn]) -> InputResult<Arc<FeatureLayout>> {
        let key = LayoutKey::of(columns);
        if let Some(layout) = self.layouts.read().get(&key) {
            return Ok(Arc::clone(layout));
        }
        let layout = build_layout(columns)?;
        let mut layouts = self.layouts.write();
        Ok(Arc::clone(layouts.entry(key).or_insert_with(|| Arc::new(layout))))
    }

    /// Returns the number of cached layouts.
    pub fn len(&self) -> usize {
        self.layouts.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.layouts.read().is_empty()
    }

    /// Drops every cached layout.
    pub fn clear(&self) {
        self.layouts.write().clear();
    }
}

static SHARED_LAYOUTS: Lazy<LayoutCache> = Lazy::new(LayoutCache::new);

/// Returns the process-wide cached layout for `columns`.
pub fn shared_layout(columns: &[FeatureColumn]) -> InputResult<Arc<FeatureLayout>> {
    SHARED_LAYOUTS.get_or_build(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{DenseFeat, SparseFeat, VarLenSparseFeat};

    fn varlen(name: &str, maxlen: usize, length_name: Option<&str>) -> FeatureColumn {
        let sparse = SparseFeat::new(name, 100).unwrap();
        let mut builder = VarLenSparseFeat::builder(sparse, maxlen);
        if let Some(length_name) = length_name {
            builder = builder.length_name(length_name);
        }
        builder.build().unwrap().into()
    }

    #[test]
    fn test_sparse_and_dense_widths() {
        let columns: Vec<FeatureColumn> = vec![
            SparseFeat::new("a", 10).unwrap().into(),
            DenseFeat::new("b", 3).unwrap().into(),
            SparseFeat::new("c", 10).unwrap().into(),
        ];
        let layout = build_layout(&columns).unwrap();
        assert_eq!(layout.range("a"), Some(ColumnRange::new(0, 1)));
        assert_eq!(layout.range("b"), Some(ColumnRange::new(1, 4)));
        assert_eq!(layout.range("c"), Some(ColumnRange::new(4, 5)));
        assert_eq!(layout.total_width(), 5);
    }

    #[test]
    fn test_varlen_without_length_takes_maxlen() {
        let layout = build_layout(&[varlen("hist", 5, None)]).unwrap();
        assert_eq!(layout.range("hist"), Some(ColumnRange::new(0, 5)));
        assert_eq!(layout.total_width(), 5);
    }

    #[test]
    fn test_varlen_with_length_takes_one_more() {
        let layout = build_layout(&[varlen("hist", 5, Some("hist_len"))]).unwrap();
        assert_eq!(layout.range("hist"), Some(ColumnRange::new(0, 5)));
        assert_eq!(layout.range("hist_len"), Some(ColumnRange::new(5, 6)));
        assert_eq!(layout.total_width(), 6);
    }

    #[test]
    fn test_shared_length_column_allocated_once() {
        let layout = build_layout(&[
            varlen("hist_item", 5, Some("hist_len")),
            varlen("hist_cate", 5, Some("hist_len")),
        ]).unwrap();
        assert_eq!(layout.range("hist_item"), Some(ColumnRange::new(0, 5)));
        assert_eq!(layout.range("hist_len"), Some(ColumnRange::new(5, 6)));
        assert_eq!(layout.range("hist_cate"), Some(ColumnRange::new(6, 11)));
        assert_eq!(layout.len(), 3);
    }

    #[test]
    fn test_first_declaration_wins() {
        let columns: Vec<FeatureColumn> = vec![
            SparseFeat::new("x", 10).unwrap().into(),
            DenseFeat::new("x", 4).unwrap().into(),
            DenseFeat::new("y", 2).unwrap().into(),
        ];
        let layout = build_layout(&columns).unwrap();
        assert_eq!(layout.range("x"), Some(ColumnRange::new(0, 1)));
        assert_eq!(layout.range("y"), Some(ColumnRange::new(1, 3)));
    }

    #[test]
    fn test_declared_length_feature_is_not_reallocated() {
        let columns: Vec<FeatureColumn> = vec![
            SparseFeat::new("hist_len", 10).unwrap().into(),
            varlen("hist", 3, Some("hist_len")),
        ];
        let layout = build_layout(&columns).unwrap();
        assert_eq!(layout.range("hist_len"), Some(ColumnRange::new(0, 1)));
        assert_eq!(layout.range("hist"), Some(ColumnRange::new(1, 4)));
        assert_eq!(layout.total_width(), 4);
    }

    #[test]
    fn test_feature_names_include_length_columns() {
        let columns: Vec<FeatureColumn> = vec![
            SparseFeat::new("user", 10).unwrap().into(),
            varlen("hist", 3, Some("hist_len")),
        ];
        assert_eq!(get_feature_names(&columns).unwrap(), vec!["user", "hist", "hist_len"]);
    }

    #[test]
    fn test_require_missing_feature() {
        let layout = build_layout(&[]).unwrap();
        assert!(layout.is_empty());
        assert!(matches!(
            layout.require("nope"),
            Err(InputError::MissingFeature { name }) if name == "nope"
        ));
    }

    #[test]
    fn test_cache_reuses_layout() {
        let cache = LayoutCache::new();
        let columns: Vec<FeatureColumn> = vec![SparseFeat::new("a", 10).unwrap().into()];
        let first = cache.get_or_build(&columns).unwrap();
        let second = cache.get_or_build(&columns.clone()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let wider: Vec<FeatureColumn> = vec![DenseFeat::new("a", 2).unwrap().into()];
        let other = cache.get_or_build(&wider).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_width_overflow_is_rejected() {
        let columns: Vec<FeatureColumn> = vec![
            DenseFeat::new("wide", usize::MAX).unwrap().into(),
            SparseFeat::new("after", 10).unwrap().into(),
        ];
        let err = build_layout(&columns).unwrap_err();
        assert!(matches!(
            &err,
            InputError::InvalidFeatureConfig { message } if message.contains("`after`")
        ));
        assert!(get_feature_names(&columns).is_err());

        let cache = LayoutCache::new();
        assert!(cache.get_or_build(&columns).is_err());
        assert!(cache.is_empty());

        let long_history = varlen("hist", usize::MAX, Some("hist_len"));
        assert!(build_layout(&[long_history]).is_err());
    }

    #[test]
    fn test_layout_serializes_in_order() {
        let layout = build_layout(&[varlen("hist", 2, Some("hist_len"))]).unwrap();
        let json = serde_json::to_string(&layout).unwrap();
        assert_eq!(
            json,
            r#"{"entries":[{"name":"hist","start":0,"end":2},{"name":"hist_len","start":2,"end":3}]}"#
        );
    }
}
