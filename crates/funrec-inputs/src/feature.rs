//! Feature column descriptors.
//!
//! This module provides the immutable schema objects a model is defined
//! against:
//!
//! - [`SparseFeat`]: a categorical id looked up in an embedding table.
//! - [`VarLenSparseFeat`]: a padded sequence of ids, pooled to one vector.
//! - [`DenseFeat`]: one or more raw numeric columns.
//! - [`FeatureColumn`]: the closed sum of the three, used wherever a schema
//!   mixes kinds.
//!
//! Descriptors compare and hash by feature name only, so they can be used as
//! map keys the same way feature names are.

use std::fmt;
use std::hash::{Hash, Hasher};

use funrec_tensor::DType;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::error::{InputError, InputResult};
use crate::pooling::Combiner;

/// Name of the group sparse features belong to unless told otherwise.
pub const DEFAULT_GROUP_NAME: &str = "default_group";

/// Embedding dimension used when a sparse feature does not set one.
pub const DEFAULT_EMBEDDING_DIM: usize = 4;

/// Column count of a dense feature that does not set one.
pub const DEFAULT_DENSE_DIMENSION: usize = 1;

/// A caller-defined partition of sparse features (e.g. "user" vs "item").
///
/// `FeatureGroup::new("default_group")` normalises to [`FeatureGroup::Default`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FeatureGroup {
    /// The default group, named [`DEFAULT_GROUP_NAME`].
    #[default]
    Default,
    /// A named group.
    Named(String),
}

impl FeatureGroup {
    /// Creates a group from its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name == DEFAULT_GROUP_NAME {
            FeatureGroup::Default
        } else {
            FeatureGroup::Named(name)
        }
    }

    /// Returns the group name.
    pub fn as_str(&self) -> &str {
        match self {
            FeatureGroup::Default => DEFAULT_GROUP_NAME,
            FeatureGroup::Named(name) => name,
        }
    }
}

impl fmt::Display for FeatureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for FeatureGroup {
    fn from(name: &str) -> Self {
        FeatureGroup::new(name)
    }
}

impl From<String> for FeatureGroup {
    fn from(name: String) -> Self {
        FeatureGroup::new(name)
    }
}

impl Serialize for FeatureGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FeatureGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(FeatureGroup::new(String::deserialize(deserializer)?))
    }
}

/// Requested embedding dimension of a sparse feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingDim {
    /// An explicit dimension.
    Fixed(usize),
    /// Derived from the vocabulary size, see [`auto_embedding_dim`].
    Auto,
}

impl EmbeddingDim {
    /// Resolves the dimension for a vocabulary.
    pub fn resolve(&self, vocabulary_size: usize) -> usize {
        match self {
            EmbeddingDim::Fixed(dim) => *dim,
            EmbeddingDim::Auto => auto_embedding_dim(vocabulary_size),
        }
    }
}

impl Default for EmbeddingDim {
    fn default() -> Self {
        EmbeddingDim::Fixed(DEFAULT_EMBEDDING_DIM)
    }
}

impl From<usize> for EmbeddingDim {
    fn from(dim: usize) -> Self {
        EmbeddingDim::Fixed(dim)
    }
}

impl Serialize for EmbeddingDim {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EmbeddingDim::Fixed(dim) => serializer.serialize_u64(*dim as u64),
            EmbeddingDim::Auto => serializer.serialize_str("auto"),
        }
    }
}

impl<'de> Deserialize<'de> for EmbeddingDim {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Fixed(usize),
            Named(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Fixed(dim) => Ok(EmbeddingDim::Fixed(dim)),
            Raw::Named(name) if name == "auto" => Ok(EmbeddingDim::Auto),
            Raw::Named(name) => Err(serde::de::Error::custom(format!(
                "embedding_dim must be a positive integer or \"auto\", got \"{}\"",
                name
            ))),
        }
    }
}

/// Returns `6 * floor(vocabulary_size ^ 0.25)`.
///
/// ```
/// use funrec_inputs::feature::auto_embedding_dim;
///
/// assert_eq!(auto_embedding_dim(10_000), 60);
/// assert_eq!(auto_embedding_dim(80), 12);
/// ```
pub fn auto_embedding_dim(vocabulary_size: usize) -> usize {
    // Two square roots keep perfect fourth powers exact.
    let fourth_root = (vocabulary_size as f64).sqrt().sqrt();
    6 * fourth_root.floor() as usize
}

/// A sparse categorical feature: one id per example.
#[derive(Debug, Clone)]
pub struct SparseFeat {
    name: String,
    vocabulary_size: usize,
    embedding_dim: usize,
    use_hash: bool,
    dtype: DType,
    embedding_name: String,
    group_name: FeatureGroup,
}

impl SparseFeat {
    /// Creates a sparse feature with default settings.
    ///
    /// # Examples
    ///
    /// ```
    /// use funrec_inputs::feature::SparseFeat;
    ///
    /// let feat = SparseFeat::new("user_id", 100).unwrap();
    /// assert_eq!(feat.embedding_dim(), 4);
    /// assert_eq!(feat.embedding_name(), "user_id");
    /// assert_eq!(feat.group_name().as_str(), "default_group");
    /// ```
    pub fn new(name: impl Into<String>, vocabulary_size: usize) -> InputResult<Self> {
        Self::builder(name, vocabulary_size).build()
    }

    /// Creates a builder.
    pub fn builder(name: impl Into<String>, vocabulary_size: usize) -> SparseFeatBuilder {
        SparseFeatBuilder::new(name, vocabulary_size)
    }

    /// Returns the feature name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the vocabulary size.
    #[inline]
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    /// Returns the resolved embedding dimension.
    #[inline]
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Returns whether hashing was requested. Always false for built features.
    #[inline]
    pub fn use_hash(&self) -> bool {
        self.use_hash
    }

    /// Returns the declared dtype.
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the embedding table name.
    #[inline]
    pub fn embedding_name(&self) -> &str {
        &self.embedding_name
    }

    /// Returns the feature group.
    #[inline]
    pub fn group_name(&self) -> &FeatureGroup {
        &self.group_name
    }
}

impl PartialEq for SparseFeat {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for SparseFeat {}

impl Hash for SparseFeat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Builder for [`SparseFeat`].
#[derive(Debug, Clone)]
pub struct SparseFeatBuilder {
    name: String,
    vocabulary_size: usize,
    embedding_dim: EmbeddingDim,
    use_hash: bool,
    dtype: DType,
    embedding_name: Option<String>,
    group_name: FeatureGroup,
}

impl SparseFeatBuilder {
    /// Creates a new builder.
    pub fn new(name: impl Into<String>, vocabulary_size: usize) -> Self {
        Self {
            name: name.into(),
            vocabulary_size,
            embedding_dim: EmbeddingDim::default(),
            use_hash: false,
            dtype: DType::I32,
            embedding_name: None,
            group_name: FeatureGroup::Default,
        }
    }

    /// Sets the embedding dimension (`16` or `EmbeddingDim::Auto`).
    pub fn embedding_dim(mut self, dim: impl Into<EmbeddingDim>) -> Self {
        self.embedding_dim = dim.into();
        self
    }

    /// Requests on-the-fly feature hashing. `build` rejects it.
    pub fn use_hash(mut self, use_hash: bool) -> Self {
        self.use_hash = use_hash;
        self
    }

    /// Sets the declared dtype.
    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Shares the table registered under `embedding_name`.
    pub fn embedding_name(mut self, embedding_name: impl Into<String>) -> Self {
        self.embedding_name = Some(embedding_name.into());
        self
    }

    /// Sets the feature group.
    pub fn group_name(mut self, group: impl Into<FeatureGroup>) -> Self {
        self.group_name = group.into();
        self
    }

    /// Validates and builds the feature.
    pub fn build(self) -> InputResult<SparseFeat> {
        if self.name.is_empty() {
            return Err(InputError::InvalidFeatureConfig {
                message: "feature name must not be empty".to_string(),
            });
        }
        if self.use_hash {
            warn!(
                feature = %self.name,
                "feature hashing on the fly is not supported; hash ids upstream"
            );
            return Err(InputError::UnsupportedFeature {
                name: self.name,
                reason: "feature hashing on the fly is not supported".to_string(),
            });
        }
        if self.vocabulary_size == 0 {
            return Err(InputError::InvalidFeatureConfig {
                message: format!("`{}`: vocabulary_size must be positive", self.name),
            });
        }
        let embedding_dim = self.embedding_dim.resolve(self.vocabulary_size);
        if embedding_dim == 0 {
            return Err(InputError::InvalidFeatureConfig {
                message: format!("`{}`: embedding_dim must be positive", self.name),
            });
        }
        let embedding_name = match self.embedding_name {
            Some(name) if !name.is_empty() => name,
            _ => self.name.clone(),
        };

        Ok(SparseFeat {
            name: self.name,
            vocabulary_size: self.vocabulary_size,
            embedding_dim,
            use_hash: false,
            dtype: self.dtype,
            embedding_name,
            group_name: self.group_name,
        })
    }
}

/// A padded variable-length sequence of sparse ids.
///
/// Wraps a [`SparseFeat`] and forwards its identity (name, table, group) to it.
#[derive(Debug, Clone)]
pub struct VarLenSparseFeat {
    sparse: SparseFeat,
    maxlen: usize,
    combiner: Combiner,
    length_name: Option<String>,
}

impl VarLenSparseFeat {
    /// Creates a mean-pooled sequence feature without a length column.
    pub fn new(sparse: SparseFeat, maxlen: usize) -> InputResult<Self> {
        Self::builder(sparse, maxlen).build()
    }

    /// Creates a builder.
    pub fn builder(sparse: SparseFeat, maxlen: usize) -> VarLenSparseFeatBuilder {
        VarLenSparseFeatBuilder {
            sparse,
            maxlen,
            combiner: Combiner::default(),
            length_name: None,
        }
    }

    /// Returns the wrapped sparse feature.
    pub fn sparse_feat(&self) -> &SparseFeat {
        &self.sparse
    }

    /// Returns the padded sequence length.
    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    /// Returns the pooling mode.
    pub fn combiner(&self) -> Combiner {
        self.combiner
    }

    /// Returns the companion length feature, if any.
    pub fn length_name(&self) -> Option<&str> {
        self.length_name.as_deref()
    }

    /// Returns the feature name.
    pub fn name(&self) -> &str {
        self.sparse.name()
    }

    /// Returns the vocabulary size.
    pub fn vocabulary_size(&self) -> usize {
        self.sparse.vocabulary_size()
    }

    /// Returns the embedding dimension.
    pub fn embedding_dim(&self) -> usize {
        self.sparse.embedding_dim()
    }

    /// Returns whether hashing was requested.
    pub fn use_hash(&self) -> bool {
        self.sparse.use_hash()
    }

    /// Returns the declared dtype.
    pub fn dtype(&self) -> DType {
        self.sparse.dtype()
    }

    /// Returns the embedding table name.
    pub fn embedding_name(&self) -> &str {
        self.sparse.embedding_name()
    }

    /// Returns the feature group.
    pub fn group_name(&self) -> &FeatureGroup {
        self.sparse.group_name()
    }
}

impl PartialEq for VarLenSparseFeat {
    fn eq(&self, other: &Self) -> bool {
        self.sparse == other.sparse
    }
}

impl Eq for VarLenSparseFeat {}

impl Hash for VarLenSparseFeat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sparse.hash(state);
    }
}

/// Builder for [`VarLenSparseFeat`].
#[derive(Debug, Clone)]
pub struct VarLenSparseFeatBuilder {
    sparse: SparseFeat,
    maxlen: usize,
    combiner: Combiner,
    length_name: Option<String>,
}

impl VarLenSparseFeatBuilder {
    /// Sets the pooling mode.
    pub fn combiner(mut self, combiner: Combiner) -> Self {
        self.combiner = combiner;
        self
    }

    /// Names the companion feature holding each example's true length.
    pub fn length_name(mut self, length_name: impl Into<String>) -> Self {
        self.length_name = Some(length_name.into());
        self
    }

    /// Validates and builds the feature.
    pub fn build(self) -> InputResult<VarLenSparseFeat> {
        if self.maxlen == 0 {
            return Err(InputError::InvalidFeatureConfig {
                message: format!("`{}`: maxlen must be positive", self.sparse.name()),
            });
        }
        if let Some(length_name) = &self.length_name {
            if length_name.is_empty() || length_name == self.sparse.name() {
                return Err(InputError::InvalidFeatureConfig {
                    message: format!(
                        "`{}`: length_name must be a distinct, non-empty feature name",
                        self.sparse.name()
                    ),
                });
            }
        }
        Ok(VarLenSparseFeat {
            sparse: self.sparse,
            maxlen: self.maxlen,
            combiner: self.combiner,
            length_name: self.length_name,
        })
    }
}

/// A dense numeric feature occupying `dimension` columns.
#[derive(Debug, Clone)]
pub struct DenseFeat {
    name: String,
    dimension: usize,
    dtype: DType,
}

impl DenseFeat {
    /// Creates a `float32` dense feature.
    ///
    /// ```
    /// use funrec_inputs::feature::DenseFeat;
    ///
    /// let age = DenseFeat::new("age", 1).unwrap();
    /// assert_eq!(age.dimension(), 1);
    /// assert!(DenseFeat::new("age", 0).is_err());
    /// ```
    pub fn new(name: impl Into<String>, dimension: usize) -> InputResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(InputError::InvalidFeatureConfig {
                message: "feature name must not be empty".to_string(),
            });
        }
        if dimension == 0 {
            return Err(InputError::InvalidFeatureConfig {
                message: format!("`{}`: dimension must be positive", name),
            });
        }
        Ok(Self {
            name,
            dimension,
            dtype: DType::F32,
        })
    }

    /// Creates a single-column dense feature.
    pub fn scalar(name: impl Into<String>) -> InputResult<Self> {
        Self::new(name, DEFAULT_DENSE_DIMENSION)
    }

    /// Overrides the declared dtype.
    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Returns the feature name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of columns.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns the declared dtype.
    pub fn dtype(&self) -> DType {
        self.dtype
    }
}

impl PartialEq for DenseFeat {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DenseFeat {}

impl Hash for DenseFeat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Any feature descriptor.
#[derive(Debug, Clone)]
pub enum FeatureColumn {
    /// A single categorical id.
    Sparse(SparseFeat),
    /// Raw numeric columns.
    Dense(DenseFeat),
    /// A padded id sequence.
    VarLenSparse(VarLenSparseFeat),
}

impl FeatureColumn {
    /// Returns the feature name.
    pub fn name(&self) -> &str {
        match self {
            FeatureColumn::Sparse(feat) => feat.name(),
            FeatureColumn::Dense(feat) => feat.name(),
            FeatureColumn::VarLenSparse(feat) => feat.name(),
        }
    }

    /// Returns the kind as written in schema files.
    pub fn kind(&self) -> &'static str {
        match self {
            FeatureColumn::Sparse(_) => "sparse",
            FeatureColumn::Dense(_) => "dense",
            FeatureColumn::VarLenSparse(_) => "varlen_sparse",
        }
    }

    /// Returns the number of input columns the feature itself occupies.
    ///
    /// A varlen feature's length column is not included.
    pub fn width(&self) -> usize {
        match self {
            FeatureColumn::Sparse(_) => 1,
            FeatureColumn::Dense(feat) => feat.dimension(),
            FeatureColumn::VarLenSparse(feat) => feat.maxlen(),
        }
    }

    /// Returns the embedding table name for sparse kinds.
    pub fn embedding_name(&self) -> Option<&str> {
        match self {
            FeatureColumn::Sparse(feat) => Some(feat.embedding_name()),
            FeatureColumn::VarLenSparse(feat) => Some(feat.embedding_name()),
            FeatureColumn::Dense(_) => None,
        }
    }

    /// Returns the sparse descriptor a table is sized from, for sparse kinds.
    pub fn as_embedded(&self) -> Option<&SparseFeat> {
        match self {
            FeatureColumn::Sparse(feat) => Some(feat),
            FeatureColumn::VarLenSparse(feat) => Some(feat.sparse_feat()),
            FeatureColumn::Dense(_) => None,
        }
    }
}

impl PartialEq for FeatureColumn {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for FeatureColumn {}

impl Hash for FeatureColumn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl From<SparseFeat> for FeatureColumn {
    fn from(feat: SparseFeat) -> Self {
        FeatureColumn::Sparse(feat)
    }
}

impl From<DenseFeat> for FeatureColumn {
    fn from(feat: DenseFeat) -> Self {
        FeatureColumn::Dense(feat)
    }
}

impl From<VarLenSparseFeat> for FeatureColumn {
    fn from(feat: VarLenSparseFeat) -> Self {
        FeatureColumn::VarLenSparse(feat)
    }
}

/// Returns the [`SparseFeat`] columns in order.
pub fn sparse_columns(columns: &[FeatureColumn]) -> Vec<&SparseFeat> {
    columns
        .iter()
        .filter_map(|c| match c {
            FeatureColumn::Sparse(feat) => Some(feat),
            _ => None,
        })
        .collect()
}

/// Returns the [`DenseFeat`] columns in order.
pub fn dense_columns(columns: &[FeatureColumn]) -> Vec<&DenseFeat> {
    columns
        .iter()
        .filter_map(|c| match c {
            FeatureColumn::Dense(feat) => Some(feat),
            _ => None,
        })
        .collect()
}

/// Returns the [`VarLenSparseFeat`] columns in order.
pub fn varlen_columns(columns: &[FeatureColumn]) -> Vec<&VarLenSparseFeat> {
    columns
        .iter()
        .filter_map(|c| match c {
            FeatureColumn::VarLenSparse(feat) => Some(feat),
            _ => None,
        })
        .collect()
}
