//! JSON feature schema files.
//!
//! A schema lists feature entries in layout order plus the table options:
//!
//! ```json
//! {
//!   "features": [
//!     {"kind": "sparse", "name": "user_id", "vocabulary_size": 1000, "embedding_dim": "auto"},
//!     {"kind": "varlen_sparse", "name": "hist_item", "vocabulary_size": 500,
//!      "embedding_name": "item_id", "maxlen": 20, "combiner": "sum", "length_name": "hist_len"},
//!     {"kind": "dense", "name": "price", "dimension": 1}
//!   ],
//!   "tables": {"init_std": 0.0001, "seed": 7}
//! }
//! ```
//!
//! Entries are converted through the descriptor builders, so a file-loaded
//! schema is validated exactly like one built in code.

use std::path::Path;

use funrec_tensor::DType;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embedding::TableOptions;
use crate::error::{InputError, InputResult};
use crate::feature::{DenseFeat, EmbeddingDim, FeatureColumn, SparseFeat, VarLenSparseFeat};
use crate::pooling::Combiner;

/// Environment variable holding the default schema path.
pub const SCHEMA_ENV: &str = "FUNREC_FEATURE_SCHEMA";

/// One raw feature entry of a schema file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureSpec {
    /// `sparse`, `dense` or `varlen_sparse`.
    pub kind: String,
    /// Feature name.
    pub name: String,
    /// Vocabulary size (sparse kinds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocabulary_size: Option<usize>,
    /// Embedding dimension, a number or `"auto"` (sparse kinds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_dim: Option<EmbeddingDim>,
    /// Hashing request (sparse kinds); `true` is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_hash: Option<bool>,
    /// Declared dtype name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    /// Shared table name (sparse kinds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_name: Option<String>,
    /// Feature group (sparse kinds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Padded sequence length (varlen).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxlen: Option<usize>,
    /// Pooling mode (varlen).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combiner: Option<String>,
    /// Companion length feature (varlen).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_name: Option<String>,
    /// Column count (dense), default 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

impl FeatureSpec {
    /// Converts the entry into a validated descriptor.
    pub fn to_column(&self) -> InputResult<FeatureColumn> {
        match self.kind.as_str() {
            "sparse" => Ok(self.sparse_feat()?.into()),
            "varlen_sparse" => {
                let maxlen = self.maxlen.ok_or_else(|| self.missing("maxlen"))?;
                let mut builder = VarLenSparseFeat::builder(self.sparse_feat()?, maxlen);
                if let Some(combiner) = &self.combiner {
                    builder = builder.combiner(combiner.parse::<Combiner>()?);
                }
                if let Some(length_name) = &self.length_name {
                    builder = builder.length_name(length_name.clone());
                }
                Ok(builder.build()?.into())
            }
            "dense" => {
                let mut feat = match self.dimension {
                    Some(dimension) => DenseFeat::new(self.name.clone(), dimension)?,
                    None => DenseFeat::scalar(self.name.clone())?,
                };
                if let Some(dtype) = &self.dtype {
                    feat = feat.with_dtype(dtype.parse::<DType>()?);
                }
                Ok(feat.into())
            }
            other => Err(InputError::InvalidFeatureType {
                kind: other.to_string(),
            }),
        }
    }

    fn sparse_feat(&self) -> InputResult<SparseFeat> {
        let vocabulary_size = self
            .vocabulary_size
            .ok_or_else(|| self.missing("vocabulary_size"))?;
        let mut builder = SparseFeat::builder(self.name.clone(), vocabulary_size)
            .use_hash(self.use_hash.unwrap_or(false));
        if let Some(dim) = self.embedding_dim {
            builder = builder.embedding_dim(dim);
        }
        if let Some(dtype) = &self.dtype {
            builder = builder.dtype(dtype.parse::<DType>()?);
        }
        if let Some(embedding_name) = &self.embedding_name {
            builder = builder.embedding_name(embedding_name.clone());
        }
        if let Some(group) = &self.group_name {
            builder = builder.group_name(group.as_str());
        }
        builder.build()
    }

    fn missing(&self, field: &str) -> InputError {
        InputError::InvalidFeatureConfig {
            message: format!("{} feature `{}` requires `{}`", self.kind, self.name, field),
        }
    }
}

/// A feature schema and the options its tables are built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Feature entries in layout order.
    pub features: Vec<FeatureSpec>,
    /// Table construction options.
    #[serde(default)]
    pub tables: TableOptions,
}

impl InputConfig {
    /// Parses a schema from a JSON string.
    pub fn from_json_str(json: &str) -> InputResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.tables.validate()?;
        Ok(config)
    }

    /// Reads and parses a schema file.
    pub fn from_path(path: impl AsRef<Path>) -> InputResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            features = config.features.len(),
            "loaded feature schema"
        );
        Ok(config)
    }

    /// Reads the schema file named by `FUNREC_FEATURE_SCHEMA`.
    pub fn from_env() -> InputResult<Self> {
        match std::env::var(SCHEMA_ENV) {
            Ok(path) if !path.is_empty() => Self::from_path(path),
            _ => Err(InputError::InvalidFeatureConfig {
                message: format!("{} is not set", SCHEMA_ENV),
            }),
        }
    }

    /// Converts every entry into a validated descriptor, in order.
    pub fn columns(&self) -> InputResult<Vec<FeatureColumn>> {
        self.features.iter().map(FeatureSpec::to_column).collect()
    }
}
