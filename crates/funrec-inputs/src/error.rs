//! Error types for the funrec-inputs crate.
//!
//! Every error here is a construction-time or call-time contract violation.
//! None of them is retried; they abort the schema setup or the current batch.

use funrec_tensor::TensorError;
use thiserror::Error;

/// The main error type for feature schema and input assembly.
#[derive(Debug, Error)]
pub enum InputError {
    /// A feature entry names a kind other than sparse, dense or varlen_sparse.
    #[error("Invalid feature column type: {kind}")]
    InvalidFeatureType {
        /// The unrecognised kind.
        kind: String,
    },

    /// A feature requests functionality that is not implemented.
    #[error("Unsupported feature `{name}`: {reason}")]
    UnsupportedFeature {
        /// The feature name.
        name: String,
        /// What is unsupported.
        reason: String,
    },

    /// A pooling mode string other than `sum` or `mean`.
    #[error("Invalid combiner mode: {mode}")]
    InvalidCombinerMode {
        /// The unrecognised mode.
        mode: String,
    },

    /// A variable-length lookup needs an explicit length column that is not configured.
    #[error("Missing length column: {message}")]
    MissingLengthColumn {
        /// Which column was expected.
        message: String,
    },

    /// The combiner received neither sparse nor dense inputs.
    #[error("No input features to combine")]
    NoInputFeatures,

    /// A descriptor or option violates a construction rule.
    #[error("Invalid feature configuration: {message}")]
    InvalidFeatureConfig {
        /// A description of the violated rule.
        message: String,
    },

    /// A feature has no entry in the layout.
    #[error("Feature not found in layout: {name}")]
    MissingFeature {
        /// The feature name.
        name: String,
    },

    /// No embedding table is registered under an embedding name.
    #[error("Embedding table not found: {embedding_name}")]
    MissingEmbeddingTable {
        /// The embedding name.
        embedding_name: String,
    },

    /// An id falls outside a table's vocabulary.
    #[error("Index {index} out of range for table `{table}` with vocabulary size {vocabulary_size}")]
    IndexOutOfRange {
        /// The table's embedding name.
        table: String,
        /// The offending id.
        index: i64,
        /// The table's vocabulary size.
        vocabulary_size: usize,
    },

    /// An id is NaN or infinite.
    #[error("Non-finite index {value} for table `{table}`")]
    NonFiniteIndex {
        /// The table's embedding name.
        table: String,
        /// The offending value.
        value: f32,
    },

    /// An underlying tensor operation failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// Reading a schema file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A schema document could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A specialized Result type for input operations.
pub type InputResult<T> = std::result::Result<T, InputError>;
