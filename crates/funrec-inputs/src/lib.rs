//! Feature columns and input assembly for funrec models.
//!
//! This crate turns a schema of feature descriptors into the tensors a
//! recommendation model consumes. A batch arrives as one flattened
//! `[batch, width]` buffer `X`; everything else is derived from the ordered
//! descriptor list:
//!
//! - **Descriptors** ([`feature`]): [`SparseFeat`], [`VarLenSparseFeat`] and
//!   [`DenseFeat`], combined as [`FeatureColumn`].
//! - **Layout** ([`layout`]): which columns of `X` belong to which feature.
//! - **Tables** ([`embedding`]): one embedding table per embedding name,
//!   shared between features that name the same table.
//! - **Lookup** ([`lookup`]): slicing `X` and resolving ids to embeddings.
//! - **Pooling** ([`pooling`]): reducing padded sequences to one vector.
//! - **Combine** ([`combine`]): concatenating everything into `[batch, F]`.
//! - **Schema files** ([`schema`]): the same descriptors loaded from JSON.
//!
//! # Example
//!
//! ```
//! use funrec_inputs::prelude::*;
//! use funrec_tensor::Tensor;
//!
//! let columns: Vec<FeatureColumn> = vec![
//!     SparseFeat::builder("user_id", 10).embedding_dim(4).build().unwrap().into(),
//!     VarLenSparseFeat::builder(
//!         SparseFeat::builder("hist_item", 20).embedding_dim(4).build().unwrap(),
//!         3,
//!     )
//!     .combiner(Combiner::Mean)
//!     .build()
//!     .unwrap()
//!     .into(),
//!     DenseFeat::scalar("price").unwrap().into(),
//! ];
//!
//! let layout = shared_layout(&columns).unwrap();
//! let tables = build_tables(&columns, &TableOptions::default()).unwrap();
//!
//! // Two examples: user, three history ids (0 is padding), price.
//! let x = Tensor::from_slice(
//!     &[1.0, 5.0, 6.0, 0.0, 9.5,
//!       2.0, 7.0, 0.0, 0.0, 3.5],
//!     &[2, layout.total_width()],
//! );
//!
//! let (sparse, dense) = input_from_feature_columns(&x, &layout, &columns, &tables).unwrap();
//! let dnn_input = combined_dnn_input(&sparse, &dense).unwrap();
//! assert_eq!(dnn_input.shape(), &[2, 4 + 4 + 1]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod combine;
pub mod embedding;
pub mod error;
pub mod feature;
pub mod layout;
pub mod lookup;
pub mod pooling;
pub mod schema;

pub use combine::combined_dnn_input;
pub use embedding::{build_tables, EmbeddingTable, EmbeddingTableSet, TableOptions};
pub use error::{InputError, InputResult};
pub use feature::{
    DenseFeat, EmbeddingDim, FeatureColumn, FeatureGroup, SparseFeat, VarLenSparseFeat,
    DEFAULT_GROUP_NAME,
};
pub use layout::{build_layout, get_feature_names, shared_layout, FeatureLayout, LayoutCache};
pub use lookup::{
    dense_input, embedding_lookup, input_from_feature_columns, maxlen_lookup,
    varlen_embedding_lookup, varlen_pooling_list, GroupedEmbeddings, LookupOptions,
};
pub use pooling::{pool, Combiner, SequencePooling};
pub use schema::{FeatureSpec, InputConfig};

/// Commonly used types, re-exported for glob import.
pub mod prelude {
    pub use crate::combine::combined_dnn_input;
    pub use crate::embedding::{build_tables, EmbeddingTable, EmbeddingTableSet, TableOptions};
    pub use crate::error::{InputError, InputResult};
    pub use crate::feature::{
        dense_columns, sparse_columns, varlen_columns, DenseFeat, EmbeddingDim, FeatureColumn,
        FeatureGroup, SparseFeat, VarLenSparseFeat,
    };
    pub use crate::layout::{build_layout, get_feature_names, shared_layout, FeatureLayout};
    pub use crate::lookup::{
        dense_input, embedding_lookup, input_from_feature_columns, maxlen_lookup,
        varlen_embedding_lookup, varlen_pooling_list, LookupOptions,
    };
    pub use crate::pooling::{Combiner, SequencePooling};
    pub use crate::schema::InputConfig;
}
