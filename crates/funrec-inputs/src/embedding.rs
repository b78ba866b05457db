//! Embedding table factory.
//!
//! [`build_tables`] creates one [`EmbeddingTable`] per distinct embedding
//! name among the sparse and varlen descriptors of a schema. Tables are
//! handed out as `Arc` handles from an [`EmbeddingTableSet`], so features
//! that share an embedding name share one table and see each other's updates.
//!
//! Every weight is drawn independently from `N(0, init_std^2)`.

use std::collections::HashMap;
use std::sync::Arc;

use funrec_tensor::{Device, Tensor};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{InputError, InputResult};
use crate::feature::{FeatureColumn, SparseFeat};

/// Default standard deviation of the weight initializer.
pub const DEFAULT_INIT_STD: f32 = 1e-4;

/// Options controlling table construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Standard deviation of the normal initializer.
    pub init_std: f32,
    /// Build single-weight tables (dim 1) for a linear part.
    pub linear: bool,
    /// Ask the optimizer for sparse gradients on these tables.
    pub sparse: bool,
    /// Device the tables are placed on.
    pub device: Device,
    /// Seed for reproducible initialization.
    pub seed: Option<u64>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            init_std: DEFAULT_INIT_STD,
            linear: false,
            sparse: false,
            device: Device::Cpu,
            seed: None,
        }
    }
}

impl TableOptions {
    /// Creates a builder starting from the defaults.
    pub fn builder() -> TableOptionsBuilder {
        TableOptionsBuilder::default()
    }

    /// Checks that the options can build tables.
    pub fn validate(&self) -> InputResult<()> {
        if !self.init_std.is_finite() || self.init_std <= 0.0 {
            return Err(InputError::InvalidFeatureConfig {
                message: format!("init_std must be finite and positive, got {}", self.init_std),
            });
        }
        Ok(())
    }
}

/// Builder for [`TableOptions`].
#[derive(Debug, Clone, Default)]
pub struct TableOptionsBuilder {
    options: TableOptions,
}

impl TableOptionsBuilder {
    /// Sets the initializer standard deviation.
    pub fn init_std(mut self, init_std: f32) -> Self {
        self.options.init_std = init_std;
        self
    }

    /// Builds dim-1 tables.
    pub fn linear(mut self, linear: bool) -> Self {
        self.options.linear = linear;
        self
    }

    /// Marks tables for sparse gradients.
    pub fn sparse(mut self, sparse: bool) -> Self {
        self.options.sparse = sparse;
        self
    }

    /// Sets the target device.
    pub fn device(mut self, device: Device) -> Self {
        self.options.device = device;
        self
    }

    /// Seeds the initializer.
    pub fn seed(mut self, seed: u64) -> Self {
        self.options.seed = Some(seed);
        self
    }

    /// Validates and returns the options.
    pub fn build(self) -> InputResult<TableOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// A `(vocabulary_size, dim)` embedding table.
#[derive(Debug)]
pub struct EmbeddingTable {
    name: String,
    vocabulary_size: usize,
    dim: usize,
    device: Device,
    sparse: bool,
    weight: RwLock<Tensor>,
}

impl EmbeddingTable {
    /// Wraps an existing `[vocabulary_size, dim]` weight tensor.
    pub fn from_weight(
        name: impl Into<String>,
        weight: Tensor,
        device: Device,
        sparse: bool,
    ) -> InputResult<Self> {
        let name = name.into();
        if weight.ndim() != 2 {
            return Err(InputError::InvalidFeatureConfig {
                message: format!(
                    "table `{}` weight must be [vocabulary_size, dim], got {:?}",
                    name,
                    weight.shape()
                ),
            });
        }
        Ok(Self {
            vocabulary_size: weight.shape()[0],
            dim: weight.shape()[1],
            name,
            device,
            sparse,
            weight: RwLock::new(weight),
        })
    }

    /// Returns the embedding name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of rows.
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    /// Returns the row width.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the device the table is placed on.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Returns whether sparse gradients were requested.
    pub fn sparse(&self) -> bool {
        self.sparse
    }

    /// Locks the weights for reading.
    pub fn weight(&self) -> RwLockReadGuard<'_, Tensor> {
        self.weight.read()
    }

    /// Locks the weights for writing.
    ///
    /// Readers on other handles block until the guard is dropped.
    pub fn weight_mut(&self) -> RwLockWriteGuard<'_, Tensor> {
        self.weight.write()
    }

    /// Returns a copy of row `index` as a `[dim]` tensor.
    pub fn row(&self, index: usize) -> InputResult<Tensor> {
        let row = self.checked_row(index as i64)?;
        Ok(self.weight.read().narrow(0, row, row + 1)?.reshape(&[self.dim])?)
    }

    /// Looks up every id in `indices` and appends a trailing `dim` axis.
    ///
    /// Ids are truncated toward zero; an id outside `[0, vocabulary_size)`
    /// fails with [`InputError::IndexOutOfRange`] and a NaN or infinite id
    /// with [`InputError::NonFiniteIndex`].
    pub fn lookup(&self, indices: &Tensor) -> InputResult<Tensor> {
        if let Some(&value) = indices.as_ndarray().iter().find(|v| !v.is_finite()) {
            return Err(InputError::NonFiniteIndex {
                table: self.name.clone(),
                value,
            });
        }
        let rows = indices
            .to_indices()
            .into_iter()
            .map(|id| self.checked_row(id))
            .collect::<InputResult<Vec<usize>>>()?;

        let mut shape = indices.shape().to_vec();
        shape.push(self.dim);
        let gathered = self.weight.read().select_rows(&rows)?;
        Ok(gathered.reshape(&shape)?)
    }

    fn checked_row(&self, id: i64) -> InputResult<usize> {
        if id < 0 || id as usize >= self.vocabulary_size {
            return Err(InputError::IndexOutOfRange {
                table: self.name.clone(),
                index: id,
                vocabulary_size: self.vocabulary_size,
            });
        }
        Ok(id as usize)
    }
}

/// Registry of embedding tables keyed by embedding name.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingTableSet {
    tables: Vec<Arc<EmbeddingTable>>,
    index: HashMap<String, usize>,
}

impl EmbeddingTableSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table. A table already registered under the same name is kept.
    pub fn insert(&mut self, table: EmbeddingTable) -> Arc<EmbeddingTable> {
        if let Some(existing) = self.get(table.name()) {
            return Arc::clone(existing);
        }
        let table = Arc::new(table);
        self.index.insert(table.name().to_string(), self.tables.len());
        self.tables.push(Arc::clone(&table));
        table
    }

    /// Returns the table registered under `embedding_name`.
    pub fn get(&self, embedding_name: &str) -> Option<&Arc<EmbeddingTable>> {
        self.index.get(embedding_name).map(|&i| &self.tables[i])
    }

    /// Returns the table for `embedding_name` or [`InputError::MissingEmbeddingTable`].
    pub fn require(&self, embedding_name: &str) -> InputResult<&Arc<EmbeddingTable>> {
        self.get(embedding_name)
            .ok_or_else(|| InputError::MissingEmbeddingTable {
                embedding_name: embedding_name.to_string(),
            })
    }

    /// Returns the table a sparse feature looks up.
    pub fn for_feature(&self, feat: &SparseFeat) -> InputResult<&Arc<EmbeddingTable>> {
        self.require(feat.embedding_name())
    }

    /// Returns true if a table is registered under `embedding_name`.
    pub fn contains(&self, embedding_name: &str) -> bool {
        self.index.contains_key(embedding_name)
    }

    /// Returns the number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if there are no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterates over tables in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EmbeddingTable>> {
        self.tables.iter()
    }
}

/// Builds one table per distinct embedding name in `columns`.
///
/// Dense columns are ignored. The first descriptor naming a table decides
/// its size; later descriptors with the same embedding name share it.
///
/// # Example
///
/// ```
/// use funrec_inputs::embedding::{build_tables, TableOptions};
/// use funrec_inputs::feature::{FeatureColumn, SparseFeat};
///
/// let columns: Vec<FeatureColumn> = vec![
///     SparseFeat::builder("item_id", 100).embedding_dim(8).build().unwrap().into(),
///     SparseFeat::builder("clicked_item", 100)
///         .embedding_dim(8)
///         .embedding_name("item_id")
///         .build()
///         .unwrap()
///         .into(),
/// ];
///
/// let tables = build_tables(&columns, &TableOptions::default()).unwrap();
/// assert_eq!(tables.len(), 1);
/// assert_eq!(tables.get("item_id").unwrap().weight().shape(), &[100, 8]);
/// ```
pub fn build_tables(
    columns: &[FeatureColumn],
    options: &TableOptions,
) -> InputResult<EmbeddingTableSet> {
    options.validate()?;
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut tables = EmbeddingTableSet::new();
    for feat in columns.iter().filter_map(FeatureColumn::as_embedded) {
        let embedding_name = feat.embedding_name();
        if tables.contains(embedding_name) {
            debug!(
                feature = feat.name(),
                table = embedding_name,
                "sharing existing embedding table"
            );
            continue;
        }

        let dim = if options.linear { 1 } else { feat.embedding_dim() };
        if feat.vocabulary_size().checked_mul(dim).is_none() {
            return Err(InputError::InvalidFeatureConfig {
                message: format!(
                    "table `{}` of {} x {} overflows usize",
                    embedding_name,
                    feat.vocabulary_size(),
                    dim
                ),
            });
        }
        let weight = Tensor::randn(
            &[feat.vocabulary_size(), dim],
            0.0,
            options.init_std,
            &mut rng,
        )?;
        debug!(
            table = embedding_name,
            vocabulary_size = feat.vocabulary_size(),
            dim,
            device = %options.device,
            "created embedding table"
        );
        tables.insert(EmbeddingTable::from_weight(
            embedding_name,
            weight,
            options.device,
            options.sparse,
        )?);
    }

    info!(
        tables = tables.len(),
        linear = options.linear,
        init_std = options.init_std,
        "built embedding tables"
    );
    Ok(tables)
}
