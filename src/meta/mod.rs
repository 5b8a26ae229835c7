//! Index configuration and scalar-column metadata.
//!
//! Each index persists its immutable configuration in a small key/value
//! shadow table, loaded and sanity-checked on every open. User-declared
//! scalar columns are carried as a typed catalog serialized under the
//! `columns` key.

use serde::{Deserialize, Serialize};

use crate::block::BlockLayout;
use crate::error::{DiskVecError, Result};
use crate::metric::MetricKind;

mod columns;
mod store;

pub use columns::{
    is_valid_identifier, validate_columns, ColumnDef, ColumnType, RESERVED_COLUMN_NAMES,
};
pub use store::{load_metadata, save_metadata};

/// Hard floor on out-degree kept by pruning, preventing fragmentation.
pub const MIN_DEGREE: usize = 8;

/// Default degree bound `R`.
pub const DEFAULT_MAX_DEGREE: usize = 32;

/// Default construction-time beam width `L_b`.
pub const DEFAULT_BUILD_SEARCH_LIST: usize = 100;

/// Default query-time beam width `L_s`.
pub const DEFAULT_SEARCH_LIST: usize = 150;

/// Default pruning relaxation factor.
pub const DEFAULT_PRUNE_ALPHA: f32 = 1.4;

/// Per-operation LRU cache bound.
pub const LRU_CAPACITY: usize = 100;

/// Owning cache bound used by batch mode.
pub const BATCH_CACHE_CAPACITY: usize = 200;

/// How many random entry points seed a search.
pub const ENTRY_SAMPLE_COUNT: usize = 3;

/// Default entry-point RNG seed; a fixed value keeps full rebuilds
/// bit-reproducible unless the user picks their own seed.
pub const DEFAULT_ENTRY_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Largest accepted vector dimension.
pub const MAX_DIMENSION: usize = 10_000;

/// Largest accepted block size (128 MiB).
pub const MAX_BLOCK_SIZE: usize = 128 * 1024 * 1024;

/// Immutable per-index configuration.
///
/// # Parameter Guidelines
///
/// - `max_degree`: 16–64; higher improves recall at more write cost
/// - `build_search_list`: 75–200; higher improves graph quality
/// - `search_list`: at least `k`; higher improves recall per query
/// - `prune_alpha`: 1.0 (pure nearest) to 2.0 (heavily diversified)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Vector dimensionality `D`.
    pub dimension: usize,
    /// Distance metric, fixed at creation.
    pub metric: MetricKind,
    /// Degree bound `R`.
    pub max_degree: usize,
    /// Construction-time beam width `L_b`.
    pub build_search_list: usize,
    /// Query-time beam width `L_s`.
    pub search_list: usize,
    /// Pruning relaxation factor `alpha`.
    pub prune_alpha: f32,
    /// Block size in bytes; `0` derives the smallest aligned size that
    /// holds `max_degree` edges.
    pub block_size: usize,
    /// Seed for entry-point sampling.
    pub entry_seed: u64,
}

impl IndexOptions {
    /// Creates the default configuration for `dimension`-dimensional
    /// vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            metric: MetricKind::Euclidean,
            max_degree: DEFAULT_MAX_DEGREE,
            build_search_list: DEFAULT_BUILD_SEARCH_LIST,
            search_list: DEFAULT_SEARCH_LIST,
            prune_alpha: DEFAULT_PRUNE_ALPHA,
            block_size: 0,
            entry_seed: DEFAULT_ENTRY_SEED,
        }
    }

    /// Validates ranges and derives the block layout.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::Invalid`] when any parameter is out of
    /// range or the block size cannot hold `max_degree` edges.
    pub fn layout(&self) -> Result<BlockLayout> {
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(DiskVecError::Invalid(format!(
                "dimension {} out of range [1, {MAX_DIMENSION}]",
                self.dimension
            )));
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(DiskVecError::Invalid(format!(
                "block_size {} exceeds {MAX_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if self.max_degree == 0 {
            return Err(DiskVecError::Invalid("max_degree must be positive".into()));
        }
        if self.build_search_list == 0 || self.search_list == 0 {
            return Err(DiskVecError::Invalid(
                "search list sizes must be positive".into(),
            ));
        }
        if !(1.0..=2.0).contains(&self.prune_alpha) {
            return Err(DiskVecError::Invalid(format!(
                "prune_alpha {} out of range [1.0, 2.0]",
                self.prune_alpha
            )));
        }
        BlockLayout::new(self.dimension, self.block_size, self.max_degree)
    }
}
