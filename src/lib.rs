//! # DiskVec
//!
//! Disk-native approximate nearest neighbor index embedded in a relational
//! storage engine.
//!
//! DiskVec persists a DiskANN-style graph index entirely as ordinary rows
//! of a host database: one fixed-size block per vector, configuration in a
//! key/value shadow table, user scalar columns in a rowid-keyed shadow
//! table. Everything the index writes goes through the host's transaction
//! machinery, so indexes enjoy atomic statements, crash recovery, and
//! single-file deployment next to arbitrary user data.
//!
//! ## Architecture
//!
//! - **Block codec** — each node (vector + adjacency with inlined neighbor
//!   vector copies) serializes into exactly one fixed-size BLOB row.
//! - **Beam search** — greedy best-first traversal scoring all neighbors
//!   of an expanded node from a single block read.
//! - **Robust pruning** — alpha-relaxed edge diversification with a
//!   minimum-degree floor against fragmentation.
//! - **Batch mode** — owning block cache plus deferred back-edges with a
//!   scratch-file spill, repaired in one pass at batch end.
//! - **Virtual-table bridge** — translates CREATE / INSERT / DELETE /
//!   MATCH-k statements into graph operations.
//!
//! ## Example
//!
//! ```rust
//! use diskvec::host::mem::MemEngine;
//! use diskvec::host::Value;
//! use diskvec::vtab::{MatchQuery, VectorTable};
//!
//! let mut engine = MemEngine::new();
//!
//! // CREATE VIRTUAL TABLE embeddings USING diskvec(dimension=3, label TEXT)
//! let mut table = VectorTable::create(
//!     &mut engine,
//!     "main",
//!     "embeddings",
//!     &["dimension=3", "label TEXT"],
//! )
//! .expect("create index");
//!
//! // INSERT INTO embeddings(rowid, vector, label) VALUES (1, ?, 'one')
//! let vector = Value::Blob(
//!     [1.0f32, 0.0, 0.0].iter().flat_map(|c| c.to_le_bytes()).collect(),
//! );
//! table
//!     .insert(&mut engine, Some(1), &vector, &[("label", Value::Text("one".into()))])
//!     .expect("insert");
//!
//! // SELECT rowid, distance FROM embeddings WHERE vector MATCH ? AND k = 1
//! let rows = table
//!     .query(&engine, &MatchQuery::new(vector, 1))
//!     .expect("query");
//! assert_eq!(rows[0].rowid, 1);
//! assert_eq!(rows[0].distance, 0.0);
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::missing_panics_doc)]

/// Node block binary layout and codec.
pub mod block;

/// Unified error handling.
pub mod error;

/// Graph index: insert, delete, search, batch mode, pruning.
pub mod graph;

/// Host storage-engine contract and the in-memory reference engine.
pub mod host;

/// Block I/O: pinned handles, pager, LRU cache.
pub mod io;

/// Index configuration and scalar-column metadata.
pub mod meta;

/// Distance metrics.
pub mod metric;

/// Search primitives: visited set, candidate buffer, beam search.
pub mod search;

/// Virtual-table bridge.
pub mod vtab;

pub use error::{DiskVecError, ErrorCode, Result};
pub use graph::{BatchFlags, GraphIndex, IndexStats, MatchHit, SearchOptions};
pub use meta::{ColumnDef, ColumnType, IndexOptions};
pub use metric::{Metric, MetricKind};
pub use vtab::{MatchQuery, MatchRow, VectorTable};

/// The crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version string.
///
/// # Example
///
/// ```rust
/// assert!(!diskvec::version().is_empty());
/// ```
#[must_use]
pub fn version() -> &'static str {
    VERSION
}
