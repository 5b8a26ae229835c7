//! Host storage-engine contract.
//!
//! DiskVec never talks to disk directly. Everything it persists lives in
//! *shadow tables* of a host relational engine, reached through the
//! [`StorageEngine`] trait: BLOB regions for node blocks, plain rows for
//! metadata and user scalar columns, savepoints for statement-scoped
//! rollback, and safe identifier quoting for DDL composition.
//!
//! The trait mirrors the primitives every embeddable engine in this space
//! already exposes (incremental blob I/O, prepared row statements,
//! savepoints), so a production binding is a thin adapter. The crate ships
//! [`mem::MemEngine`], a deterministic in-memory engine with the same
//! semantics, used by the test suite and by embedders who want an
//! ephemeral index.

use crate::error::Result;

pub mod mem;

/// A dynamically typed cell value, matching the host engine's type system.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// A zero-filled blob of the given length, allocated without
    /// materializing the bytes (the host's `zeroblob` primitive).
    ZeroBlob(usize),
}

impl Value {
    /// Returns the text payload, if this is a `Text` value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the blob payload, if this is a `Blob` value.
    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an `Integer` value.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// True for SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// A `(schema, table)` pair naming one shadow table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableRef {
    /// Schema ("main" unless the index was created in an attached schema).
    pub schema: String,
    /// Table name.
    pub name: String,
}

impl TableRef {
    /// Builds a reference from schema and table name.
    #[must_use]
    pub fn new(schema: &str, name: &str) -> Self {
        Self {
            schema: schema.to_owned(),
            name: name.to_owned(),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// An open byte-addressable window over one BLOB cell.
///
/// Equivalent to the host's incremental-blob API: the handle stays pinned
/// to `(table, column, rowid)` until dropped or moved with
/// [`BlobHandle::reopen`], which retargets the same open handle to another
/// row of the same table without paying the open cost again.
pub trait BlobHandle {
    /// Total length of the blob in bytes.
    fn len(&self) -> usize;

    /// True when the blob has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// `Io` if the read crosses the end of the blob or the row vanished.
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// Writes `data` starting at `offset`.
    ///
    /// # Errors
    ///
    /// `Io` if the handle is read-only or the write crosses the blob end.
    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()>;

    /// Moves this handle to another rowid of the same table and column.
    ///
    /// # Errors
    ///
    /// `NotFound` if the target row does not exist.
    fn reopen(&mut self, rowid: u64) -> Result<()>;
}

/// An append-only scratch file owned by the host engine.
///
/// Used by batch mode to spill the deferred back-edge list when it outgrows
/// its memory budget. Contents are discarded wholesale; there is no
/// durability expectation.
pub trait ScratchFile {
    /// Appends bytes at the end of the file.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Current file length in bytes.
    fn len(&self) -> u64;

    /// Reads up to `buf.len()` bytes at `offset`; returns the count read.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Discards all contents.
    fn truncate(&mut self) -> Result<()>;
}

/// The complete set of host primitives DiskVec depends on.
///
/// All data-path methods address rows by `u64` rowid (the host's signed
/// rowids are bit-cast at the bridge). Ordering-sensitive methods
/// ([`StorageEngine::nth_rowid`]) enumerate in ascending rowid order so that
/// entry-point sampling is deterministic for a fixed RNG seed.
pub trait StorageEngine {
    /// Incremental-blob handle type.
    type Blob: BlobHandle + 'static;
    /// Scratch-file handle type.
    type Scratch: ScratchFile + 'static;

    /// Quotes an identifier for safe inclusion in DDL.
    ///
    /// Every identifier the bridge ever splices into SQL flows through
    /// this; plain string concatenation of user input is structurally
    /// impossible.
    fn quote_ident(&self, ident: &str) -> String;

    /// Executes a DDL statement composed by the bridge.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure, `Exists`/`NotFound` for duplicate or missing
    /// tables.
    fn execute_ddl(&mut self, sql: &str) -> Result<()>;

    /// True when the table exists.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure.
    fn table_exists(&self, table: &TableRef) -> Result<bool>;

    /// Inserts one row with an explicit rowid.
    ///
    /// # Errors
    ///
    /// `Exists` if the rowid is taken, `Io` on engine failure.
    fn insert_row(&mut self, table: &TableRef, rowid: u64, values: &[(&str, Value)])
        -> Result<()>;

    /// Deletes one row; returns whether it existed.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure.
    fn delete_row(&mut self, table: &TableRef, rowid: u64) -> Result<bool>;

    /// Reads the named columns of one row, `None` if the row is absent.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure or unknown column.
    fn read_row(
        &self,
        table: &TableRef,
        rowid: u64,
        columns: &[&str],
    ) -> Result<Option<Vec<Value>>>;

    /// True when a row with this rowid exists.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure.
    fn row_exists(&self, table: &TableRef, rowid: u64) -> Result<bool>;

    /// Number of rows in the table.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure.
    fn row_count(&self, table: &TableRef) -> Result<u64>;

    /// The `n`-th rowid in ascending order, `None` past the end.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure.
    fn nth_rowid(&self, table: &TableRef, n: u64) -> Result<Option<u64>>;

    /// Upserts one key/value pair in a two-column metadata table.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure.
    fn put_kv(&mut self, table: &TableRef, key: &str, value: &str) -> Result<()>;

    /// Reads one metadata value.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure.
    fn get_kv(&self, table: &TableRef, key: &str) -> Result<Option<String>>;

    /// Opens an incremental-blob handle on `(table, column, rowid)`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the row is absent, `Io` on engine failure.
    fn open_blob(
        &self,
        table: &TableRef,
        column: &str,
        rowid: u64,
        writable: bool,
    ) -> Result<Self::Blob>;

    /// Creates an empty scratch file.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure.
    fn create_scratch(&self) -> Result<Self::Scratch>;

    /// Opens a named savepoint.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure.
    fn savepoint(&mut self, name: &str) -> Result<()>;

    /// Releases (commits) a savepoint.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure or unknown savepoint.
    fn release_savepoint(&mut self, name: &str) -> Result<()>;

    /// Rolls back to a savepoint, leaving it open.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure or unknown savepoint.
    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()>;
}
