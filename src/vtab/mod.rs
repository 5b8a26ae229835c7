//! Virtual-table bridge.
//!
//! Translates the relational surface — CREATE / INSERT / DELETE /
//! `SELECT ... WHERE vector MATCH ? AND k = ?` / DROP — into graph
//! operations. A [`VectorTable`] owns the per-index state (configuration,
//! column catalog, graph handle) and drives the host engine passed into
//! each call, exactly as a host's virtual-table dispatch would.
//!
//! Shadow tables for an index `t`:
//!
//! - `t_blocks` — one node block per row (BLOB);
//! - `t_meta` — configuration key/value pairs;
//! - `t_rows` — user scalar columns, present only when declared.
//!
//! Every identifier spliced into DDL goes through the host's quoting
//! primitive; the bridge never concatenates raw identifier strings.

use crate::error::{DiskVecError, Result};
use crate::graph::{BatchFlags, GraphIndex, IndexStats, MatchHit, SearchOptions};
use crate::host::{StorageEngine, TableRef, Value};
use crate::meta::{
    is_valid_identifier, load_metadata, save_metadata, ColumnDef, IndexOptions,
};

mod args;
mod filter;

pub use args::parse_module_args;
pub use filter::{ColumnFilter, FilterOp};

/// One MATCH query, as constrained by the host's query planner.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    /// The query vector: a `4*D`-byte little-endian BLOB or a JSON-style
    /// text literal `[1.0, 2.0, ...]`.
    pub vector: Value,
    /// Number of neighbors requested (the hidden `k` column).
    pub k: usize,
    /// Per-query `search_list_size` override; the configured value is
    /// untouched and applies again to the next query.
    pub search_list_size: Option<usize>,
    /// Optional LIMIT further capping the output.
    pub limit: Option<usize>,
    /// Scalar-column predicates evaluated after retrieval.
    pub filters: Vec<ColumnFilter>,
}

impl MatchQuery {
    /// A plain top-`k` query over a vector value.
    #[must_use]
    pub fn new(vector: Value, k: usize) -> Self {
        Self {
            vector,
            k,
            search_list_size: None,
            limit: None,
            filters: Vec::new(),
        }
    }
}

/// One result row of a MATCH query.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    /// Rowid of the matched vector.
    pub rowid: i64,
    /// Distance under the index metric.
    pub distance: f32,
    /// User scalar column values, in declaration order.
    pub columns: Vec<Value>,
}

/// A connected vector index, driven through relational operations.
pub struct VectorTable {
    schema: String,
    name: String,
    columns: Vec<ColumnDef>,
    blocks_table: TableRef,
    meta_table: TableRef,
    rows_table: Option<TableRef>,
    graph: GraphIndex,
}

impl std::fmt::Debug for VectorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorTable")
            .field("schema", &self.schema)
            .field("name", &self.name)
            .field("blocks_table", &self.blocks_table)
            .field("meta_table", &self.meta_table)
            .field("rows_table", &self.rows_table)
            .finish()
    }
}

impl VectorTable {
    fn shadow_tables(
        schema: &str,
        name: &str,
        has_columns: bool,
    ) -> (TableRef, TableRef, Option<TableRef>) {
        (
            TableRef::new(schema, &format!("{name}_blocks")),
            TableRef::new(schema, &format!("{name}_meta")),
            has_columns.then(|| TableRef::new(schema, &format!("{name}_rows"))),
        )
    }

    /// Creates a new index and its shadow tables.
    ///
    /// `module_args` is the raw argument list of the CREATE VIRTUAL TABLE
    /// statement.
    ///
    /// # Errors
    ///
    /// `Invalid` for malformed arguments or identifiers, `Exists` if an
    /// index of this name already has shadow tables, host errors otherwise.
    pub fn create<E: StorageEngine>(
        engine: &mut E,
        schema: &str,
        name: &str,
        module_args: &[&str],
    ) -> Result<Self> {
        Self::create_inner(engine, schema, name, module_args)
            .map_err(|e| e.in_context(name, "create"))
    }

    fn create_inner<E: StorageEngine>(
        engine: &mut E,
        schema: &str,
        name: &str,
        module_args: &[&str],
    ) -> Result<Self> {
        if !is_valid_identifier(name) {
            return Err(DiskVecError::Invalid(format!(
                "index name {name:?} is not a valid identifier"
            )));
        }
        let (options, columns) = parse_module_args(module_args)?;
        let (blocks_table, meta_table, rows_table) =
            Self::shadow_tables(schema, name, !columns.is_empty());

        if engine.table_exists(&blocks_table)? {
            return Err(DiskVecError::Exists(format!("index {name} in {schema}")));
        }

        engine.execute_ddl(&format!(
            "CREATE TABLE {}.{} ({} INTEGER PRIMARY KEY, {} BLOB)",
            engine.quote_ident(schema),
            engine.quote_ident(&blocks_table.name),
            engine.quote_ident("rowid"),
            engine.quote_ident("data"),
        ))?;
        engine.execute_ddl(&format!(
            "CREATE TABLE {}.{} ({} TEXT PRIMARY KEY, {} TEXT)",
            engine.quote_ident(schema),
            engine.quote_ident(&meta_table.name),
            engine.quote_ident("k"),
            engine.quote_ident("v"),
        ))?;
        if let Some(rows) = &rows_table {
            let mut defs = vec![format!("{} INTEGER PRIMARY KEY", engine.quote_ident("rowid"))];
            for col in &columns {
                defs.push(format!(
                    "{} {}",
                    engine.quote_ident(&col.name),
                    col.column_type.as_str()
                ));
            }
            engine.execute_ddl(&format!(
                "CREATE TABLE {}.{} ({})",
                engine.quote_ident(schema),
                engine.quote_ident(&rows.name),
                defs.join(", "),
            ))?;
        }

        save_metadata(engine, &meta_table, &options, &columns)?;
        let graph = GraphIndex::open(blocks_table.clone(), options)?;
        Ok(Self {
            schema: schema.to_owned(),
            name: name.to_owned(),
            columns,
            blocks_table,
            meta_table,
            rows_table,
            graph,
        })
    }

    /// Connects to an existing index, loading and sanity-checking its
    /// persisted configuration.
    ///
    /// # Errors
    ///
    /// `NotFound` when the shadow tables are missing, `Corrupt` when the
    /// metadata fails validation.
    pub fn connect<E: StorageEngine>(engine: &E, schema: &str, name: &str) -> Result<Self> {
        Self::connect_inner(engine, schema, name).map_err(|e| e.in_context(name, "connect"))
    }

    fn connect_inner<E: StorageEngine>(engine: &E, schema: &str, name: &str) -> Result<Self> {
        let meta_table = TableRef::new(schema, &format!("{name}_meta"));
        let blocks_table = TableRef::new(schema, &format!("{name}_blocks"));
        if !engine.table_exists(&blocks_table)? || !engine.table_exists(&meta_table)? {
            return Err(DiskVecError::NotFound(format!("index {name} in {schema}")));
        }
        let (options, columns) = load_metadata(engine, &meta_table)?;
        let (blocks_table, meta_table, rows_table) =
            Self::shadow_tables(schema, name, !columns.is_empty());
        if let Some(rows) = &rows_table {
            if !engine.table_exists(rows)? {
                return Err(DiskVecError::Corrupt(format!(
                    "scalar shadow table {rows} is missing"
                )));
            }
        }
        let graph = GraphIndex::open(blocks_table.clone(), options)?;
        Ok(Self {
            schema: schema.to_owned(),
            name: name.to_owned(),
            columns,
            blocks_table,
            meta_table,
            rows_table,
            graph,
        })
    }

    /// The index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared scalar columns.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// The index configuration.
    #[must_use]
    pub fn options(&self) -> &IndexOptions {
        self.graph.options()
    }

    /// Counter snapshot of the underlying graph handle.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        self.graph.stats()
    }

    /// Number of indexed vectors.
    ///
    /// # Errors
    ///
    /// Propagates host failures.
    pub fn count<E: StorageEngine>(&self, engine: &E) -> Result<u64> {
        self.graph.count(engine)
    }

    /// The table declaration the bridge registers with the host: the
    /// `vector`/`distance` columns, the hidden constraint columns, then the
    /// user scalar columns.
    #[must_use]
    pub fn schema_sql(&self) -> String {
        let mut sql = String::from(
            "CREATE TABLE x(vector BLOB, distance REAL, \
             k INTEGER HIDDEN, search_list_size INTEGER HIDDEN",
        );
        for col in &self.columns {
            sql.push_str(", ");
            sql.push_str(&col.name);
            sql.push(' ');
            sql.push_str(col.column_type.as_str());
        }
        sql.push(')');
        sql
    }

    fn decode_vector(&self, value: &Value) -> Result<Vec<f32>> {
        let dim = self.options().dimension;
        match value {
            Value::Blob(bytes) => {
                if bytes.len() != 4 * dim {
                    return Err(DiskVecError::Dimension {
                        expected: dim,
                        actual: bytes.len() / 4,
                    });
                }
                Ok(bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes(c.try_into().expect("4-byte chunk")))
                    .collect())
            }
            Value::Text(text) => {
                let parsed: Vec<f32> = serde_json::from_str(text).map_err(|e| {
                    DiskVecError::Invalid(format!("vector text literal: {e}"))
                })?;
                if parsed.len() != dim {
                    return Err(DiskVecError::Dimension {
                        expected: dim,
                        actual: parsed.len(),
                    });
                }
                Ok(parsed)
            }
            other => Err(DiskVecError::Invalid(format!(
                "vector must be a BLOB or text literal, got {other:?}"
            ))),
        }
    }

    /// Inserts one row. `rowid` is mandatory; `scalars` are `(column,
    /// value)` pairs for declared scalar columns (missing columns store
    /// NULL).
    ///
    /// # Errors
    ///
    /// `Invalid`/`Dimension` for malformed input, `Exists` for duplicate
    /// rowids, host errors otherwise.
    pub fn insert<E: StorageEngine>(
        &mut self,
        engine: &mut E,
        rowid: Option<i64>,
        vector: &Value,
        scalars: &[(&str, Value)],
    ) -> Result<()> {
        self.insert_inner(engine, rowid, vector, scalars)
            .map_err(|e| e.in_context(&self.name, "insert"))
    }

    fn insert_inner<E: StorageEngine>(
        &mut self,
        engine: &mut E,
        rowid: Option<i64>,
        vector: &Value,
        scalars: &[(&str, Value)],
    ) -> Result<()> {
        let Some(rowid) = rowid else {
            return Err(DiskVecError::Invalid(
                "rowid is required on insert".into(),
            ));
        };
        let query = self.decode_vector(vector)?;

        for (name, value) in scalars {
            let Some(col) = self.columns.iter().find(|c| c.name == *name) else {
                return Err(DiskVecError::Invalid(format!("unknown column {name:?}")));
            };
            if !col.column_type.admits(value) {
                return Err(DiskVecError::Invalid(format!(
                    "value {:?} does not fit column {} {}",
                    value,
                    col.name,
                    col.column_type.as_str()
                )));
            }
        }

        self.graph.insert(engine, rowid as u64, &query)?;

        if let Some(rows) = &self.rows_table {
            let mut values: Vec<(&str, Value)> = Vec::with_capacity(self.columns.len());
            for col in &self.columns {
                let value = scalars
                    .iter()
                    .find(|(n, _)| *n == col.name)
                    .map_or(Value::Null, |(_, v)| v.clone());
                values.push((col.name.as_str(), value));
            }
            if let Err(e) = engine.insert_row(rows, rowid as u64, &values) {
                // Keep the index and the scalar shadow table in lockstep.
                self.graph.delete(engine, rowid as u64)?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Deletes one row by rowid.
    ///
    /// # Errors
    ///
    /// `NotFound` when the rowid is absent, host errors otherwise.
    pub fn delete<E: StorageEngine>(&mut self, engine: &mut E, rowid: i64) -> Result<()> {
        self.delete_inner(engine, rowid)
            .map_err(|e| e.in_context(&self.name, "delete"))
    }

    fn delete_inner<E: StorageEngine>(&mut self, engine: &mut E, rowid: i64) -> Result<()> {
        self.graph.delete(engine, rowid as u64)?;
        if let Some(rows) = &self.rows_table {
            engine.delete_row(rows, rowid as u64)?;
        }
        Ok(())
    }

    /// Runs a MATCH query: beam search, scalar-row retrieval, post-search
    /// filtering, LIMIT.
    ///
    /// A failed query returns the error and no rows.
    ///
    /// # Errors
    ///
    /// `Invalid`/`Dimension` for malformed queries, host errors otherwise.
    pub fn query<E: StorageEngine>(
        &mut self,
        engine: &E,
        query: &MatchQuery,
    ) -> Result<Vec<MatchRow>> {
        self.query_inner(engine, query)
            .map_err(|e| e.in_context(&self.name, "match"))
    }

    fn query_inner<E: StorageEngine>(
        &mut self,
        engine: &E,
        query: &MatchQuery,
    ) -> Result<Vec<MatchRow>> {
        for filter in &query.filters {
            if !self.columns.iter().any(|c| c.name == filter.column) {
                return Err(DiskVecError::Invalid(format!(
                    "unknown filter column {:?}",
                    filter.column
                )));
            }
        }
        let vector = self.decode_vector(&query.vector)?;
        if let Some(0) = query.search_list_size {
            return Err(DiskVecError::Invalid(
                "search_list_size must be positive".into(),
            ));
        }

        let hits: Vec<MatchHit> = self.graph.search(
            engine,
            &vector,
            query.k,
            &SearchOptions {
                search_list: query.search_list_size,
            },
        )?;

        let cap = query.limit.map_or(query.k, |l| l.min(query.k));
        let mut rows = Vec::with_capacity(cap.min(hits.len()));
        let column_names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        for hit in hits {
            if rows.len() >= cap {
                break;
            }
            let columns = match &self.rows_table {
                Some(rows_table) => engine
                    .read_row(rows_table, hit.rowid, &column_names)?
                    .unwrap_or_else(|| vec![Value::Null; column_names.len()]),
                None => Vec::new(),
            };
            let keep = query.filters.iter().all(|f| {
                let idx = column_names
                    .iter()
                    .position(|n| *n == f.column)
                    .expect("filter columns validated above");
                f.matches(&columns[idx])
            });
            if keep {
                rows.push(MatchRow {
                    rowid: hit.rowid as i64,
                    distance: hit.distance,
                    columns,
                });
            }
        }
        Ok(rows)
    }

    /// Opens a batch on the underlying graph.
    ///
    /// # Errors
    ///
    /// `Invalid` if a batch is already open.
    pub fn begin_batch(&mut self, flags: BatchFlags) -> Result<()> {
        self.graph
            .begin_batch(flags)
            .map_err(|e| e.in_context(&self.name, "begin_batch"))
    }

    /// Closes the batch, repairing deferred back-edges.
    ///
    /// # Errors
    ///
    /// `Invalid` if no batch is open; repair errors propagate.
    pub fn end_batch<E: StorageEngine>(&mut self, engine: &mut E) -> Result<()> {
        self.graph
            .end_batch(engine)
            .map_err(|e| e.in_context(&self.name, "end_batch"))
    }

    /// Test hook: rebounds the owning batch cache.
    ///
    /// # Errors
    ///
    /// `Invalid` when no owning-cache batch is open.
    pub fn set_batch_cache_capacity(&mut self, capacity: usize) -> Result<()> {
        self.graph.set_batch_cache_capacity(capacity)
    }

    /// Drops the index: all shadow tables are removed.
    ///
    /// Consumes the handle; any open batch is discarded first.
    ///
    /// # Errors
    ///
    /// Host errors propagate; the drop is not transactional beyond the
    /// host's own statement scope.
    pub fn drop_index<E: StorageEngine>(mut self, engine: &mut E) -> Result<()> {
        self.graph.abandon_batch();
        let name = self.name.clone();
        let mut drop_table = |table: &TableRef| {
            engine.execute_ddl(&format!(
                "DROP TABLE {}.{}",
                engine.quote_ident(&table.schema),
                engine.quote_ident(&table.name),
            ))
        };
        let result = drop_table(&self.blocks_table)
            .and_then(|()| drop_table(&self.meta_table))
            .and_then(|()| match &self.rows_table {
                Some(rows) => drop_table(rows),
                None => Ok(()),
            });
        result.map_err(|e| e.in_context(&name, "drop"))
    }

    /// The schema this index lives in.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }
}
