//! In-memory reference implementation of the host contract.
//!
//! [`MemEngine`] backs the test suite and doubles as an ephemeral index
//! store for embedders. It implements the same observable semantics a real
//! host provides: explicit-rowid rows in ascending order, `zeroblob`
//! allocation, incremental blob handles that can be retargeted with
//! `reopen`, and a savepoint stack with rollback-to/release behavior.
//!
//! The DDL executor only understands the statements the bridge composes
//! (`CREATE TABLE` / `DROP TABLE` with every identifier quoted), which is
//! deliberate: it proves that identifiers survive the quoting round-trip
//! unharmed, including hostile ones.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::error::{DiskVecError, Result};

use super::{BlobHandle, ScratchFile, StorageEngine, TableRef, Value};

#[derive(Clone, Default)]
struct MemTable {
    columns: Vec<String>,
    rows: BTreeMap<u64, HashMap<String, Value>>,
    kv: BTreeMap<String, String>,
}

#[derive(Default)]
struct MemInner {
    tables: HashMap<TableRef, MemTable>,
    savepoints: Vec<(String, HashMap<TableRef, MemTable>)>,
}

/// Deterministic in-memory storage engine.
///
/// Cloning the engine yields another handle onto the same storage, the way
/// multiple connections share one database file.
#[derive(Clone, Default)]
pub struct MemEngine {
    inner: Rc<RefCell<MemInner>>,
}

impl MemEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<R>(
        &self,
        table: &TableRef,
        f: impl FnOnce(&MemTable) -> Result<R>,
    ) -> Result<R> {
        let inner = self.inner.borrow();
        let t = inner
            .tables
            .get(table)
            .ok_or_else(|| DiskVecError::Io(format!("no such table: {table}")))?;
        f(t)
    }

    fn with_table_mut<R>(
        &self,
        table: &TableRef,
        f: impl FnOnce(&mut MemTable) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.inner.borrow_mut();
        let t = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| DiskVecError::Io(format!("no such table: {table}")))?;
        f(t)
    }
}

impl StorageEngine for MemEngine {
    type Blob = MemBlob;
    type Scratch = MemScratch;

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn execute_ddl(&mut self, sql: &str) -> Result<()> {
        if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
            let (table, columns) = parse_create_body(rest)?;
            let mut inner = self.inner.borrow_mut();
            if inner.tables.contains_key(&table) {
                return Err(DiskVecError::Exists(format!("table {table}")));
            }
            inner.tables.insert(
                table,
                MemTable {
                    columns,
                    ..MemTable::default()
                },
            );
            Ok(())
        } else if let Some(rest) = sql.strip_prefix("DROP TABLE ") {
            let (table, _) = parse_table_name(rest)?;
            let mut inner = self.inner.borrow_mut();
            if inner.tables.remove(&table).is_none() {
                return Err(DiskVecError::NotFound(format!("table {table}")));
            }
            Ok(())
        } else {
            Err(DiskVecError::Io(format!("unsupported DDL: {sql}")))
        }
    }

    fn table_exists(&self, table: &TableRef) -> Result<bool> {
        Ok(self.inner.borrow().tables.contains_key(table))
    }

    fn insert_row(
        &mut self,
        table: &TableRef,
        rowid: u64,
        values: &[(&str, Value)],
    ) -> Result<()> {
        self.with_table_mut(table, |t| {
            if t.rows.contains_key(&rowid) {
                return Err(DiskVecError::Exists(format!("rowid {rowid}")));
            }
            let mut row = HashMap::new();
            for (col, value) in values {
                if !t.columns.iter().any(|c| c == col) {
                    return Err(DiskVecError::Io(format!("no such column: {col}")));
                }
                // The zeroblob primitive allocates without shipping bytes;
                // materialize it on arrival.
                let stored = match value {
                    Value::ZeroBlob(n) => Value::Blob(vec![0u8; *n]),
                    other => other.clone(),
                };
                row.insert((*col).to_owned(), stored);
            }
            t.rows.insert(rowid, row);
            Ok(())
        })
    }

    fn delete_row(&mut self, table: &TableRef, rowid: u64) -> Result<bool> {
        self.with_table_mut(table, |t| Ok(t.rows.remove(&rowid).is_some()))
    }

    fn read_row(
        &self,
        table: &TableRef,
        rowid: u64,
        columns: &[&str],
    ) -> Result<Option<Vec<Value>>> {
        self.with_table(table, |t| {
            let Some(row) = t.rows.get(&rowid) else {
                return Ok(None);
            };
            let values = columns
                .iter()
                .map(|c| row.get(*c).cloned().unwrap_or(Value::Null))
                .collect();
            Ok(Some(values))
        })
    }

    fn row_exists(&self, table: &TableRef, rowid: u64) -> Result<bool> {
        self.with_table(table, |t| Ok(t.rows.contains_key(&rowid)))
    }

    fn row_count(&self, table: &TableRef) -> Result<u64> {
        self.with_table(table, |t| Ok(t.rows.len() as u64))
    }

    fn nth_rowid(&self, table: &TableRef, n: u64) -> Result<Option<u64>> {
        self.with_table(table, |t| {
            Ok(t.rows.keys().nth(n as usize).copied())
        })
    }

    fn put_kv(&mut self, table: &TableRef, key: &str, value: &str) -> Result<()> {
        self.with_table_mut(table, |t| {
            t.kv.insert(key.to_owned(), value.to_owned());
            Ok(())
        })
    }

    fn get_kv(&self, table: &TableRef, key: &str) -> Result<Option<String>> {
        self.with_table(table, |t| Ok(t.kv.get(key).cloned()))
    }

    fn open_blob(
        &self,
        table: &TableRef,
        column: &str,
        rowid: u64,
        writable: bool,
    ) -> Result<Self::Blob> {
        let len = self.with_table(table, |t| {
            let row = t
                .rows
                .get(&rowid)
                .ok_or_else(|| DiskVecError::NotFound(format!("rowid {rowid} in {table}")))?;
            match row.get(column) {
                Some(Value::Blob(b)) => Ok(b.len()),
                _ => Err(DiskVecError::Io(format!("column {column} is not a blob"))),
            }
        })?;
        Ok(MemBlob {
            inner: Rc::clone(&self.inner),
            table: table.clone(),
            column: column.to_owned(),
            rowid,
            len,
            writable,
        })
    }

    fn create_scratch(&self) -> Result<Self::Scratch> {
        Ok(MemScratch { data: Vec::new() })
    }

    fn savepoint(&mut self, name: &str) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let snapshot = inner.tables.clone();
        inner.savepoints.push((name.to_owned(), snapshot));
        Ok(())
    }

    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let pos = inner
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| DiskVecError::Io(format!("no such savepoint: {name}")))?;
        inner.savepoints.truncate(pos);
        Ok(())
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let pos = inner
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| DiskVecError::Io(format!("no such savepoint: {name}")))?;
        // Rollback restores state but keeps the savepoint open, so drop
        // everything above it and reinstate its snapshot.
        inner.savepoints.truncate(pos + 1);
        let snapshot = inner.savepoints[pos].1.clone();
        inner.tables = snapshot;
        Ok(())
    }
}

/// Incremental blob handle into a [`MemEngine`] row.
pub struct MemBlob {
    inner: Rc<RefCell<MemInner>>,
    table: TableRef,
    column: String,
    rowid: u64,
    len: usize,
    writable: bool,
}

impl MemBlob {
    fn with_blob<R>(&self, f: impl FnOnce(&[u8]) -> Result<R>) -> Result<R> {
        let inner = self.inner.borrow();
        let row = inner
            .tables
            .get(&self.table)
            .and_then(|t| t.rows.get(&self.rowid))
            .ok_or_else(|| {
                DiskVecError::Io(format!("blob row {} vanished in {}", self.rowid, self.table))
            })?;
        match row.get(&self.column) {
            Some(Value::Blob(b)) => f(b),
            _ => Err(DiskVecError::Io(format!(
                "column {} is not a blob",
                self.column
            ))),
        }
    }
}

impl BlobHandle for MemBlob {
    fn len(&self) -> usize {
        self.len
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.with_blob(|b| {
            let end = offset
                .checked_add(buf.len())
                .filter(|&e| e <= b.len())
                .ok_or_else(|| DiskVecError::Io("blob read out of range".into()))?;
            buf.copy_from_slice(&b[offset..end]);
            Ok(())
        })
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(DiskVecError::Io("blob handle is read-only".into()));
        }
        let mut inner = self.inner.borrow_mut();
        let row = inner
            .tables
            .get_mut(&self.table)
            .and_then(|t| t.rows.get_mut(&self.rowid))
            .ok_or_else(|| {
                DiskVecError::Io(format!("blob row {} vanished in {}", self.rowid, self.table))
            })?;
        match row.get_mut(&self.column) {
            Some(Value::Blob(b)) => {
                let end = offset
                    .checked_add(data.len())
                    .filter(|&e| e <= b.len())
                    .ok_or_else(|| DiskVecError::Io("blob write out of range".into()))?;
                b[offset..end].copy_from_slice(data);
                Ok(())
            }
            _ => Err(DiskVecError::Io(format!(
                "column {} is not a blob",
                self.column
            ))),
        }
    }

    fn reopen(&mut self, rowid: u64) -> Result<()> {
        let len = {
            let inner = self.inner.borrow();
            let row = inner
                .tables
                .get(&self.table)
                .and_then(|t| t.rows.get(&rowid))
                .ok_or_else(|| {
                    DiskVecError::NotFound(format!("rowid {rowid} in {}", self.table))
                })?;
            match row.get(&self.column) {
                Some(Value::Blob(b)) => b.len(),
                _ => {
                    return Err(DiskVecError::Io(format!(
                        "column {} is not a blob",
                        self.column
                    )))
                }
            }
        };
        self.rowid = rowid;
        self.len = len;
        Ok(())
    }
}

/// Scratch file backed by a plain byte vector.
pub struct MemScratch {
    data: Vec<u8>,
}

impl ScratchFile for MemScratch {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - offset);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }

    fn truncate(&mut self) -> Result<()> {
        self.data.clear();
        Ok(())
    }
}

/// Reads one quoted identifier starting at `input`, returning it together
/// with the remaining text. Doubled quotes unescape to a single quote.
fn parse_quoted(input: &str) -> Result<(String, &str)> {
    let rest = input
        .strip_prefix('"')
        .ok_or_else(|| DiskVecError::Io(format!("expected quoted identifier at: {input}")))?;
    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '"' {
            if rest[i + 1..].starts_with('"') {
                out.push('"');
                chars.next();
            } else {
                return Ok((out, &rest[i + 1..]));
            }
        } else {
            out.push(c);
        }
    }
    Err(DiskVecError::Io("unterminated quoted identifier".into()))
}

/// Parses `"schema"."name"` and returns the table plus the remaining text.
fn parse_table_name(input: &str) -> Result<(TableRef, &str)> {
    let (schema, rest) = parse_quoted(input)?;
    let rest = rest
        .strip_prefix('.')
        .ok_or_else(|| DiskVecError::Io("expected '.' in table name".into()))?;
    let (name, rest) = parse_quoted(rest)?;
    Ok((TableRef { schema, name }, rest))
}

/// Parses the body of a bridge-composed CREATE TABLE statement:
/// `"schema"."name" ("col" DECL, ...)`.
fn parse_create_body(input: &str) -> Result<(TableRef, Vec<String>)> {
    let (table, rest) = parse_table_name(input)?;
    let rest = rest.trim_start();
    let body = rest
        .strip_prefix('(')
        .and_then(|r| r.trim_end().strip_suffix(')'))
        .ok_or_else(|| DiskVecError::Io("expected column list".into()))?;

    let mut columns = Vec::new();
    let mut cursor = body.trim_start();
    loop {
        let (col, rest) = parse_quoted(cursor)?;
        columns.push(col);
        // Skip the type declaration up to the next top-level comma.
        match rest.find(',') {
            Some(pos) => cursor = rest[pos + 1..].trim_start(),
            None => break,
        }
    }
    Ok((table, columns))
}
