//! Block I/O: pinned handles, the pager, and the LRU cache.
//!
//! A [`BlockHandle`] is a pinned in-memory window over one node's block
//! bytes, backed by an open incremental-blob handle on the host engine.
//! Handles are reference counted: the creator, every cache slot, and every
//! traversal pin hold one strong reference each, and the buffer is freed
//! exactly when the last reference drops. Cache eviction therefore can
//! never free a block that is still pinned by a search in progress.
//!
//! The [`BlockPager`] owns the table identity and layout and mints handles;
//! the [`BlockCache`] is a bounded LRU of strong references with hit/miss
//! accounting.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::block::{BlockBuf, BlockLayout, BlockMut, BlockView};
use crate::error::{DiskVecError, Result};
use crate::host::{BlobHandle, StorageEngine, TableRef, Value};

mod cache;

pub use cache::BlockCache;

/// Read/write counters shared between a pager and the handles it minted.
#[derive(Default)]
pub struct PagerStats {
    reads: Cell<u64>,
    writes: Cell<u64>,
}

impl PagerStats {
    /// Number of whole-block reads performed.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.reads.get()
    }

    /// Number of whole-block writes performed.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.get()
    }
}

struct HandleInner {
    rowid: Cell<u64>,
    buf: RefCell<BlockBuf>,
    blob: RefCell<Box<dyn BlobHandle>>,
    writable: bool,
    stats: Rc<PagerStats>,
}

/// A pinned, reference-counted window over one node's block.
#[derive(Clone)]
pub struct BlockHandle {
    inner: Rc<HandleInner>,
}

impl std::fmt::Debug for BlockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockHandle")
            .field("rowid", &self.inner.rowid.get())
            .field("writable", &self.inner.writable)
            .finish()
    }
}

impl BlockHandle {
    /// The rowid this handle is currently pinned to.
    #[must_use]
    pub fn rowid(&self) -> u64 {
        self.inner.rowid.get()
    }

    /// Whether the handle may be flushed back.
    #[must_use]
    pub fn writable(&self) -> bool {
        self.inner.writable
    }

    /// Number of strong references currently pinning this block.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// True when both handles pin the same underlying block buffer.
    #[must_use]
    pub fn same_block(&self, other: &BlockHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Runs `f` over a read-only view of the block.
    pub fn with_view<R>(&self, layout: &BlockLayout, f: impl FnOnce(BlockView<'_>) -> R) -> R {
        let buf = self.inner.buf.borrow();
        f(BlockView::new(layout, buf.bytes()))
    }

    /// Runs `f` over a mutable view of the block.
    ///
    /// # Errors
    ///
    /// `Io` if the handle was opened read-only.
    pub fn with_mut<R>(
        &self,
        layout: &BlockLayout,
        f: impl FnOnce(&mut BlockMut<'_>) -> R,
    ) -> Result<R> {
        if !self.inner.writable {
            return Err(DiskVecError::Io(format!(
                "block {} is pinned read-only",
                self.rowid()
            )));
        }
        let mut buf = self.inner.buf.borrow_mut();
        let mut block = BlockMut::new(layout, buf.bytes_mut());
        Ok(f(&mut block))
    }

    /// Writes the buffered block back through the blob handle.
    ///
    /// # Errors
    ///
    /// `Io` if the handle is read-only or the host write fails.
    pub fn flush(&self) -> Result<()> {
        if !self.inner.writable {
            return Err(DiskVecError::Io(format!(
                "block {} is pinned read-only",
                self.rowid()
            )));
        }
        let buf = self.inner.buf.borrow();
        self.inner.blob.borrow_mut().write_at(0, buf.bytes())?;
        self.inner.stats.writes.set(self.inner.stats.writes.get() + 1);
        Ok(())
    }

    /// Repins this handle onto another row of the same table, reusing the
    /// already-open blob instead of paying a fresh open.
    ///
    /// # Errors
    ///
    /// `NotFound` if the target row does not exist, `Corrupt` if its blob
    /// has the wrong size.
    pub fn reload(&self, rowid: u64) -> Result<()> {
        let mut blob = self.inner.blob.borrow_mut();
        blob.reopen(rowid)?;
        let mut buf = self.inner.buf.borrow_mut();
        if blob.len() != buf.len() {
            return Err(DiskVecError::Corrupt(format!(
                "block {} has size {}, expected {}",
                rowid,
                blob.len(),
                buf.len()
            )));
        }
        blob.read_at(0, buf.bytes_mut())?;
        self.inner.stats.reads.set(self.inner.stats.reads.get() + 1);
        self.inner.rowid.set(rowid);
        Ok(())
    }
}

/// Allocates, opens, flushes, and deletes node blocks for one index.
pub struct BlockPager {
    table: TableRef,
    layout: BlockLayout,
    stats: Rc<PagerStats>,
}

/// Name of the blob column in the blocks shadow table.
pub const BLOCK_COLUMN: &str = "data";

impl BlockPager {
    /// Creates a pager over the given blocks shadow table.
    #[must_use]
    pub fn new(table: TableRef, layout: BlockLayout) -> Self {
        Self {
            table,
            layout,
            stats: Rc::new(PagerStats::default()),
        }
    }

    /// The blocks shadow table this pager addresses.
    #[must_use]
    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// The block layout shared by every handle.
    #[must_use]
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// I/O counters.
    #[must_use]
    pub fn stats(&self) -> &PagerStats {
        &self.stats
    }

    /// Allocates a zero-filled block row for `rowid` and pins it writable.
    ///
    /// # Errors
    ///
    /// `Exists` if the rowid already has a block.
    pub fn allocate<E: StorageEngine>(&self, engine: &mut E, rowid: u64) -> Result<BlockHandle> {
        engine.insert_row(
            &self.table,
            rowid,
            &[(BLOCK_COLUMN, Value::ZeroBlob(self.layout.block_size()))],
        )?;
        self.open(engine, rowid, true)
    }

    /// Pins the block for `rowid`, reading its bytes into memory.
    ///
    /// # Errors
    ///
    /// `NotFound` if no block exists for `rowid`, `Corrupt` if the stored
    /// blob has the wrong size.
    pub fn open<E: StorageEngine>(
        &self,
        engine: &E,
        rowid: u64,
        writable: bool,
    ) -> Result<BlockHandle> {
        let blob = engine.open_blob(&self.table, BLOCK_COLUMN, rowid, writable)?;
        if blob.len() != self.layout.block_size() {
            return Err(DiskVecError::Corrupt(format!(
                "block {} has size {}, expected {}",
                rowid,
                blob.len(),
                self.layout.block_size()
            )));
        }
        let mut buf = BlockBuf::zeroed(self.layout.block_size());
        blob.read_at(0, buf.bytes_mut())?;
        self.stats.reads.set(self.stats.reads.get() + 1);
        Ok(BlockHandle {
            inner: Rc::new(HandleInner {
                rowid: Cell::new(rowid),
                buf: RefCell::new(buf),
                blob: RefCell::new(Box::new(blob)),
                writable,
                stats: Rc::clone(&self.stats),
            }),
        })
    }

    /// Deletes the block row for `rowid`; returns whether it existed.
    ///
    /// # Errors
    ///
    /// `Io` on engine failure.
    pub fn delete<E: StorageEngine>(&self, engine: &mut E, rowid: u64) -> Result<bool> {
        engine.delete_row(&self.table, rowid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mem::MemEngine;

    fn setup(dim: usize, degree: usize) -> (MemEngine, BlockPager) {
        let mut engine = MemEngine::new();
        engine
            .execute_ddl(
                "CREATE TABLE \"main\".\"t_blocks\" \
                 (\"rowid\" INTEGER PRIMARY KEY, \"data\" BLOB)",
            )
            .unwrap();
        let layout = BlockLayout::new(dim, 0, degree).unwrap();
        let pager = BlockPager::new(TableRef::new("main", "t_blocks"), layout);
        (engine, pager)
    }

    #[test]
    fn test_allocate_write_reopen() {
        let (mut engine, pager) = setup(3, 4);
        let layout = *pager.layout();

        let handle = pager.allocate(&mut engine, 11).unwrap();
        handle
            .with_mut(&layout, |b| {
                b.init(11, &[1.0, 2.0, 3.0]);
                b.push_edge(5, 0.25, &[0.5, 0.5, 0.5]).unwrap();
            })
            .unwrap();
        handle.flush().unwrap();
        drop(handle);

        let handle = pager.open(&engine, 11, false).unwrap();
        handle.with_view(&layout, |v| {
            assert_eq!(v.rowid(), 11);
            assert_eq!(v.n_edges(), 1);
            assert_eq!(v.edge(0).rowid, 5);
        });
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let (engine, pager) = setup(3, 4);
        assert!(pager.open(&engine, 99, false).unwrap_err().is_not_found());
    }

    #[test]
    fn test_readonly_handle_rejects_writes() {
        let (mut engine, pager) = setup(3, 4);
        let layout = *pager.layout();
        pager.allocate(&mut engine, 1).unwrap().flush().unwrap();

        let handle = pager.open(&engine, 1, false).unwrap();
        assert!(handle.with_mut(&layout, |_| ()).is_err());
        assert!(handle.flush().is_err());
    }

    #[test]
    fn test_reload_reuses_handle() {
        let (mut engine, pager) = setup(2, 2);
        let layout = *pager.layout();
        for rowid in [1u64, 2] {
            let h = pager.allocate(&mut engine, rowid).unwrap();
            h.with_mut(&layout, |b| b.init(rowid, &[rowid as f32, 0.0]))
                .unwrap();
            h.flush().unwrap();
        }

        let handle = pager.open(&engine, 1, true).unwrap();
        handle.reload(2).unwrap();
        assert_eq!(handle.rowid(), 2);
        handle.with_view(&layout, |v| assert_eq!(v.vector()[0], 2.0));
        assert!(handle.reload(7).unwrap_err().is_not_found());
    }

    #[test]
    fn test_refcount_balances() {
        let (mut engine, pager) = setup(2, 2);
        let handle = pager.allocate(&mut engine, 1).unwrap();
        assert_eq!(handle.ref_count(), 1);
        {
            let pin = handle.clone();
            assert_eq!(handle.ref_count(), 2);
            assert!(pin.same_block(&handle));
        }
        assert_eq!(handle.ref_count(), 1);
    }

    #[test]
    fn test_pager_counts_io() {
        let (mut engine, pager) = setup(2, 2);
        let h = pager.allocate(&mut engine, 1).unwrap();
        h.flush().unwrap();
        h.flush().unwrap();
        let _ = pager.open(&engine, 1, false).unwrap();
        assert_eq!(pager.stats().reads(), 2); // allocate + open
        assert_eq!(pager.stats().writes(), 2);
    }
}
