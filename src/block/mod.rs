//! Node block codec.
//!
//! Every node of the graph is serialized into exactly one fixed-size block,
//! stored as a BLOB row in the host engine. Blocks are never relocated: a
//! rowid maps to the same block from insert until delete.
//!
//! # Layout
//!
//! All scalar fields are little-endian; vector components are IEEE-754
//! binary32, byte-copied. With dimension `D` and block size `B`:
//!
//! ```text
//! offset  0 .. 8        rowid (u64)
//! offset  8 .. 10       n_edges (u16)
//! offset 10 .. 12       padding (u16, zero)
//! offset 12 .. 16       reserved (u32, zero)
//! offset 16 .. 16+4D    node vector (D x f32)
//! offset 16+4D + i*4D   edge i vector copy (D x f32)
//! offset B - 16*(i+1)   edge i metadata: rowid (u64) | distance (f32) | pad
//! ```
//!
//! Edge vector copies grow forward from the header; edge metadata entries
//! grow backward from the end of the block. The two regions meet at
//! `max_edges_capacity = (B - 16 - 4D) / (4D + 16)` edges, so both sides
//! address any slot in O(1) without scanning.
//!
//! Offsets are always derived from `(D, B)` through [`BlockLayout`]; nothing
//! outside this module touches raw block bytes.

use crate::error::{DiskVecError, Result};

mod buf;

pub use buf::BlockBuf;

/// Fixed header size: rowid + edge count + padding + reserved.
pub const NODE_HEADER_SIZE: usize = 16;

/// Size of one edge metadata entry: rowid + distance + padding.
pub const EDGE_META_SIZE: usize = 16;

/// Blocks are sized in multiples of this granule.
pub const BLOCK_ALIGN: usize = 64;

/// Derived offsets and capacities for one index's blocks.
///
/// Constructed once per open index from the persisted `(dimension,
/// block_size, max_degree)` configuration and shared by every block view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockLayout {
    dim: usize,
    block_size: usize,
    max_edges: usize,
}

impl BlockLayout {
    /// Derives the layout for `dim`-dimensional vectors in `block_size`-byte
    /// blocks, validating that `max_degree` edges fit.
    ///
    /// A `block_size` of zero selects the smallest multiple of
    /// [`BLOCK_ALIGN`] that holds `max_degree` edges.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::Invalid`] if the block size is not a multiple
    /// of [`BLOCK_ALIGN`] or cannot hold `max_degree` edges.
    pub fn new(dim: usize, block_size: usize, max_degree: usize) -> Result<Self> {
        let block_size = if block_size == 0 {
            Self::auto_block_size(dim, max_degree)
        } else {
            block_size
        };
        if block_size % BLOCK_ALIGN != 0 {
            return Err(DiskVecError::Invalid(format!(
                "block_size {block_size} is not a multiple of {BLOCK_ALIGN}"
            )));
        }

        let node_overhead = NODE_HEADER_SIZE + 4 * dim;
        if block_size < node_overhead {
            return Err(DiskVecError::Invalid(format!(
                "block_size {block_size} cannot hold a {dim}-dimensional node"
            )));
        }
        // The on-disk edge count is a u16; capacity clamps accordingly.
        let max_edges = ((block_size - node_overhead) / Self::edge_overhead(dim))
            .min(usize::from(u16::MAX));
        if max_edges < max_degree {
            return Err(DiskVecError::Invalid(format!(
                "block_size {block_size} holds {max_edges} edges, \
                 but max_degree is {max_degree}"
            )));
        }

        Ok(Self {
            dim,
            block_size,
            max_edges,
        })
    }

    /// Bytes occupied by one edge: inlined vector copy plus metadata entry.
    #[must_use]
    pub fn edge_overhead(dim: usize) -> usize {
        4 * dim + EDGE_META_SIZE
    }

    /// The smallest aligned block size holding `max_degree` edges.
    #[must_use]
    pub fn auto_block_size(dim: usize, max_degree: usize) -> usize {
        let needed = NODE_HEADER_SIZE + 4 * dim + max_degree * Self::edge_overhead(dim);
        (needed + BLOCK_ALIGN - 1) / BLOCK_ALIGN * BLOCK_ALIGN
    }

    /// Vector dimensionality.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Total block size in bytes.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// How many edges physically fit in one block.
    #[must_use]
    pub fn max_edges(&self) -> usize {
        self.max_edges
    }

    fn vector_offset(&self) -> usize {
        NODE_HEADER_SIZE
    }

    fn edge_vector_offset(&self, i: usize) -> usize {
        NODE_HEADER_SIZE + 4 * self.dim + i * 4 * self.dim
    }

    fn edge_meta_offset(&self, i: usize) -> usize {
        self.block_size - EDGE_META_SIZE * (i + 1)
    }
}

/// One decoded out-edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeRef<'a> {
    /// Rowid of the neighbor node.
    pub rowid: u64,
    /// Distance from this node to the neighbor, cached at edge creation.
    pub distance: f32,
    /// Snapshot of the neighbor's vector taken when the edge was written.
    pub vector: &'a [f32],
}

/// Read-only view over one node block.
#[derive(Clone, Copy)]
pub struct BlockView<'a> {
    layout: &'a BlockLayout,
    buf: &'a [u8],
}

impl<'a> BlockView<'a> {
    /// Wraps a raw block buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer length does not match the layout's block size;
    /// buffers are sized by the pager, so a mismatch is a logic error.
    #[must_use]
    pub fn new(layout: &'a BlockLayout, buf: &'a [u8]) -> Self {
        assert_eq!(buf.len(), layout.block_size(), "block buffer size mismatch");
        Self { layout, buf }
    }

    /// The rowid this block was written for.
    #[must_use]
    pub fn rowid(&self) -> u64 {
        u64::from_le_bytes(self.buf[0..8].try_into().expect("8-byte field"))
    }

    /// Number of live out-edges.
    #[must_use]
    pub fn n_edges(&self) -> usize {
        u16::from_le_bytes(self.buf[8..10].try_into().expect("2-byte field")) as usize
    }

    /// The node's own vector.
    #[must_use]
    pub fn vector(&self) -> &'a [f32] {
        let start = self.layout.vector_offset();
        bytemuck::cast_slice(&self.buf[start..start + 4 * self.layout.dim()])
    }

    /// Decodes edge `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= n_edges()`.
    #[must_use]
    pub fn edge(&self, i: usize) -> EdgeRef<'a> {
        assert!(i < self.n_edges(), "edge index {i} out of bounds");
        let meta = self.layout.edge_meta_offset(i);
        let rowid = u64::from_le_bytes(self.buf[meta..meta + 8].try_into().expect("8-byte field"));
        let distance = f32::from_le_bytes(
            self.buf[meta + 8..meta + 12]
                .try_into()
                .expect("4-byte field"),
        );
        let vstart = self.layout.edge_vector_offset(i);
        let vector = bytemuck::cast_slice(&self.buf[vstart..vstart + 4 * self.layout.dim()]);
        EdgeRef {
            rowid,
            distance,
            vector,
        }
    }

    /// Finds the slot holding an edge to `target`, if any.
    #[must_use]
    pub fn find_edge(&self, target: u64) -> Option<usize> {
        (0..self.n_edges()).find(|&i| {
            let meta = self.layout.edge_meta_offset(i);
            u64::from_le_bytes(self.buf[meta..meta + 8].try_into().expect("8-byte field"))
                == target
        })
    }

    /// Iterates over all live edges.
    pub fn edges(&self) -> impl Iterator<Item = EdgeRef<'a>> + '_ {
        (0..self.n_edges()).map(move |i| self.edge(i))
    }
}

/// Mutable view over one node block.
pub struct BlockMut<'a> {
    layout: &'a BlockLayout,
    buf: &'a mut [u8],
}

impl<'a> BlockMut<'a> {
    /// Wraps a raw block buffer for mutation.
    ///
    /// # Panics
    ///
    /// Panics if the buffer length does not match the layout's block size.
    #[must_use]
    pub fn new(layout: &'a BlockLayout, buf: &'a mut [u8]) -> Self {
        assert_eq!(buf.len(), layout.block_size(), "block buffer size mismatch");
        Self { layout, buf }
    }

    /// A read-only view of the same buffer.
    #[must_use]
    pub fn view(&self) -> BlockView<'_> {
        BlockView::new(self.layout, self.buf)
    }

    /// Initializes the block for a fresh node: rowid, vector, zero edges.
    ///
    /// # Panics
    ///
    /// Panics if `vector` does not match the layout dimension.
    pub fn init(&mut self, rowid: u64, vector: &[f32]) {
        self.buf.fill(0);
        self.buf[0..8].copy_from_slice(&rowid.to_le_bytes());
        self.set_vector(vector);
    }

    /// Overwrites the node's own vector.
    ///
    /// # Panics
    ///
    /// Panics if `vector` does not match the layout dimension.
    pub fn set_vector(&mut self, vector: &[f32]) {
        assert_eq!(vector.len(), self.layout.dim(), "vector dimension mismatch");
        let start = self.layout.vector_offset();
        self.buf[start..start + 4 * vector.len()].copy_from_slice(bytemuck::cast_slice(vector));
    }

    fn set_n_edges(&mut self, n: usize) {
        debug_assert!(n <= self.layout.max_edges());
        let n = u16::try_from(n).expect("edge count bounded by block capacity");
        self.buf[8..10].copy_from_slice(&n.to_le_bytes());
    }

    /// Writes edge data into slot `i` without changing the edge count.
    ///
    /// # Panics
    ///
    /// Panics if `i` is outside block capacity or `vector` has the wrong
    /// dimension.
    pub fn replace_edge(&mut self, i: usize, rowid: u64, distance: f32, vector: &[f32]) {
        assert!(i < self.layout.max_edges(), "edge slot {i} out of capacity");
        assert_eq!(vector.len(), self.layout.dim(), "vector dimension mismatch");
        let meta = self.layout.edge_meta_offset(i);
        self.buf[meta..meta + 8].copy_from_slice(&rowid.to_le_bytes());
        self.buf[meta + 8..meta + 12].copy_from_slice(&distance.to_le_bytes());
        self.buf[meta + 12..meta + EDGE_META_SIZE].fill(0);
        let vstart = self.layout.edge_vector_offset(i);
        self.buf[vstart..vstart + 4 * vector.len()].copy_from_slice(bytemuck::cast_slice(vector));
    }

    /// Appends an edge.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::Invalid`] if the block is at capacity; the
    /// caller is expected to re-prune instead.
    pub fn push_edge(&mut self, rowid: u64, distance: f32, vector: &[f32]) -> Result<()> {
        let n = self.view().n_edges();
        if n >= self.layout.max_edges() {
            return Err(DiskVecError::Invalid(format!(
                "node {} is at edge capacity {}",
                self.view().rowid(),
                self.layout.max_edges()
            )));
        }
        self.replace_edge(n, rowid, distance, vector);
        self.set_n_edges(n + 1);
        Ok(())
    }

    /// Removes edge `i` by moving the last edge into its slot.
    ///
    /// # Panics
    ///
    /// Panics if `i >= n_edges()`.
    pub fn delete_edge(&mut self, i: usize) {
        let n = self.view().n_edges();
        assert!(i < n, "edge index {i} out of bounds");
        let last = n - 1;
        if i != last {
            // Move the last edge's metadata and vector copy into slot i.
            let (src_meta, dst_meta) = (
                self.layout.edge_meta_offset(last),
                self.layout.edge_meta_offset(i),
            );
            self.buf
                .copy_within(src_meta..src_meta + EDGE_META_SIZE, dst_meta);
            let (src_vec, dst_vec) = (
                self.layout.edge_vector_offset(last),
                self.layout.edge_vector_offset(i),
            );
            self.buf
                .copy_within(src_vec..src_vec + 4 * self.layout.dim(), dst_vec);
        }
        self.set_n_edges(last);
    }

    /// Truncates the edge list to the first `n` entries.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the current edge count.
    pub fn prune_to(&mut self, n: usize) {
        assert!(n <= self.view().n_edges(), "cannot grow edges via prune_to");
        self.set_n_edges(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(dim: usize, degree: usize) -> BlockLayout {
        BlockLayout::new(dim, 0, degree).unwrap()
    }

    #[test]
    fn test_auto_block_size_granularity() {
        // D=3, R=4: 16 + 12 + 4*(12+16) = 140 -> 192
        assert_eq!(BlockLayout::auto_block_size(3, 4), 192);
        // Exact multiple stays put: pick D,R so needed % 64 == 0.
        // D=12, R=8: 16 + 48 + 8*64 = 576
        assert_eq!(BlockLayout::auto_block_size(12, 8), 576);
    }

    #[test]
    fn test_capacity_formula() {
        let l = layout(3, 4);
        assert_eq!(
            l.max_edges(),
            (l.block_size() - NODE_HEADER_SIZE - 4 * 3) / (4 * 3 + EDGE_META_SIZE)
        );
        assert!(l.max_edges() >= 4);
    }

    #[test]
    fn test_rejects_undersized_block() {
        let err = BlockLayout::new(128, 64, 16).unwrap_err();
        assert!(matches!(err, DiskVecError::Invalid(_)));
        let err = BlockLayout::new(3, 100, 4).unwrap_err();
        assert!(matches!(err, DiskVecError::Invalid(_)));
    }

    #[test]
    fn test_regions_never_collide() {
        let l = layout(7, 9);
        let vectors_end = l.edge_vector_offset(l.max_edges() - 1) + 4 * l.dim();
        let meta_start = l.edge_meta_offset(l.max_edges() - 1);
        assert!(vectors_end <= meta_start);
    }

    #[test]
    fn test_init_and_roundtrip() {
        let l = layout(3, 4);
        let mut buf = BlockBuf::zeroed(l.block_size());
        let mut block = BlockMut::new(&l, buf.bytes_mut());
        block.init(42, &[1.0, 2.0, 3.0]);
        block.push_edge(7, 0.5, &[4.0, 5.0, 6.0]).unwrap();
        block.push_edge(9, 1.5, &[7.0, 8.0, 9.0]).unwrap();

        let view = BlockView::new(&l, buf.bytes());
        assert_eq!(view.rowid(), 42);
        assert_eq!(view.vector(), &[1.0, 2.0, 3.0]);
        assert_eq!(view.n_edges(), 2);
        let e = view.edge(0);
        assert_eq!((e.rowid, e.distance), (7, 0.5));
        assert_eq!(e.vector, &[4.0, 5.0, 6.0]);
        assert_eq!(view.find_edge(9), Some(1));
        assert_eq!(view.find_edge(8), None);
    }

    #[test]
    fn test_delete_edge_swaps_with_last() {
        let l = layout(2, 4);
        let mut buf = BlockBuf::zeroed(l.block_size());
        let mut block = BlockMut::new(&l, buf.bytes_mut());
        block.init(1, &[0.0, 0.0]);
        block.push_edge(10, 1.0, &[1.0, 0.0]).unwrap();
        block.push_edge(20, 2.0, &[0.0, 1.0]).unwrap();
        block.push_edge(30, 3.0, &[1.0, 1.0]).unwrap();

        block.delete_edge(0);
        let view = block.view();
        assert_eq!(view.n_edges(), 2);
        let e = view.edge(0);
        assert_eq!((e.rowid, e.distance), (30, 3.0));
        assert_eq!(e.vector, &[1.0, 1.0]);
        assert_eq!(view.edge(1).rowid, 20);
    }

    #[test]
    fn test_push_edge_capacity() {
        let l = BlockLayout::new(2, BlockLayout::auto_block_size(2, 2), 2).unwrap();
        let cap = l.max_edges();
        let mut buf = BlockBuf::zeroed(l.block_size());
        let mut block = BlockMut::new(&l, buf.bytes_mut());
        block.init(1, &[0.0, 0.0]);
        for i in 0..cap {
            block
                .push_edge(i as u64 + 2, i as f32, &[0.0, 1.0])
                .unwrap();
        }
        assert!(block.push_edge(99, 0.0, &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_prune_to_truncates() {
        let l = layout(2, 4);
        let mut buf = BlockBuf::zeroed(l.block_size());
        let mut block = BlockMut::new(&l, buf.bytes_mut());
        block.init(1, &[0.0, 0.0]);
        for i in 0..4u64 {
            block.push_edge(i + 10, i as f32, &[0.0, 1.0]).unwrap();
        }
        block.prune_to(1);
        assert_eq!(block.view().n_edges(), 1);
        assert_eq!(block.view().edge(0).rowid, 10);
    }
}
