//! Batch-mode state: owning cache and the deferred back-edge list.
//!
//! Bulk loads bracket inserts between `begin_batch` and `end_batch`. Two
//! composable behaviors:
//!
//! - an *owning cache* keeps hot blocks pinned across inserts, so hub nodes
//!   are not re-fetched once per insert;
//! - *deferred back-edges* skip phase 2 of each insert and record the
//!   intended `neighbor -> new_node` edges instead. `end_batch` replays
//!   them grouped by neighbor, one open/prune/write cycle per group.
//!
//! The deferred list is memory-bounded; overflow spills to a host-owned
//! scratch file as length-prefixed, CRC-framed postcard records, drained
//! back in chunks during repair. The list is volatile on purpose: losing
//! it (crash, abnormal close) costs recall, never consistency, because the
//! forward edges are already durable.

use serde::{Deserialize, Serialize};

use crate::error::{DiskVecError, Result};
use crate::host::{ScratchFile, StorageEngine};
use crate::io::BlockCache;

/// Record count kept in memory before spilling to the scratch file.
pub(crate) const DEFERRED_MEM_RECORDS: usize = 1024;

/// Records decoded per drain step during the repair pass.
pub(crate) const REPAIR_CHUNK_RECORDS: usize = 256;

/// Frame header: payload length + CRC32, both little-endian.
const FRAME_HEADER_SIZE: usize = 8;

/// Behaviors enabled for one batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchFlags {
    /// Pin every block read into an owning cache for the batch lifetime.
    pub owning_cache: bool,
    /// Skip insert phase 2 and repair back-edges at `end_batch`.
    pub deferred_back_edges: bool,
}

/// One intended back-edge `target -> source`, recorded during a deferred
/// batch insert of `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DeferredEdge {
    /// Existing neighbor that should gain the edge.
    pub target: u64,
    /// The freshly inserted node.
    pub source: u64,
    /// Distance between the two, computed at insert time.
    pub distance: f32,
    /// The new node's vector (becomes the inlined edge copy).
    pub vector: Vec<f32>,
}

/// Per-batch state owned by the graph index.
pub(crate) struct BatchState {
    pub cache: Option<BlockCache>,
    pub deferred: Option<DeferredEdgeList>,
}

/// Bounded in-memory list of deferred edges with scratch-file overflow.
pub(crate) struct DeferredEdgeList {
    records: Vec<DeferredEdge>,
    spill: Option<Box<dyn ScratchFile>>,
    spilled_records: u64,
    mem_limit: usize,
}

impl DeferredEdgeList {
    pub fn new() -> Self {
        Self::with_mem_limit(DEFERRED_MEM_RECORDS)
    }

    pub fn with_mem_limit(mem_limit: usize) -> Self {
        Self {
            records: Vec::new(),
            spill: None,
            spilled_records: 0,
            mem_limit: mem_limit.max(1),
        }
    }

    /// Total recorded edges, spilled ones included.
    pub fn len(&self) -> u64 {
        self.spilled_records + self.records.len() as u64
    }

    /// Appends one edge, spilling the in-memory tranche on overflow.
    pub fn push<E: StorageEngine>(&mut self, engine: &E, edge: DeferredEdge) -> Result<()> {
        self.records.push(edge);
        if self.records.len() >= self.mem_limit {
            self.spill_to_scratch(engine)?;
        }
        Ok(())
    }

    fn spill_to_scratch<E: StorageEngine>(&mut self, engine: &E) -> Result<()> {
        if self.spill.is_none() {
            self.spill = Some(Box::new(engine.create_scratch()?));
            log::debug!(
                "deferred edge list exceeded {} records, spilling to scratch",
                self.mem_limit
            );
        }
        let spill = self.spill.as_mut().expect("spill file just ensured");
        for record in self.records.drain(..) {
            let payload = postcard::to_stdvec(&record)
                .map_err(|e| DiskVecError::Io(format!("deferred edge encode: {e}")))?;
            let len = u32::try_from(payload.len())
                .map_err(|_| DiskVecError::NoMem("deferred edge record too large".into()))?;
            let crc = crc32fast::hash(&payload);
            let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
            frame.extend_from_slice(&len.to_le_bytes());
            frame.extend_from_slice(&crc.to_le_bytes());
            frame.extend_from_slice(&payload);
            spill.append(&frame)?;
            self.spilled_records += 1;
        }
        Ok(())
    }

    /// Drains every recorded edge in chunks, invoking `apply` per chunk.
    ///
    /// Spilled records drain first (in write order), then the in-memory
    /// tail. Each chunk holds at most [`REPAIR_CHUNK_RECORDS`] records so
    /// repair memory stays bounded regardless of batch size.
    pub fn drain_chunks(
        &mut self,
        mut apply: impl FnMut(Vec<DeferredEdge>) -> Result<()>,
    ) -> Result<()> {
        if let Some(spill) = self.spill.take() {
            let mut offset = 0u64;
            let mut chunk = Vec::with_capacity(REPAIR_CHUNK_RECORDS);
            for _ in 0..self.spilled_records {
                let record = read_frame(spill.as_ref(), &mut offset)?;
                chunk.push(record);
                if chunk.len() >= REPAIR_CHUNK_RECORDS {
                    apply(std::mem::take(&mut chunk))?;
                }
            }
            if !chunk.is_empty() {
                apply(chunk)?;
            }
            self.spilled_records = 0;
        }
        while !self.records.is_empty() {
            let take = self.records.len().min(REPAIR_CHUNK_RECORDS);
            let chunk: Vec<DeferredEdge> = self.records.drain(..take).collect();
            apply(chunk)?;
        }
        Ok(())
    }
}

fn read_exact(spill: &dyn ScratchFile, offset: &mut u64, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = spill.read_at(*offset + filled as u64, &mut buf[filled..])?;
        if n == 0 {
            return Err(DiskVecError::Corrupt(
                "deferred edge spill file truncated".into(),
            ));
        }
        filled += n;
    }
    *offset += buf.len() as u64;
    Ok(())
}

fn read_frame(spill: &dyn ScratchFile, offset: &mut u64) -> Result<DeferredEdge> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    read_exact(spill, offset, &mut header)?;
    let len = u32::from_le_bytes(header[0..4].try_into().expect("4-byte field")) as usize;
    let expected_crc = u32::from_le_bytes(header[4..8].try_into().expect("4-byte field"));

    let mut payload = vec![0u8; len];
    read_exact(spill, offset, &mut payload)?;
    let actual_crc = crc32fast::hash(&payload);
    if actual_crc != expected_crc {
        return Err(DiskVecError::Corrupt(format!(
            "deferred edge spill checksum mismatch: expected {expected_crc:#010x}, \
             got {actual_crc:#010x}"
        )));
    }
    postcard::from_bytes(&payload)
        .map_err(|e| DiskVecError::Corrupt(format!("deferred edge decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mem::MemEngine;

    fn edge(target: u64, source: u64) -> DeferredEdge {
        DeferredEdge {
            target,
            source,
            distance: (target + source) as f32,
            vector: vec![source as f32; 4],
        }
    }

    #[test]
    fn test_in_memory_roundtrip() {
        let engine = MemEngine::new();
        let mut list = DeferredEdgeList::new();
        for i in 0..10 {
            list.push(&engine, edge(i % 3, 100 + i)).unwrap();
        }
        assert_eq!(list.len(), 10);

        let mut seen = Vec::new();
        list.drain_chunks(|chunk| {
            seen.extend(chunk);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.len(), 10);
        assert_eq!(seen[0], edge(0, 100));
    }

    #[test]
    fn test_spill_and_drain_preserves_records() {
        let engine = MemEngine::new();
        let mut list = DeferredEdgeList::with_mem_limit(8);
        let total = 50u64;
        for i in 0..total {
            list.push(&engine, edge(i, 1000 + i)).unwrap();
        }
        assert_eq!(list.len(), total);

        let mut seen = Vec::new();
        list.drain_chunks(|chunk| {
            assert!(chunk.len() <= REPAIR_CHUNK_RECORDS);
            seen.extend(chunk);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.len(), total as usize);
        // Spill order is write order.
        for (i, record) in seen.iter().enumerate() {
            assert_eq!(record.source, 1000 + i as u64);
            assert_eq!(record.vector, vec![record.source as f32; 4]);
        }
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_chunking_bounds_memory() {
        let engine = MemEngine::new();
        let mut list = DeferredEdgeList::with_mem_limit(4);
        for i in 0..(REPAIR_CHUNK_RECORDS as u64 * 3 + 7) {
            list.push(&engine, edge(i, i)).unwrap();
        }
        let mut chunks = 0;
        list.drain_chunks(|chunk| {
            assert!(!chunk.is_empty());
            assert!(chunk.len() <= REPAIR_CHUNK_RECORDS);
            chunks += 1;
            Ok(())
        })
        .unwrap();
        assert!(chunks >= 3);
    }
}
