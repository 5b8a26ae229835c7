//! The disk-resident graph index: insert, delete, search, batch mode.
//!
//! A [`GraphIndex`] is the per-index handle tying everything together: the
//! block pager, the immutable configuration, the entry-point RNG, and the
//! reusable search context. Every method takes the host engine explicitly,
//! mirroring how the index is driven by the virtual-table bridge — one
//! serialized call at a time, no state shared across handles.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::block::BlockLayout;
use crate::error::{DiskVecError, Result};
use crate::host::{StorageEngine, TableRef};
use crate::io::{BlockCache, BlockHandle, BlockPager};
use crate::meta::{
    IndexOptions, BATCH_CACHE_CAPACITY, ENTRY_SAMPLE_COUNT, LRU_CAPACITY, MIN_DEGREE,
};
use crate::search::{beam_search, BeamParams, SearchContext};

mod batch;
mod prune;

pub use batch::BatchFlags;
pub use prune::{robust_prune, PruneCandidate};

use batch::{BatchState, DeferredEdge, DeferredEdgeList};

/// Savepoint bracketing one insert, so a phase-2 failure rolls the whole
/// statement back.
const INSERT_SAVEPOINT: &str = "diskvec_insert";

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchHit {
    /// Rowid of the matched node.
    pub rowid: u64,
    /// Distance from the query under the index metric.
    pub distance: f32,
}

/// Per-query knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    /// Overrides the configured `search_list` for this query only.
    pub search_list: Option<usize>,
}

/// Counters accumulated on one index handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Whole-block reads.
    pub num_reads: u64,
    /// Whole-block writes.
    pub num_writes: u64,
    /// Block-cache hits.
    pub cache_hits: u64,
    /// Block-cache misses.
    pub cache_misses: u64,
}

/// Disk-resident Vamana-style graph index over one blocks shadow table.
pub struct GraphIndex {
    pager: BlockPager,
    options: IndexOptions,
    rng: ChaCha8Rng,
    ctx: SearchContext,
    batch: Option<BatchState>,
    cache_hits: u64,
    cache_misses: u64,
}

impl GraphIndex {
    /// Opens an index over `blocks_table` with a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::Invalid`] if the options are out of range.
    pub fn open(blocks_table: TableRef, options: IndexOptions) -> Result<Self> {
        let layout = options.layout()?;
        let rng = ChaCha8Rng::seed_from_u64(options.entry_seed);
        let ctx = SearchContext::new(options.search_list.max(options.build_search_list));
        Ok(Self {
            pager: BlockPager::new(blocks_table, layout),
            options,
            rng,
            ctx,
            batch: None,
            cache_hits: 0,
            cache_misses: 0,
        })
    }

    /// The index configuration.
    #[must_use]
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Number of live nodes.
    ///
    /// # Errors
    ///
    /// Propagates host failures.
    pub fn count<E: StorageEngine>(&self, engine: &E) -> Result<u64> {
        engine.row_count(self.pager.table())
    }

    /// Counter snapshot for this handle.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let (mut hits, mut misses) = (self.cache_hits, self.cache_misses);
        if let Some(cache) = self.batch.as_ref().and_then(|b| b.cache.as_ref()) {
            hits += cache.hits();
            misses += cache.misses();
        }
        IndexStats {
            num_reads: self.pager.stats().reads(),
            num_writes: self.pager.stats().writes(),
            cache_hits: hits,
            cache_misses: misses,
        }
    }

    fn validate_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.options.dimension {
            return Err(DiskVecError::Dimension {
                expected: self.options.dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(DiskVecError::Invalid(
                "vector contains NaN or infinite components".into(),
            ));
        }
        Ok(())
    }

    /// Samples up to [`ENTRY_SAMPLE_COUNT`] distinct live rowids, never
    /// returning `exclude` (the node currently being inserted).
    fn sample_entries<E: StorageEngine>(
        &mut self,
        engine: &E,
        exclude: Option<u64>,
    ) -> Result<Vec<u64>> {
        let count = engine.row_count(self.pager.table())?;
        let eligible = (count as usize).saturating_sub(usize::from(exclude.is_some()));
        if eligible == 0 {
            return Ok(Vec::new());
        }
        let want = ENTRY_SAMPLE_COUNT.min(eligible);
        let mut entries: Vec<u64> = Vec::with_capacity(want);
        let mut attempts = 0;
        while entries.len() < want && attempts < want * 8 {
            attempts += 1;
            let n = self.rng.gen_range(0..count);
            if let Some(rowid) = engine.nth_rowid(self.pager.table(), n)? {
                if Some(rowid) != exclude && !entries.contains(&rowid) {
                    entries.push(rowid);
                }
            }
        }
        Ok(entries)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_beam<E: StorageEngine>(
        engine: &E,
        pager: &BlockPager,
        batch: Option<&mut BatchState>,
        hits: &mut u64,
        misses: &mut u64,
        query: &[f32],
        entries: &[u64],
        metric: crate::metric::MetricKind,
        beam_width: usize,
        collect_vectors: bool,
        exclude: Option<u64>,
        ctx: &mut SearchContext,
    ) -> Result<()> {
        let mut local_cache;
        let (cache, batch_owned): (&mut BlockCache, bool) = match batch {
            Some(BatchState {
                cache: Some(cache), ..
            }) => (cache, true),
            _ => {
                local_cache = BlockCache::new(LRU_CAPACITY);
                (&mut local_cache, false)
            }
        };
        let params = BeamParams {
            beam_width,
            collect_vectors,
            exclude,
            writable_reads: batch_owned,
        };
        beam_search(engine, pager, cache, metric, query, entries, &params, ctx)?;
        if !batch_owned {
            // The batch cache's counters fold in at end_batch instead.
            *hits += cache.hits();
            *misses += cache.misses();
        }
        Ok(())
    }

    /// Inserts a vector under a caller-chosen rowid.
    ///
    /// Phase 1 writes the node's own block (forward edges from a pruned
    /// beam-search pool); phase 2 adds the reciprocal back-edges, or defers
    /// them when a deferred batch is open. The whole insert runs inside a
    /// savepoint: a phase-2 failure leaves no partial forward edges behind.
    ///
    /// # Errors
    ///
    /// `Exists` for a duplicate rowid, `Dimension`/`Invalid` for malformed
    /// vectors, host errors otherwise.
    pub fn insert<E: StorageEngine>(
        &mut self,
        engine: &mut E,
        rowid: u64,
        vector: &[f32],
    ) -> Result<()> {
        self.validate_vector(vector)?;

        engine.savepoint(INSERT_SAVEPOINT)?;
        match self.insert_inner(engine, rowid, vector) {
            Ok(()) => engine.release_savepoint(INSERT_SAVEPOINT),
            Err(err) => {
                if let Err(rollback_err) = engine.rollback_to_savepoint(INSERT_SAVEPOINT) {
                    log::warn!("insert rollback failed: {rollback_err}");
                }
                let _ = engine.release_savepoint(INSERT_SAVEPOINT);
                // Cached block buffers may predate the rollback.
                if let Some(cache) = self.batch.as_mut().and_then(|b| b.cache.as_mut()) {
                    cache.clear();
                }
                Err(err)
            }
        }
    }

    fn insert_inner<E: StorageEngine>(
        &mut self,
        engine: &mut E,
        rowid: u64,
        vector: &[f32],
    ) -> Result<()> {
        let layout: BlockLayout = *self.pager.layout();
        let was_empty = engine.row_count(self.pager.table())? == 0;

        let handle = self.pager.allocate(engine, rowid)?;
        handle.with_mut(&layout, |block| block.init(rowid, vector))?;
        if was_empty {
            return handle.flush();
        }

        let entries = self.sample_entries(engine, Some(rowid))?;
        Self::run_beam(
            engine,
            &self.pager,
            self.batch.as_mut(),
            &mut self.cache_hits,
            &mut self.cache_misses,
            vector,
            &entries,
            self.options.metric,
            self.options.build_search_list,
            true,
            Some(rowid),
            &mut self.ctx,
        )?;

        let pool: Vec<PruneCandidate> = self
            .ctx
            .frontier
            .drain()
            .filter_map(|c| {
                c.vector.map(|v| PruneCandidate {
                    rowid: c.rowid,
                    distance: c.distance,
                    vector: v,
                })
            })
            .collect();
        let edges = robust_prune(
            self.options.metric,
            pool,
            self.options.max_degree,
            self.options.prune_alpha,
            MIN_DEGREE,
        );

        handle.with_mut(&layout, |block| -> Result<()> {
            for edge in &edges {
                block.push_edge(edge.rowid, edge.distance, &edge.vector)?;
            }
            Ok(())
        })??;
        handle.flush()?;
        drop(handle);

        if let Some(deferred) = self
            .batch
            .as_mut()
            .and_then(|batch| batch.deferred.as_mut())
        {
            for edge in &edges {
                deferred.push(
                    engine,
                    DeferredEdge {
                        target: edge.rowid,
                        source: rowid,
                        distance: edge.distance,
                        vector: vector.to_vec(),
                    },
                )?;
            }
            return Ok(());
        }

        let mut reuse = None;
        for edge in &edges {
            let record = DeferredEdge {
                target: edge.rowid,
                source: rowid,
                distance: edge.distance,
                vector: vector.to_vec(),
            };
            Self::apply_back_edges(
                engine,
                &self.pager,
                self.batch.as_mut().and_then(|b| b.cache.as_mut()),
                &mut reuse,
                &self.options,
                edge.rowid,
                std::slice::from_ref(&record),
                false,
            )?;
        }
        Ok(())
    }

    /// Adds back-edges `target -> record.source` for every record, pruning
    /// the target's adjacency when it would exceed the degree bound.
    ///
    /// A vanished target is a zombie and is skipped silently. With
    /// `verify_sources` (the repair pass), records whose source node was
    /// deleted after being recorded are dropped too, so batch end never
    /// manufactures edges into nothing.
    #[allow(clippy::too_many_arguments)]
    fn apply_back_edges<E: StorageEngine>(
        engine: &E,
        pager: &BlockPager,
        cache: Option<&mut BlockCache>,
        reuse: &mut Option<BlockHandle>,
        options: &IndexOptions,
        target: u64,
        records: &[DeferredEdge],
        verify_sources: bool,
    ) -> Result<()> {
        let layout: BlockLayout = *pager.layout();

        let handle = if let Some(cache) = cache {
            let cached = cache.get(target).filter(BlockHandle::writable);
            match cached {
                Some(handle) => handle,
                None => match pager.open(engine, target, true) {
                    Ok(handle) => {
                        cache.put(target, &handle);
                        handle
                    }
                    Err(e) if e.is_not_found() => {
                        log::debug!("skipping back-edges to vanished node {target}");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                },
            }
        } else if let Some(handle) = reuse.as_ref() {
            match handle.reload(target) {
                Ok(()) => handle.clone(),
                Err(e) if e.is_not_found() => {
                    log::debug!("skipping back-edges to vanished node {target}");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        } else {
            match pager.open(engine, target, true) {
                Ok(handle) => {
                    *reuse = Some(handle.clone());
                    handle
                }
                Err(e) if e.is_not_found() => {
                    log::debug!("skipping back-edges to vanished node {target}");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        };

        // Filter to genuinely new edges: no self-loops, no duplicates of
        // existing adjacency, no duplicates within the batch itself.
        let mut news: Vec<&DeferredEdge> = Vec::with_capacity(records.len());
        handle.with_view(&layout, |view| {
            for record in records {
                if record.source == target {
                    continue;
                }
                if view.find_edge(record.source).is_some() {
                    continue;
                }
                if news.iter().any(|n| n.source == record.source) {
                    continue;
                }
                news.push(record);
            }
        });
        if verify_sources {
            let mut live = Vec::with_capacity(news.len());
            for record in news {
                if engine.row_exists(pager.table(), record.source)? {
                    live.push(record);
                } else {
                    log::debug!(
                        "dropping deferred back-edge to deleted node {}",
                        record.source
                    );
                }
            }
            news = live;
        }
        if news.is_empty() {
            return Ok(());
        }

        let n_edges = handle.with_view(&layout, |view| view.n_edges());
        if n_edges + news.len() <= options.max_degree {
            handle.with_mut(&layout, |block| -> Result<()> {
                for record in &news {
                    block.push_edge(record.source, record.distance, &record.vector)?;
                }
                Ok(())
            })??;
        } else {
            // Over the degree bound: re-prune the whole adjacency with the
            // newcomers in the pool.
            let mut pool: Vec<PruneCandidate> = handle.with_view(&layout, |view| {
                view.edges()
                    .map(|e| PruneCandidate {
                        rowid: e.rowid,
                        distance: e.distance,
                        vector: e.vector.into(),
                    })
                    .collect()
            });
            for record in &news {
                pool.push(PruneCandidate {
                    rowid: record.source,
                    distance: record.distance,
                    vector: record.vector.clone().into_boxed_slice(),
                });
            }
            let pruned = robust_prune(
                options.metric,
                pool,
                options.max_degree,
                options.prune_alpha,
                MIN_DEGREE,
            );
            handle.with_mut(&layout, |block| -> Result<()> {
                block.prune_to(0);
                for edge in &pruned {
                    block.push_edge(edge.rowid, edge.distance, &edge.vector)?;
                }
                Ok(())
            })??;
        }
        handle.flush()
    }

    /// Deletes a node, rewriting the adjacency of every out-neighbor that
    /// points back at it.
    ///
    /// # Errors
    ///
    /// `NotFound` if no node has this rowid, host errors otherwise.
    pub fn delete<E: StorageEngine>(&mut self, engine: &mut E, rowid: u64) -> Result<()> {
        let layout: BlockLayout = *self.pager.layout();

        let target = self.pager.open(engine, rowid, false)?;
        let neighbors: Vec<u64> =
            target.with_view(&layout, |view| view.edges().map(|e| e.rowid).collect());
        drop(target);

        for neighbor in neighbors {
            let cache = self.batch.as_mut().and_then(|b| b.cache.as_mut());
            let handle = if let Some(cache) = cache {
                match cache.get(neighbor).filter(BlockHandle::writable) {
                    Some(handle) => handle,
                    None => match self.pager.open(engine, neighbor, true) {
                        Ok(handle) => {
                            cache.put(neighbor, &handle);
                            handle
                        }
                        Err(e) if e.is_not_found() => continue,
                        Err(e) => return Err(e),
                    },
                }
            } else {
                match self.pager.open(engine, neighbor, true) {
                    Ok(handle) => handle,
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e),
                }
            };
            // Back-edges are not guaranteed to exist (pruning keeps the
            // graph asymmetric), so absence is fine.
            let slot = handle.with_view(&layout, |view| view.find_edge(rowid));
            if let Some(slot) = slot {
                handle.with_mut(&layout, |block| block.delete_edge(slot))?;
                handle.flush()?;
            }
        }

        if let Some(cache) = self.batch.as_mut().and_then(|b| b.cache.as_mut()) {
            cache.remove(rowid);
        }
        self.pager.delete(engine, rowid)?;
        Ok(())
    }

    /// Finds the `k` nearest live nodes to `query`.
    ///
    /// Results are non-decreasing in distance with ties broken by rowid.
    /// The traversal is read-only: blocks are pinned, never written.
    ///
    /// # Errors
    ///
    /// `Dimension`/`Invalid` for malformed queries, host errors otherwise.
    pub fn search<E: StorageEngine>(
        &mut self,
        engine: &E,
        query: &[f32],
        k: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<MatchHit>> {
        self.validate_vector(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let beam_width = opts.search_list.unwrap_or(self.options.search_list).max(k);
        let entries = self.sample_entries(engine, None)?;
        Self::run_beam(
            engine,
            &self.pager,
            self.batch.as_mut(),
            &mut self.cache_hits,
            &mut self.cache_misses,
            query,
            &entries,
            self.options.metric,
            beam_width,
            false,
            None,
            &mut self.ctx,
        )?;

        let mut hits = Vec::with_capacity(k);
        for candidate in self.ctx.frontier.iter() {
            if hits.len() >= k {
                break;
            }
            // Expanded candidates proved themselves live when their block
            // was read; unexpanded stragglers get an existence probe so a
            // zombie can never surface in results.
            let live = candidate.expanded
                || engine.row_exists(self.pager.table(), candidate.rowid)?;
            if live {
                hits.push(MatchHit {
                    rowid: candidate.rowid,
                    distance: candidate.distance,
                });
            }
        }
        Ok(hits)
    }

    /// True while a batch is open.
    #[must_use]
    pub fn batch_open(&self) -> bool {
        self.batch.is_some()
    }

    /// Opens a batch with the given behaviors.
    ///
    /// # Errors
    ///
    /// `Invalid` if a batch is already open (nesting is prohibited).
    pub fn begin_batch(&mut self, flags: BatchFlags) -> Result<()> {
        if self.batch.is_some() {
            return Err(DiskVecError::Invalid("batch already open".into()));
        }
        self.batch = Some(BatchState {
            cache: flags
                .owning_cache
                .then(|| BlockCache::new(BATCH_CACHE_CAPACITY)),
            deferred: flags.deferred_back_edges.then(DeferredEdgeList::new),
        });
        Ok(())
    }

    /// Rebounds the owning batch cache (test hook for cache-pressure
    /// scenarios).
    ///
    /// # Errors
    ///
    /// `Invalid` when no owning-cache batch is open.
    pub fn set_batch_cache_capacity(&mut self, capacity: usize) -> Result<()> {
        let cache = self
            .batch
            .as_mut()
            .and_then(|b| b.cache.as_mut())
            .ok_or_else(|| DiskVecError::Invalid("no owning batch cache".into()))?;
        cache.set_capacity(capacity);
        Ok(())
    }

    /// Closes the batch, running the back-edge repair pass if edges were
    /// deferred.
    ///
    /// # Errors
    ///
    /// `Invalid` when no batch is open; repair propagates host errors (the
    /// remaining deferred edges are then discarded, which costs recall but
    /// never consistency).
    pub fn end_batch<E: StorageEngine>(&mut self, engine: &mut E) -> Result<()> {
        let Some(mut batch) = self.batch.take() else {
            return Err(DiskVecError::Invalid("no batch open".into()));
        };

        let result = if let Some(mut deferred) = batch.deferred.take() {
            let total = deferred.len();
            log::debug!("repairing {total} deferred back-edges");
            let pager = &self.pager;
            let options = &self.options;
            let mut reuse = None;
            let cache = &mut batch.cache;
            deferred.drain_chunks(|mut chunk| {
                chunk.sort_by_key(|e| e.target);
                let mut i = 0;
                while i < chunk.len() {
                    let target = chunk[i].target;
                    let end = chunk[i..]
                        .iter()
                        .position(|e| e.target != target)
                        .map_or(chunk.len(), |p| i + p);
                    Self::apply_back_edges(
                        engine,
                        pager,
                        cache.as_mut(),
                        &mut reuse,
                        options,
                        target,
                        &chunk[i..end],
                        true,
                    )?;
                    i = end;
                }
                Ok(())
            })
        } else {
            Ok(())
        };

        if let Some(cache) = batch.cache {
            self.cache_hits += cache.hits();
            self.cache_misses += cache.misses();
        }
        result
    }

    /// Discards any open batch without repair.
    ///
    /// Deferred back-edges are lost (forward edges stay consistent); the
    /// loss is logged because it degrades recall until the affected nodes
    /// are touched again.
    pub fn abandon_batch(&mut self) {
        if let Some(batch) = self.batch.take() {
            if let Some(deferred) = &batch.deferred {
                let pending = deferred.len();
                if pending > 0 {
                    log::warn!(
                        "discarding {pending} deferred back-edges on close; \
                         recall may degrade until a rebuild"
                    );
                }
            }
            if let Some(cache) = batch.cache {
                self.cache_hits += cache.hits();
                self.cache_misses += cache.misses();
            }
        }
    }
}

impl Drop for GraphIndex {
    fn drop(&mut self) {
        self.abandon_batch();
    }
}
