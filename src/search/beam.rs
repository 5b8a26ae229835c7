//! Greedy best-first beam search over the block graph.

use crate::block::BlockLayout;
use crate::error::Result;
use crate::host::StorageEngine;
use crate::io::{BlockCache, BlockHandle, BlockPager};
use crate::metric::MetricKind;

use super::candidates::{Candidate, CandidateList};
use super::visited::VisitedSet;

/// Tuning knobs for one traversal.
#[derive(Debug, Clone)]
pub struct BeamParams {
    /// Frontier bound `L` (`search_list` for queries, `build_search_list`
    /// for inserts).
    pub beam_width: usize,
    /// Keep a vector snapshot per candidate (needed when the frontier
    /// becomes a pruning pool).
    pub collect_vectors: bool,
    /// Rowid never admitted to the frontier (the node being inserted).
    pub exclude: Option<u64>,
    /// Pin blocks writable so a batch cache can reuse them for back-edge
    /// writes. Queries outside batch mode pin read-only.
    pub writable_reads: bool,
}

/// Reusable allocations for beam search.
///
/// One context lives on each index handle; clearing it between operations
/// keeps the visited table and frontier allocations warm.
pub struct SearchContext {
    /// Visited-rowid filter.
    pub visited: VisitedSet,
    /// The working frontier, sorted ascending by distance.
    pub frontier: CandidateList,
}

impl SearchContext {
    /// Creates a context sized for beam width `l`.
    #[must_use]
    pub fn new(l: usize) -> Self {
        Self {
            visited: VisitedSet::with_capacity(l * 8),
            frontier: CandidateList::new(l),
        }
    }

    /// Resets the context for a traversal with frontier bound `l`.
    pub fn reset(&mut self, l: usize) {
        self.visited.clear();
        self.frontier.clear();
        self.frontier.set_capacity(l);
    }
}

fn read_block<E: StorageEngine>(
    engine: &E,
    pager: &BlockPager,
    cache: &mut BlockCache,
    rowid: u64,
    writable: bool,
) -> Result<BlockHandle> {
    if let Some(handle) = cache.get(rowid) {
        return Ok(handle);
    }
    let handle = pager.open(engine, rowid, writable)?;
    cache.put(rowid, &handle);
    Ok(handle)
}

/// Runs greedy best-first search from `entries` toward `query`.
///
/// On return, `ctx.frontier` holds up to `beam_width` candidates in
/// ascending `(distance, rowid)` order. The traversal reads one block per
/// *expansion* — neighbors are scored from the expanded node's inlined edge
/// vector copies — and stops once every candidate is expanded or the
/// frontier has not improved for `beam_width` consecutive expansions.
///
/// Zombie edges (candidates whose block vanished) are dropped from the
/// frontier and otherwise ignored.
///
/// # Errors
///
/// Propagates host I/O failures; a plain missing block is not an error.
#[allow(clippy::too_many_arguments)]
pub fn beam_search<E: StorageEngine>(
    engine: &E,
    pager: &BlockPager,
    cache: &mut BlockCache,
    metric: MetricKind,
    query: &[f32],
    entries: &[u64],
    params: &BeamParams,
    ctx: &mut SearchContext,
) -> Result<()> {
    let layout: BlockLayout = *pager.layout();
    ctx.reset(params.beam_width.max(1));
    let SearchContext { visited, frontier } = ctx;

    if let Some(excluded) = params.exclude {
        visited.insert(excluded);
    }

    // Seed the frontier with the entry points. Entry scoring needs the
    // node's own block; everything after runs off edge vector copies.
    for &entry in entries {
        if visited.contains(entry) {
            continue;
        }
        visited.insert(entry);
        let handle = match read_block(engine, pager, cache, entry, params.writable_reads) {
            Ok(h) => h,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        };
        handle.with_view(&layout, |view| {
            let distance = metric.distance(query, view.vector());
            frontier.insert(Candidate {
                rowid: entry,
                distance,
                expanded: false,
                vector: params.collect_vectors.then(|| view.vector().into()),
            });
        });
    }

    let mut stale = 0usize;
    while stale < params.beam_width.max(1) {
        let Some(index) = frontier.nearest_unexpanded() else {
            break;
        };
        let rowid = frontier.get(index).rowid;
        let handle = match read_block(engine, pager, cache, rowid, params.writable_reads) {
            Ok(h) => h,
            Err(e) if e.is_not_found() => {
                // Zombie candidate: its block is gone, drop it outright.
                frontier.remove(index);
                continue;
            }
            Err(e) => return Err(e),
        };
        frontier.mark_expanded(index);

        let mut improved = false;
        handle.with_view(&layout, |view| {
            for edge in view.edges() {
                if visited.contains(edge.rowid) {
                    continue;
                }
                visited.insert(edge.rowid);
                let distance = metric.distance(query, edge.vector);
                let accepted = frontier.insert(Candidate {
                    rowid: edge.rowid,
                    distance,
                    expanded: false,
                    vector: params.collect_vectors.then(|| edge.vector.into()),
                });
                improved |= accepted;
            }
        });

        if improved {
            stale = 0;
        } else {
            stale += 1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mem::MemEngine;
    use crate::host::TableRef;

    fn build_line_graph(n: u64) -> (MemEngine, BlockPager) {
        // Nodes i at (i, 0), each linked to its neighbors i-1 and i+1.
        let mut engine = MemEngine::new();
        engine
            .execute_ddl(
                "CREATE TABLE \"main\".\"t_blocks\" \
                 (\"rowid\" INTEGER PRIMARY KEY, \"data\" BLOB)",
            )
            .unwrap();
        let layout = BlockLayout::new(2, 0, 4).unwrap();
        let pager = BlockPager::new(TableRef::new("main", "t_blocks"), layout);
        for i in 0..n {
            let h = pager.allocate(&mut engine, i).unwrap();
            h.with_mut(&layout, |b| {
                b.init(i, &[i as f32, 0.0]);
                if i > 0 {
                    b.push_edge(i - 1, 1.0, &[(i - 1) as f32, 0.0]).unwrap();
                }
                if i + 1 < n {
                    b.push_edge(i + 1, 1.0, &[(i + 1) as f32, 0.0]).unwrap();
                }
            })
            .unwrap();
            h.flush().unwrap();
        }
        (engine, pager)
    }

    fn params(l: usize) -> BeamParams {
        BeamParams {
            beam_width: l,
            collect_vectors: false,
            exclude: None,
            writable_reads: false,
        }
    }

    #[test]
    fn test_walks_to_target() {
        let (engine, pager) = build_line_graph(20);
        let mut cache = BlockCache::new(16);
        let mut ctx = SearchContext::new(8);
        beam_search(
            &engine,
            &pager,
            &mut cache,
            MetricKind::Euclidean,
            &[15.0, 0.0],
            &[0],
            &params(8),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(ctx.frontier.get(0).rowid, 15);
        assert_eq!(ctx.frontier.get(0).distance, 0.0);
    }

    #[test]
    fn test_results_sorted_ascending() {
        let (engine, pager) = build_line_graph(20);
        let mut cache = BlockCache::new(16);
        let mut ctx = SearchContext::new(6);
        beam_search(
            &engine,
            &pager,
            &mut cache,
            MetricKind::Euclidean,
            &[7.3, 0.0],
            &[0, 19],
            &params(6),
            &mut ctx,
        )
        .unwrap();
        let dists: Vec<f32> = ctx.frontier.iter().map(|c| c.distance).collect();
        let mut sorted = dists.clone();
        sorted.sort_by(f32::total_cmp);
        assert_eq!(dists, sorted);
    }

    #[test]
    fn test_excluded_rowid_never_appears() {
        let (engine, pager) = build_line_graph(10);
        let mut cache = BlockCache::new(16);
        let mut ctx = SearchContext::new(8);
        let mut p = params(8);
        p.exclude = Some(5);
        beam_search(
            &engine,
            &pager,
            &mut cache,
            MetricKind::Euclidean,
            &[5.0, 0.0],
            &[0],
            &p,
            &mut ctx,
        )
        .unwrap();
        assert!(ctx.frontier.iter().all(|c| c.rowid != 5));
        assert!(!ctx.frontier.is_empty());
    }

    #[test]
    fn test_zombie_edge_is_skipped() {
        let (mut engine, pager) = build_line_graph(10);
        // Node 5 vanishes, leaving 4 -> 5 and 6 -> 5 dangling.
        pager.delete(&mut engine, 5).unwrap();
        let mut cache = BlockCache::new(16);
        let mut ctx = SearchContext::new(8);
        beam_search(
            &engine,
            &pager,
            &mut cache,
            MetricKind::Euclidean,
            &[9.0, 0.0],
            &[0],
            &params(8),
            &mut ctx,
        )
        .unwrap();
        assert!(ctx.frontier.iter().all(|c| c.rowid != 5));
        // 5 was scored from 4's inlined copy but dropped at expansion; the
        // far side of the gap stays unreachable from 0.
        assert!(ctx.frontier.iter().all(|c| c.rowid <= 4));
        assert!(ctx.frontier.iter().any(|c| c.rowid == 4));
    }

    #[test]
    fn test_missing_entry_point_is_tolerated() {
        let (engine, pager) = build_line_graph(5);
        let mut cache = BlockCache::new(8);
        let mut ctx = SearchContext::new(4);
        beam_search(
            &engine,
            &pager,
            &mut cache,
            MetricKind::Euclidean,
            &[2.0, 0.0],
            &[99, 1],
            &params(4),
            &mut ctx,
        )
        .unwrap();
        assert!(!ctx.frontier.is_empty());
        assert_eq!(ctx.frontier.get(0).rowid, 2);
    }

    #[test]
    fn test_collect_vectors_keeps_snapshots() {
        let (engine, pager) = build_line_graph(6);
        let mut cache = BlockCache::new(8);
        let mut ctx = SearchContext::new(4);
        let mut p = params(4);
        p.collect_vectors = true;
        beam_search(
            &engine,
            &pager,
            &mut cache,
            MetricKind::Euclidean,
            &[3.0, 0.0],
            &[0],
            &p,
            &mut ctx,
        )
        .unwrap();
        for c in ctx.frontier.iter() {
            let v = c.vector.as_ref().expect("vector snapshot");
            assert_eq!(v.len(), 2);
            assert_eq!(v[0], c.rowid as f32);
        }
    }

    #[test]
    fn test_cache_serves_repeat_expansions() {
        let (engine, pager) = build_line_graph(8);
        let mut cache = BlockCache::new(8);
        let mut ctx = SearchContext::new(4);
        beam_search(
            &engine,
            &pager,
            &mut cache,
            MetricKind::Euclidean,
            &[4.0, 0.0],
            &[0],
            &params(4),
            &mut ctx,
        )
        .unwrap();
        let reads_first = pager.stats().reads();
        beam_search(
            &engine,
            &pager,
            &mut cache,
            MetricKind::Euclidean,
            &[4.0, 0.0],
            &[0],
            &params(4),
            &mut ctx,
        )
        .unwrap();
        // Second pass is served from cache.
        assert_eq!(pager.stats().reads(), reads_first);
        assert!(cache.hits() > 0);
    }
}
