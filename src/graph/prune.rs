//! Alpha-relaxed robust pruning.

use crate::metric::MetricKind;

/// One pruning-pool entry: a prospective out-edge with its vector snapshot.
#[derive(Debug, Clone)]
pub struct PruneCandidate {
    /// Rowid of the prospective neighbor.
    pub rowid: u64,
    /// Distance from the node being pruned to this candidate.
    pub distance: f32,
    /// Snapshot of the candidate's vector (written into the edge).
    pub vector: Box<[f32]>,
}

/// Selects up to `max_degree` diverse out-edges from `pool`.
///
/// Classic robust pruning: repeatedly take the nearest remaining candidate
/// `p*`, then discard every remaining `q` with
/// `alpha * d(p*, q) <= d(node, q)` — candidates that `p*` already covers.
///
/// The minimum-degree floor keeps sparse regions connected: whenever the
/// pool has been pruned empty but fewer than `min_degree` edges were
/// selected, the next candidate is admitted unconditionally (in distance
/// order, ignoring its discard mark). The result therefore always has at
/// least `min(min_degree, pool.len())` edges.
///
/// Returns the selected candidates in ascending distance order.
#[must_use]
pub fn robust_prune(
    metric: MetricKind,
    mut pool: Vec<PruneCandidate>,
    max_degree: usize,
    alpha: f32,
    min_degree: usize,
) -> Vec<PruneCandidate> {
    pool.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.rowid.cmp(&b.rowid)));

    let n = pool.len();
    let mut discarded = vec![false; n];
    let mut selected = vec![false; n];
    let mut order = Vec::with_capacity(max_degree.min(n));

    while order.len() < max_degree {
        let next = (0..n)
            .find(|&i| !selected[i] && !discarded[i])
            .or_else(|| {
                // Pool pruned dry below the degree floor: admit the nearest
                // remaining candidate regardless of its discard mark.
                if order.len() < min_degree {
                    (0..n).find(|&i| !selected[i])
                } else {
                    None
                }
            });
        let Some(p) = next else { break };
        selected[p] = true;
        order.push(p);

        for q in 0..n {
            if selected[q] || discarded[q] {
                continue;
            }
            let d_pq = metric.distance(&pool[p].vector, &pool[q].vector);
            if alpha * d_pq <= pool[q].distance {
                discarded[q] = true;
            }
        }
    }

    // `order` is ascending by construction; extract in that order.
    let mut out = Vec::with_capacity(order.len());
    let mut taken: Vec<Option<PruneCandidate>> = pool.into_iter().map(Some).collect();
    for i in order {
        out.push(taken[i].take().expect("each index selected once"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(rowid: u64, distance: f32, vector: &[f32]) -> PruneCandidate {
        PruneCandidate {
            rowid,
            distance,
            vector: vector.into(),
        }
    }

    #[test]
    fn test_keeps_all_when_under_degree() {
        let pool = vec![
            cand(1, 1.0, &[1.0, 0.0]),
            cand(2, 2.0, &[0.0, 2.0]),
        ];
        let out = robust_prune(MetricKind::Euclidean, pool, 8, 1.2, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].rowid, 1);
    }

    #[test]
    fn test_respects_degree_bound() {
        let pool: Vec<_> = (0..20)
            .map(|i| {
                let angle = i as f32;
                cand(i, 1.0 + angle * 0.1, &[angle.cos(), angle.sin()])
            })
            .collect();
        let out = robust_prune(MetricKind::Euclidean, pool, 5, 1.0, 2);
        assert!(out.len() <= 5);
    }

    #[test]
    fn test_nearest_always_selected_first() {
        let pool = vec![
            cand(5, 3.0, &[3.0, 0.0]),
            cand(9, 0.5, &[0.5, 0.0]),
            cand(2, 1.0, &[0.0, 1.0]),
        ];
        let out = robust_prune(MetricKind::Euclidean, pool, 3, 1.4, 2);
        assert_eq!(out[0].rowid, 9);
    }

    #[test]
    fn test_occluded_candidate_dropped() {
        // Target at origin. Candidate 1 at (1, 0); candidate 2 right behind
        // it at (1.1, 0): d(1,2) = 0.1^2 = 0.01, alpha * 0.01 <= d(node,2)
        // = 1.21, so 2 is occluded. Candidate 3 is off-axis and survives.
        // min_degree = 1 keeps the floor out of the way.
        let pool = vec![
            cand(1, 1.0, &[1.0, 0.0]),
            cand(2, 1.21, &[1.1, 0.0]),
            cand(3, 4.0, &[0.0, 2.0]),
        ];
        let out = robust_prune(MetricKind::Euclidean, pool, 2, 1.2, 1);
        let rowids: Vec<u64> = out.iter().map(|c| c.rowid).collect();
        assert_eq!(rowids, vec![1, 3]);
    }

    #[test]
    fn test_min_degree_floor_readmits() {
        // A tight cluster: everything is occluded by the first pick under
        // aggressive alpha, but the floor keeps 3 edges.
        let pool = vec![
            cand(1, 1.0, &[1.0, 0.0]),
            cand(2, 1.01, &[1.01, 0.0]),
            cand(3, 1.02, &[1.02, 0.0]),
            cand(4, 1.03, &[1.03, 0.0]),
        ];
        let out = robust_prune(MetricKind::Euclidean, pool.clone(), 8, 2.0, 3);
        assert_eq!(out.len(), 3);
        // Readmission goes in distance order.
        let rowids: Vec<u64> = out.iter().map(|c| c.rowid).collect();
        assert_eq!(rowids, vec![1, 2, 3]);

        // Without the floor the same pool collapses to one edge.
        let out = robust_prune(MetricKind::Euclidean, pool, 8, 2.0, 1);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_floor_bounded_by_pool_size() {
        let pool = vec![cand(1, 1.0, &[1.0])];
        let out = robust_prune(MetricKind::Euclidean, pool, 8, 1.4, 8);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_output_sorted_ascending() {
        let pool: Vec<_> = (0..30)
            .map(|i| {
                let x = (i as f32) * 0.7 % 5.0;
                let y = (i as f32) * 1.3 % 7.0;
                cand(i, x * x + y * y, &[x, y])
            })
            .collect();
        let out = robust_prune(MetricKind::Euclidean, pool, 10, 1.4, 4);
        for w in out.windows(2) {
            assert!(w[0].distance <= w[1].distance);
        }
    }
}
