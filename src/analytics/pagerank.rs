//! Power-iteration kernels: PageRank and eigenvector centrality.

use std::collections::HashMap;

use tracing::trace;

use crate::model::NodeId;
use crate::store::{GraphSnapshot, GraphStore};

use super::by_id;

/// PageRank parameters. Defaults match the classic formulation.
#[derive(Debug, Clone, Copy)]
pub struct PageRankParams {
    /// Damping factor in `(0, 1)`.
    pub damping: f64,
    pub max_iter: usize,
    /// L1 convergence threshold.
    pub tol: f64,
}

impl Default for PageRankParams {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iter: 100,
            tol: 1e-4,
        }
    }
}

/// Plain power-iteration parameters for eigenvector centrality.
#[derive(Debug, Clone, Copy)]
pub struct PowerParams {
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for PowerParams {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-4,
        }
    }
}

/// PageRank by power iteration.
///
/// Rank starts at `1/N`; each step applies
/// `r'(v) = (1-d)/N + d * (Σ_{u→v} r(u)/out(u) + dangling/N)` where the
/// dangling mass of zero-out-degree nodes is redistributed uniformly.
/// Iteration stops when `Σ|r' - r| < tol` or `max_iter` is reached; the
/// result sums to 1 within `tol`.
pub fn pagerank(store: &GraphStore, params: &PageRankParams) -> HashMap<NodeId, f64> {
    let snap = store.snapshot();
    by_id(&snap, pagerank_of(&snap, params))
}

pub(crate) fn pagerank_of(snap: &GraphSnapshot, params: &PageRankParams) -> Vec<f64> {
    let n = snap.len();
    if n == 0 {
        return Vec::new();
    }
    let inv_n = 1.0 / n as f64;
    let mut rank = vec![inv_n; n];
    let mut next = vec![0.0; n];
    for iteration in 0..params.max_iter {
        let dangling: f64 = (0..n)
            .filter(|&u| snap.out_degree(u) == 0)
            .map(|u| rank[u])
            .sum();
        let base = (1.0 - params.damping) * inv_n + params.damping * dangling * inv_n;
        next.iter_mut().for_each(|r| *r = base);
        for u in 0..n {
            let out = snap.out_degree(u);
            if out == 0 {
                continue;
            }
            let share = params.damping * rank[u] / out as f64;
            for &v in snap.out(u) {
                next[v] += share;
            }
        }
        let delta: f64 = rank
            .iter()
            .zip(next.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        std::mem::swap(&mut rank, &mut next);
        if delta < params.tol {
            trace!(iteration, delta, "pagerank converged");
            break;
        }
    }
    rank
}

/// Eigenvector centrality: the PageRank iteration shape without damping or
/// teleport, L2-normalized after each step, same convergence criterion.
pub fn eigenvector(store: &GraphStore, params: &PowerParams) -> HashMap<NodeId, f64> {
    let snap = store.snapshot();
    let n = snap.len();
    if n == 0 {
        return HashMap::new();
    }
    let mut x = vec![1.0 / (n as f64).sqrt(); n];
    let mut next = vec![0.0; n];
    for iteration in 0..params.max_iter {
        next.iter_mut().for_each(|v| *v = 0.0);
        for u in 0..n {
            for &v in snap.out(u) {
                next[v] += x[u];
            }
        }
        let norm = next.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            // No edges feed the iteration; all centralities are zero.
            return by_id(&snap, vec![0.0; n]);
        }
        next.iter_mut().for_each(|v| *v /= norm);
        let delta: f64 = x
            .iter()
            .zip(next.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        std::mem::swap(&mut x, &mut next);
        if delta < params.tol {
            trace!(iteration, delta, "eigenvector converged");
            break;
        }
    }
    by_id(&snap, x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GraphStore;

    #[test]
    fn star_concentrates_rank_in_center() {
        let store = GraphStore::new();
        let center = store.create_node(Default::default()).unwrap();
        let leaves: Vec<u64> = (0..4)
            .map(|_| store.create_node(Default::default()).unwrap())
            .collect();
        for &leaf in &leaves {
            store
                .create_edge(leaf, center, "points_at", Default::default())
                .unwrap();
        }

        let ranks = pagerank(&store, &PageRankParams::default());
        let center_rank = ranks[&center];
        for &leaf in &leaves {
            assert!(center_rank > ranks[&leaf]);
        }
        // Leaves are symmetric.
        let first = ranks[&leaves[0]];
        for &leaf in &leaves {
            assert!((ranks[&leaf] - first).abs() < 1e-4);
        }
        let total: f64 = ranks.values().sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(ranks.values().all(|r| (0.0..=1.0).contains(r)));
    }

    #[test]
    fn dangling_mass_is_redistributed() {
        let store = GraphStore::new();
        let a = store.create_node(Default::default()).unwrap();
        let b = store.create_node(Default::default()).unwrap();
        store.create_edge(a, b, "to", Default::default()).unwrap();

        let ranks = pagerank(&store, &PageRankParams::default());
        let total: f64 = ranks.values().sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(ranks[&b] > ranks[&a]);
    }

    #[test]
    fn eigenvector_empty_graph() {
        let store = GraphStore::new();
        assert!(eigenvector(&store, &PowerParams::default()).is_empty());

        store.create_node(Default::default()).unwrap();
        let scores = eigenvector(&store, &PowerParams::default());
        assert_eq!(scores.len(), 1);
        assert_eq!(scores.values().copied().next().unwrap(), 0.0);
    }
}
