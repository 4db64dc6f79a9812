//! Path-based centralities: Brandes betweenness and closeness.

use std::collections::{HashMap, VecDeque};

use crate::error::{Result, TrellisError};
use crate::model::NodeId;
use crate::store::{GraphSnapshot, GraphStore};

use super::{bfs_distances, by_id};

/// Betweenness centrality over directed shortest paths (Brandes).
///
/// For every source, a BFS builds the layered predecessor DAG and shortest
/// path counts; the backward pass accumulates partial dependencies onto
/// each non-source node.
pub fn betweenness(store: &GraphStore) -> HashMap<NodeId, f64> {
    let snap = store.snapshot();
    let n = snap.len();
    let mut centrality = vec![0.0; n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];
    let mut delta = vec![0.0f64; n];
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];

    for s in 0..n {
        sigma.iter_mut().for_each(|x| *x = 0.0);
        dist.iter_mut().for_each(|x| *x = -1);
        delta.iter_mut().for_each(|x| *x = 0.0);
        preds.iter_mut().for_each(Vec::clear);

        sigma[s] = 1.0;
        dist[s] = 0;
        let mut stack = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(s);
        while let Some(u) = queue.pop_front() {
            stack.push(u);
            for &v in snap.out(u) {
                if dist[v] < 0 {
                    dist[v] = dist[u] + 1;
                    queue.push_back(v);
                }
                if dist[v] == dist[u] + 1 {
                    sigma[v] += sigma[u];
                    preds[v].push(u);
                }
            }
        }
        while let Some(w) = stack.pop() {
            for &u in &preds[w] {
                delta[u] += sigma[u] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }
    by_id(&snap, centrality)
}

fn closeness_of(snap: &GraphSnapshot, slot: usize) -> f64 {
    let dist = bfs_distances(snap.len(), slot, |u| snap.out(u));
    let mut reachable = 0usize;
    let mut total = 0usize;
    for d in dist {
        if d != usize::MAX {
            reachable += 1;
            total += d;
        }
    }
    if total == 0 {
        // Isolated node (or no outgoing reach at all).
        return 0.0;
    }
    (reachable - 1) as f64 / total as f64
}

/// Closeness centrality of one node: `(R - 1) / Σ d(v, u)` over the
/// reachable set `R` (which includes `v`); 0 for isolated nodes.
pub fn closeness(store: &GraphStore, node: NodeId) -> Result<f64> {
    let snap = store.snapshot();
    let slot = snap.slot(node).ok_or(TrellisError::NodeNotFound(node))?;
    Ok(closeness_of(&snap, slot))
}

/// Closeness centrality of every node.
pub fn closeness_all(store: &GraphStore) -> HashMap<NodeId, f64> {
    let snap = store.snapshot();
    let scores = (0..snap.len()).map(|s| closeness_of(&snap, s)).collect();
    by_id(&snap, scores)
}
