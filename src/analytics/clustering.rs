//! Triangle counting and clustering coefficients (undirected semantics).

use std::collections::HashMap;

use rustc_hash::FxHashSet;

use crate::error::{Result, TrellisError};
use crate::model::NodeId;
use crate::store::{GraphSnapshot, GraphStore};

/// Per-node triangle participation counts plus the distinct triangle total
/// (`Σ per-node / 3`).
pub fn triangle_counts(store: &GraphStore) -> (HashMap<NodeId, usize>, usize) {
    let snap = store.snapshot();
    let (per_slot, total) = triangles_of(&snap);
    let per_node = per_slot
        .into_iter()
        .enumerate()
        .map(|(slot, count)| (snap.id(slot), count))
        .collect();
    (per_node, total)
}

pub(crate) fn triangles_of(snap: &GraphSnapshot) -> (Vec<usize>, usize) {
    let n = snap.len();
    let neighbor_sets: Vec<FxHashSet<usize>> = (0..n)
        .map(|u| snap.und(u).iter().copied().collect())
        .collect();
    let mut per_slot = vec![0usize; n];
    for v in 0..n {
        let neighbors = snap.und(v);
        for (i, &u) in neighbors.iter().enumerate() {
            for &w in &neighbors[i + 1..] {
                if neighbor_sets[u].contains(&w) {
                    per_slot[v] += 1;
                }
            }
        }
    }
    let total = per_slot.iter().sum::<usize>() / 3;
    (per_slot, total)
}

/// Global clustering coefficient: `3 * triangles / connected triples`.
/// Zero when the graph has no connected triple.
pub fn global_clustering(store: &GraphStore) -> f64 {
    global_of(&store.snapshot())
}

pub(crate) fn global_of(snap: &GraphSnapshot) -> f64 {
    let (_, triangles) = triangles_of(snap);
    let triples: usize = (0..snap.len())
        .map(|u| {
            let d = snap.und(u).len();
            d * d.saturating_sub(1) / 2
        })
        .sum();
    if triples == 0 {
        return 0.0;
    }
    3.0 * triangles as f64 / triples as f64
}

fn local_of(snap: &GraphSnapshot, slot: usize, neighbor_sets: &[FxHashSet<usize>]) -> f64 {
    let neighbors = snap.und(slot);
    let k = neighbors.len();
    if k < 2 {
        return 0.0;
    }
    let mut links = 0usize;
    for (i, &u) in neighbors.iter().enumerate() {
        for &w in &neighbors[i + 1..] {
            if neighbor_sets[u].contains(&w) {
                links += 1;
            }
        }
    }
    2.0 * links as f64 / (k * (k - 1)) as f64
}

/// Local clustering coefficient of one node:
/// `2 * E(N(v)) / (|N(v)| * (|N(v)| - 1))`, zero below two neighbors.
pub fn local_clustering(store: &GraphStore, node: NodeId) -> Result<f64> {
    let snap = store.snapshot();
    let slot = snap.slot(node).ok_or(TrellisError::NodeNotFound(node))?;
    let neighbor_sets: Vec<FxHashSet<usize>> = (0..snap.len())
        .map(|u| snap.und(u).iter().copied().collect())
        .collect();
    Ok(local_of(&snap, slot, &neighbor_sets))
}

/// Local clustering coefficient of every node.
pub fn local_clustering_all(store: &GraphStore) -> HashMap<NodeId, f64> {
    let snap = store.snapshot();
    let neighbor_sets: Vec<FxHashSet<usize>> = (0..snap.len())
        .map(|u| snap.und(u).iter().copied().collect())
        .collect();
    (0..snap.len())
        .map(|slot| (snap.id(slot), local_of(&snap, slot, &neighbor_sets)))
        .collect()
}
