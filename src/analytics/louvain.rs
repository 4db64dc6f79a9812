//! Louvain community detection (two-phase modularity optimization).

use std::collections::HashMap;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::model::NodeId;
use crate::store::GraphStore;

/// Weighted undirected multigraph with self-loops; `adj[u][u]` stores the
/// self-loop weight, which contributes twice to the node degree.
struct WeightedGraph {
    adj: Vec<FxHashMap<usize, f64>>,
    degree: Vec<f64>,
    total_weight: f64,
}

impl WeightedGraph {
    fn from_store(store: &GraphStore) -> Self {
        let snap = store.snapshot();
        let n = snap.len();
        let mut adj: Vec<FxHashMap<usize, f64>> = vec![FxHashMap::default(); n];
        for u in 0..n {
            for &v in snap.out(u) {
                if u == v {
                    *adj[u].entry(u).or_insert(0.0) += 1.0;
                } else {
                    *adj[u].entry(v).or_insert(0.0) += 1.0;
                    *adj[v].entry(u).or_insert(0.0) += 1.0;
                }
            }
        }
        Self::finish(adj)
    }

    fn finish(adj: Vec<FxHashMap<usize, f64>>) -> Self {
        let n = adj.len();
        let mut degree = vec![0.0; n];
        let mut total = 0.0;
        for u in 0..n {
            for (&v, &w) in &adj[u] {
                if v == u {
                    degree[u] += 2.0 * w;
                    total += w;
                } else {
                    degree[u] += w;
                    if u < v {
                        total += w;
                    }
                }
            }
        }
        Self {
            adj,
            degree,
            total_weight: total,
        }
    }

    fn len(&self) -> usize {
        self.adj.len()
    }
}

/// One pass of local moves. Returns `(community per node, any_moved)`.
///
/// Each node in ascending order leaves its community and joins the
/// candidate community with the greatest positive modularity gain; equal
/// gains resolve to the lowest community identifier.
fn one_level(graph: &WeightedGraph) -> (Vec<usize>, bool) {
    let n = graph.len();
    let two_m = 2.0 * graph.total_weight;
    let mut community: Vec<usize> = (0..n).collect();
    let mut sigma_tot: Vec<f64> = graph.degree.clone();
    let mut any_moved = false;

    if two_m == 0.0 {
        return (community, false);
    }

    loop {
        let mut moved_this_round = false;
        for u in 0..n {
            let old = community[u];
            sigma_tot[old] -= graph.degree[u];

            // Weight from u into each adjacent community.
            let mut into: FxHashMap<usize, f64> = FxHashMap::default();
            into.insert(old, 0.0);
            for (&v, &w) in &graph.adj[u] {
                if v != u {
                    *into.entry(community[v]).or_insert(0.0) += w;
                }
            }

            let gain = |c: usize, k_in: f64| k_in - sigma_tot[c] * graph.degree[u] / two_m;
            let mut best = old;
            let mut best_gain = gain(old, into[&old]);
            let mut candidates: Vec<(usize, f64)> =
                into.iter().map(|(&c, &w)| (c, w)).collect();
            candidates.sort_unstable_by_key(|(c, _)| *c);
            for (c, k_in) in candidates {
                let g = gain(c, k_in);
                if g > best_gain + 1e-12 {
                    best = c;
                    best_gain = g;
                } else if (g - best_gain).abs() <= 1e-12 && c < best {
                    best = c;
                }
            }

            sigma_tot[best] += graph.degree[u];
            community[u] = best;
            if best != old {
                moved_this_round = true;
                any_moved = true;
            }
        }
        if !moved_this_round {
            break;
        }
    }
    (community, any_moved)
}

/// Contracts communities into super-nodes, carrying aggregated edge weights
/// and intra-community self-loops. Returns the contracted graph and the
/// compact relabeling applied to `community`.
fn aggregate(graph: &WeightedGraph, community: &[usize]) -> (WeightedGraph, Vec<usize>) {
    let mut relabel: FxHashMap<usize, usize> = FxHashMap::default();
    let mut compact = vec![0usize; community.len()];
    let mut sorted: Vec<usize> = community.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    for (next, c) in sorted.into_iter().enumerate() {
        relabel.insert(c, next);
    }
    for (u, &c) in community.iter().enumerate() {
        compact[u] = relabel[&c];
    }

    let m = relabel.len();
    let mut adj: Vec<FxHashMap<usize, f64>> = vec![FxHashMap::default(); m];
    for u in 0..graph.len() {
        for (&v, &w) in &graph.adj[u] {
            let cu = compact[u];
            let cv = compact[v];
            if cu == cv {
                // Count each undirected intra-pair once; keep old self-loops.
                if u <= v {
                    *adj[cu].entry(cu).or_insert(0.0) += w;
                }
            } else {
                *adj[cu].entry(cv).or_insert(0.0) += w;
            }
        }
    }
    (WeightedGraph::finish(adj), compact)
}

/// Louvain communities. Returns `node → community id`, where a community's
/// identifier is the smallest node identity it contains.
pub fn louvain(store: &GraphStore) -> HashMap<NodeId, u64> {
    let snap = store.snapshot();
    let ids = snap.ids().to_vec();
    let n = ids.len();
    if n == 0 {
        return HashMap::new();
    }

    let mut graph = WeightedGraph::from_store(store);
    // assignment[i] = current super-node of original slot i.
    let mut assignment: Vec<usize> = (0..n).collect();
    let mut level = 0usize;
    loop {
        let (community, moved) = one_level(&graph);
        if !moved {
            break;
        }
        let (contracted, compact) = aggregate(&graph, &community);
        for slot in assignment.iter_mut() {
            *slot = compact[*slot];
        }
        trace!(level, communities = contracted.len(), "louvain level complete");
        if contracted.len() == graph.len() {
            break;
        }
        graph = contracted;
        level += 1;
    }

    // Name each community after its smallest member identity.
    let mut label: FxHashMap<usize, u64> = FxHashMap::default();
    for (slot, &community) in assignment.iter().enumerate() {
        let id = ids[slot];
        label
            .entry(community)
            .and_modify(|min| *min = (*min).min(id))
            .or_insert(id);
    }
    assignment
        .iter()
        .enumerate()
        .map(|(slot, community)| (ids[slot], label[community]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GraphStore;

    #[test]
    fn two_cliques_with_a_bridge() {
        let store = GraphStore::new();
        let left: Vec<u64> = (0..4)
            .map(|_| store.create_node(Default::default()).unwrap())
            .collect();
        let right: Vec<u64> = (0..4)
            .map(|_| store.create_node(Default::default()).unwrap())
            .collect();
        for group in [&left, &right] {
            for i in 0..group.len() {
                for j in (i + 1)..group.len() {
                    store
                        .create_edge(group[i], group[j], "x", Default::default())
                        .unwrap();
                }
            }
        }
        store
            .create_edge(left[0], right[0], "bridge", Default::default())
            .unwrap();

        let communities = louvain(&store);
        let left_ids: Vec<u64> = left.iter().map(|id| communities[id]).collect();
        let right_ids: Vec<u64> = right.iter().map(|id| communities[id]).collect();
        assert!(left_ids.iter().all(|&c| c == left_ids[0]));
        assert!(right_ids.iter().all(|&c| c == right_ids[0]));
        assert_ne!(left_ids[0], right_ids[0]);
        // Communities are named after their smallest member.
        assert_eq!(left_ids[0], left[0]);
        assert_eq!(right_ids[0], right[0]);
    }

    #[test]
    fn singleton_nodes_stay_alone() {
        let store = GraphStore::new();
        let a = store.create_node(Default::default()).unwrap();
        let b = store.create_node(Default::default()).unwrap();
        let communities = louvain(&store);
        assert_eq!(communities[&a], a);
        assert_eq!(communities[&b], b);
    }
}
