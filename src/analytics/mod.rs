//! Graph-analytics kernels.
//!
//! Every kernel captures a [`GraphSnapshot`](crate::store::GraphSnapshot)
//! at invocation time and computes against it without touching the store
//! again, so mutators proceed concurrently. All returned scores are finite
//! 64-bit floats.
//!
//! Directed semantics: PageRank, eigenvector centrality, betweenness, and
//! closeness follow edge direction. Components, clustering, triangles,
//! Louvain, k-core, and diameter treat edges as undirected.

use std::collections::HashMap;

use crate::model::NodeId;
use crate::store::{GraphSnapshot, GraphStore};

mod centrality;
mod clustering;
mod components;
mod kcore;
mod louvain;
mod pagerank;
mod stats;

pub use centrality::{betweenness, closeness, closeness_all};
pub use clustering::{global_clustering, local_clustering, local_clustering_all, triangle_counts};
pub use components::connected_components;
pub use kcore::k_core;
pub use louvain::louvain;
pub use pagerank::{eigenvector, pagerank, PageRankParams, PowerParams};
pub use stats::{degree_distribution, density, diameter, DegreeStats};

/// One-call report aggregating the cheap kernels; backs `analytics summary`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
    pub density: f64,
    pub components: usize,
    pub largest_component: usize,
    pub global_clustering: f64,
    pub triangles: usize,
    pub degrees: DegreeStats,
}

/// Computes the aggregate summary report from one snapshot.
pub fn summary(store: &GraphStore) -> GraphSummary {
    let snap = store.snapshot();
    let comps = components::components_of(&snap);
    let (_, triangles) = clustering::triangles_of(&snap);
    GraphSummary {
        nodes: snap.len(),
        edges: snap.edge_count(),
        density: stats::density_of(&snap),
        components: comps.len(),
        largest_component: comps.first().map(|c| c.len()).unwrap_or(0),
        global_clustering: clustering::global_of(&snap),
        triangles,
        degrees: stats::degrees_of(&snap),
    }
}

/// Maps per-slot scores back to node identities.
fn by_id(snap: &GraphSnapshot, scores: Vec<f64>) -> HashMap<NodeId, f64> {
    scores
        .into_iter()
        .enumerate()
        .map(|(slot, score)| (snap.id(slot), score))
        .collect()
}

/// BFS distances from `source` over the given neighbor accessor. `usize::MAX`
/// marks unreachable slots.
fn bfs_distances<'a, F>(n: usize, source: usize, neighbors: F) -> Vec<usize>
where
    F: Fn(usize) -> &'a [usize],
{
    let mut dist = vec![usize::MAX; n];
    dist[source] = 0;
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(source);
    while let Some(u) = queue.pop_front() {
        for &v in neighbors(u) {
            if dist[v] == usize::MAX {
                dist[v] = dist[u] + 1;
                queue.push_back(v);
            }
        }
    }
    dist
}
