//! Whole-graph statistics: density, diameter, degree distribution.

use crate::store::{GraphSnapshot, GraphStore};

use super::bfs_distances;

/// Degree distribution summary over per-node total degree (in + out).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DegreeStats {
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; 0 below two nodes.
    pub std_dev: f64,
}

/// Directed graph density: `|E| / (|V| * (|V| - 1))`, zero below two nodes.
pub fn density(store: &GraphStore) -> f64 {
    density_of(&store.snapshot())
}

pub(crate) fn density_of(snap: &GraphSnapshot) -> f64 {
    let n = snap.len();
    if n < 2 {
        return 0.0;
    }
    snap.edge_count() as f64 / (n * (n - 1)) as f64
}

/// Maximum shortest-path length over all connected pairs, treating edges
/// as undirected. Zero for empty or edgeless graphs.
pub fn diameter(store: &GraphStore) -> u32 {
    let snap = store.snapshot();
    let n = snap.len();
    let mut max_dist = 0usize;
    for source in 0..n {
        for d in bfs_distances(n, source, |u| snap.und(u)) {
            if d != usize::MAX {
                max_dist = max_dist.max(d);
            }
        }
    }
    max_dist as u32
}

/// Degree distribution of the current graph.
pub fn degree_distribution(store: &GraphStore) -> DegreeStats {
    degrees_of(&store.snapshot())
}

pub(crate) fn degrees_of(snap: &GraphSnapshot) -> DegreeStats {
    let n = snap.len();
    if n == 0 {
        return DegreeStats {
            min: 0,
            max: 0,
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
        };
    }
    let mut degrees: Vec<usize> = (0..n)
        .map(|u| snap.out_degree(u) + snap.in_degree(u))
        .collect();
    degrees.sort_unstable();

    let sum: usize = degrees.iter().sum();
    let mean = sum as f64 / n as f64;
    let median = if n % 2 == 1 {
        degrees[n / 2] as f64
    } else {
        (degrees[n / 2 - 1] + degrees[n / 2]) as f64 / 2.0
    };
    let std_dev = if n < 2 {
        0.0
    } else {
        let variance = degrees
            .iter()
            .map(|&d| {
                let diff = d as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / (n - 1) as f64;
        variance.sqrt()
    };

    DegreeStats {
        min: degrees[0],
        max: degrees[n - 1],
        mean,
        median,
        std_dev,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GraphStore;

    #[test]
    fn density_bounds() {
        let store = GraphStore::new();
        assert_eq!(density(&store), 0.0);
        let a = store.create_node(Default::default()).unwrap();
        assert_eq!(density(&store), 0.0);
        let b = store.create_node(Default::default()).unwrap();
        store.create_edge(a, b, "x", Default::default()).unwrap();
        assert_eq!(density(&store), 0.5);
    }

    #[test]
    fn diameter_of_a_chain() {
        let store = GraphStore::new();
        let ids: Vec<u64> = (0..4)
            .map(|_| store.create_node(Default::default()).unwrap())
            .collect();
        for w in ids.windows(2) {
            store.create_edge(w[0], w[1], "next", Default::default()).unwrap();
        }
        assert_eq!(diameter(&store), 3);
    }

    #[test]
    fn degree_summary() {
        let store = GraphStore::new();
        let a = store.create_node(Default::default()).unwrap();
        let b = store.create_node(Default::default()).unwrap();
        let c = store.create_node(Default::default()).unwrap();
        store.create_edge(a, b, "x", Default::default()).unwrap();
        store.create_edge(a, c, "x", Default::default()).unwrap();

        let stats = degree_distribution(&store);
        assert_eq!(stats.min, 1);
        assert_eq!(stats.max, 2);
        assert!((stats.mean - 4.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.median, 1.0);
        assert!(stats.std_dev > 0.0);
    }
}
