//! K-core decomposition by bucketed minimum-degree removal.

use std::collections::HashMap;

use crate::model::NodeId;
use crate::store::GraphStore;

/// Core number of every node: nodes are removed in increasing current
/// degree, each recording its degree at removal time (clamped to never
/// regress). Linear in nodes plus edges via degree buckets.
pub fn k_core(store: &GraphStore) -> HashMap<NodeId, u32> {
    let snap = store.snapshot();
    let n = snap.len();
    if n == 0 {
        return HashMap::new();
    }

    let mut degree: Vec<usize> = (0..n).map(|u| snap.und(u).len()).collect();
    let max_degree = degree.iter().copied().max().unwrap_or(0);

    // Bucket-sorted order: vert holds slots grouped by current degree.
    let mut bins = vec![0usize; max_degree + 2];
    for &d in &degree {
        bins[d] += 1;
    }
    let mut start = 0usize;
    for bin in bins.iter_mut() {
        let count = *bin;
        *bin = start;
        start += count;
    }
    let mut vert = vec![0usize; n];
    let mut pos = vec![0usize; n];
    {
        let mut next = bins.clone();
        for u in 0..n {
            pos[u] = next[degree[u]];
            vert[pos[u]] = u;
            next[degree[u]] += 1;
        }
    }

    let mut core = vec![0u32; n];
    let mut current = 0usize;
    for i in 0..n {
        let v = vert[i];
        current = current.max(degree[v]);
        core[v] = current as u32;
        for &u in snap.und(v) {
            if degree[u] > degree[v] {
                // Move u one bucket down: swap it with the first entry of
                // its current bucket, then shift the bucket boundary.
                let du = degree[u];
                let pu = pos[u];
                let pw = bins[du];
                let w = vert[pw];
                if u != w {
                    vert.swap(pu, pw);
                    pos[u] = pw;
                    pos[w] = pu;
                }
                bins[du] += 1;
                degree[u] -= 1;
            }
        }
    }

    (0..n).map(|slot| (snap.id(slot), core[slot])).collect()
}
