//! Connected components via union-find.

use crate::model::NodeId;
use crate::store::{GraphSnapshot, GraphStore};

/// Union-find with union-by-rank and path compression over dense slots.
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Connected components treating edges as undirected, sorted descending by
/// size; members ascend by identity, and equal-size components order by
/// their smallest member.
pub fn connected_components(store: &GraphStore) -> Vec<Vec<NodeId>> {
    components_of(&store.snapshot())
}

pub(crate) fn components_of(snap: &GraphSnapshot) -> Vec<Vec<NodeId>> {
    let n = snap.len();
    let mut uf = UnionFind::new(n);
    for u in 0..n {
        for &v in snap.und(u) {
            uf.union(u, v);
        }
    }
    let mut groups: rustc_hash::FxHashMap<usize, Vec<NodeId>> = rustc_hash::FxHashMap::default();
    for slot in 0..n {
        let root = uf.find(slot);
        groups.entry(root).or_default().push(snap.id(slot));
    }
    let mut components: Vec<Vec<NodeId>> = groups.into_values().collect();
    for component in &mut components {
        component.sort_unstable();
    }
    components.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
    components
}
