//! Immutable compact snapshot of the graph topology.
//!
//! Analytics kernels take a snapshot at invocation time and then release
//! the store, so long-running computations never hold the read lock. Node
//! identities are mapped to dense slots for cache-friendly iteration.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::model::NodeId;

use super::GraphStore;

/// Dense read-only view of nodes and adjacency taken at a point in time.
pub struct GraphSnapshot {
    ids: Vec<NodeId>,
    slots: FxHashMap<NodeId, usize>,
    out: Vec<Vec<usize>>,
    inn: Vec<Vec<usize>>,
    /// Deduplicated undirected neighbor lists, ascending by slot.
    und: Vec<Vec<usize>>,
    edge_count: usize,
}

impl GraphSnapshot {
    /// Number of nodes captured.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the snapshot holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of directed edges captured.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Node identities, ascending; slot `i` corresponds to `ids()[i]`.
    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    /// Identity of the node at `slot`.
    pub fn id(&self, slot: usize) -> NodeId {
        self.ids[slot]
    }

    /// Slot of a node identity, if it was captured.
    pub fn slot(&self, id: NodeId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    /// Out-neighbor slots (one entry per parallel edge).
    pub fn out(&self, slot: usize) -> &[usize] {
        &self.out[slot]
    }

    /// In-neighbor slots (one entry per parallel edge).
    pub fn inn(&self, slot: usize) -> &[usize] {
        &self.inn[slot]
    }

    /// Distinct undirected neighbor slots, ascending. Self-loops excluded.
    pub fn und(&self, slot: usize) -> &[usize] {
        &self.und[slot]
    }

    pub fn out_degree(&self, slot: usize) -> usize {
        self.out[slot].len()
    }

    pub fn in_degree(&self, slot: usize) -> usize {
        self.inn[slot].len()
    }
}

impl GraphStore {
    /// Captures the current topology under a single read lock.
    pub fn snapshot(&self) -> GraphSnapshot {
        let t = self.tables.read();
        let mut ids: Vec<NodeId> = t.nodes.keys().copied().collect();
        ids.sort_unstable();
        let slots: FxHashMap<NodeId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let n = ids.len();
        let mut out = vec![Vec::new(); n];
        let mut inn = vec![Vec::new(); n];
        let mut und_sets: Vec<FxHashSet<usize>> = vec![FxHashSet::default(); n];
        for edge in t.edges.values() {
            let from = slots[&edge.from];
            let to = slots[&edge.to];
            out[from].push(to);
            inn[to].push(from);
            if from != to {
                und_sets[from].insert(to);
                und_sets[to].insert(from);
            }
        }
        // Adjacency iteration inside kernels must be deterministic.
        for list in out.iter_mut().chain(inn.iter_mut()) {
            list.sort_unstable();
        }
        let und = und_sets
            .into_iter()
            .map(|set| {
                let mut list: Vec<usize> = set.into_iter().collect();
                list.sort_unstable();
                list
            })
            .collect();

        GraphSnapshot {
            ids,
            slots,
            out,
            inn,
            und,
            edge_count: t.edges.len(),
        }
    }
}
