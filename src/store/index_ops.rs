//! Secondary index lookups and maintenance.

use crate::error::Result;
use crate::model::{Edge, Node, NodeId, PropValue};
use crate::traverse::Direction;

use super::{GraphStore, PropIndexKey, Tables};

impl GraphStore {
    /// Nodes carrying the exact `(key, value)` pair, ordered by identity.
    pub fn find_nodes_by_property(&self, key: &str, value: &PropValue) -> Vec<Node> {
        let t = self.tables.read();
        let Some(ids) = t.prop_index.get(&PropIndexKey::new(key, value)) else {
            return Vec::new();
        };
        let mut nodes: Vec<Node> = ids.iter().map(|id| t.nodes[id].clone()).collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    /// Edges carrying the label, ordered by identity.
    pub fn find_edges_by_label(&self, label: &str) -> Vec<Edge> {
        let t = self.tables.read();
        let Some(ids) = t.label_index.get(label) else {
            return Vec::new();
        };
        let mut edges: Vec<Edge> = ids.iter().map(|id| t.edges[id].clone()).collect();
        edges.sort_by_key(|e| e.id);
        edges
    }

    /// Distinct neighbor identities of `id` in the given direction, in
    /// adjacency (edge-creation) order.
    pub fn neighbors(&self, id: NodeId, direction: Direction) -> Result<Vec<NodeId>> {
        let t = self.tables.read();
        if !t.nodes.contains_key(&id) {
            return Err(crate::error::TrellisError::NodeNotFound(id));
        }
        let mut seen = rustc_hash::FxHashSet::default();
        let mut out = Vec::new();
        let mut push = |n: NodeId| {
            if seen.insert(n) {
                out.push(n);
            }
        };
        if matches!(direction, Direction::Out | Direction::Both) {
            if let Some(adj) = t.out_adj.get(&id) {
                for eid in adj {
                    push(t.edges[eid].to);
                }
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            if let Some(adj) = t.in_adj.get(&id) {
                for eid in adj {
                    push(t.edges[eid].from);
                }
            }
        }
        Ok(out)
    }
}

/// Adds `(key, value) → node` to the property index.
pub(crate) fn index_property(t: &mut Tables, key: &str, value: &PropValue, node: NodeId) {
    t.prop_index
        .entry(PropIndexKey::new(key, value))
        .or_default()
        .insert(node);
}

/// Removes `(key, value) → node` from the property index, dropping the
/// posting set once empty.
pub(crate) fn unindex_property(t: &mut Tables, key: &str, value: &PropValue, node: NodeId) {
    let index_key = PropIndexKey::new(key, value);
    if let Some(set) = t.prop_index.get_mut(&index_key) {
        set.remove(&node);
        if set.is_empty() {
            t.prop_index.remove(&index_key);
        }
    }
}
