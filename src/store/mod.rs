//! In-memory graph storage: node/edge tables, adjacency lists, and the
//! secondary property and label indexes.
//!
//! All mutators funnel through the table write lock, which is the single
//! serialization domain of the store: an entire mutation, including index
//! maintenance, commits before any reader can observe its first effect.
//! Readers take the read lock and never block each other.

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::model::{Edge, EdgeId, Node, NodeId, PropMap, PropValue};

mod edge_ops;
mod index_ops;
mod node_ops;
mod snapshot;

pub use snapshot::GraphSnapshot;

/// Adjacency list cell. Most nodes have a handful of incident edges.
pub(crate) type AdjList = SmallVec<[EdgeId; 4]>;

/// Key of the property index: `(property key, canonical value bytes)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PropIndexKey {
    pub key: String,
    pub value: Vec<u8>,
}

impl PropIndexKey {
    pub fn new(key: &str, value: &PropValue) -> Self {
        let mut bytes = Vec::new();
        value.index_bytes(&mut bytes);
        Self {
            key: key.to_owned(),
            value: bytes,
        }
    }
}

/// Mutable tables guarded by the store's write lock.
#[derive(Default)]
pub(crate) struct Tables {
    pub nodes: FxHashMap<NodeId, Node>,
    pub edges: FxHashMap<EdgeId, Edge>,
    /// Outgoing edge ids per node, in edge-creation order. The iteration
    /// order of these lists is a contract relied on by traversal tie-breaks.
    pub out_adj: FxHashMap<NodeId, AdjList>,
    /// Incoming edge ids per node, in edge-creation order.
    pub in_adj: FxHashMap<NodeId, AdjList>,
    pub prop_index: FxHashMap<PropIndexKey, FxHashSet<NodeId>>,
    pub label_index: FxHashMap<String, FxHashSet<EdgeId>>,
    /// Next identities. Monotonic within a process lifetime; never reused.
    pub next_node_id: NodeId,
    pub next_edge_id: EdgeId,
}

impl Tables {
    fn new() -> Self {
        Self {
            next_node_id: 1,
            next_edge_id: 1,
            ..Default::default()
        }
    }
}

/// Aggregate counters derived from the tables.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Distinct `(key, value)` pairs currently indexed.
    pub property_entries: usize,
    /// Distinct edge labels currently indexed.
    pub labels: usize,
    pub avg_out_degree: f64,
}

/// Mutation event emitted after a write commits, carrying the affected
/// entity so observers never have to re-read the tables.
#[derive(Debug, Clone)]
pub enum Mutation {
    NodeCreated(Node),
    NodeUpdated(Node),
    NodeDeleted(NodeId),
    EdgeCreated(Edge),
    EdgeUpdated(Edge),
    EdgeDeleted(EdgeId),
}

/// Observer receiving committed mutations; the replication layer hooks in
/// here to emit replication intents.
pub type MutationObserver = std::sync::Arc<dyn Fn(&Mutation) + Send + Sync>;

/// The embedded graph store.
///
/// Cheap to share behind an `Arc`; all operations take `&self`.
pub struct GraphStore {
    pub(crate) tables: RwLock<Tables>,
    observer: RwLock<Option<MutationObserver>>,
}

impl GraphStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
            observer: RwLock::new(None),
        }
    }

    /// Installs the mutation observer. Only one observer is supported;
    /// installing replaces the previous one.
    pub fn set_observer(&self, observer: MutationObserver) {
        *self.observer.write() = Some(observer);
    }

    /// Fires after the write lock is released, so observers may read the
    /// store freely.
    pub(crate) fn notify(&self, mutation: Mutation) {
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer(&mutation);
        }
    }

    /// Aggregate counters for the current table state.
    pub fn stats(&self) -> GraphStats {
        let t = self.tables.read();
        let total_nodes = t.nodes.len();
        let total_edges = t.edges.len();
        let avg_out_degree = if total_nodes == 0 {
            0.0
        } else {
            total_edges as f64 / total_nodes as f64
        };
        GraphStats {
            total_nodes,
            total_edges,
            property_entries: t.prop_index.len(),
            labels: t.label_index.len(),
            avg_out_degree,
        }
    }

    /// All nodes, ordered by identity.
    pub fn list_nodes(&self) -> Vec<Node> {
        let t = self.tables.read();
        let mut nodes: Vec<Node> = t.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    /// All edges, ordered by identity.
    pub fn list_edges(&self) -> Vec<Edge> {
        let t = self.tables.read();
        let mut edges: Vec<Edge> = t.edges.values().cloned().collect();
        edges.sort_by_key(|e| e.id);
        edges
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Merges `updates` into `target`, returning the keys whose value changed
/// or was introduced. Shared by node and edge update paths.
pub(crate) fn merge_props(target: &mut PropMap, updates: PropMap) -> Vec<(String, Option<PropValue>)> {
    let mut changed = Vec::new();
    for (key, value) in updates {
        let old = target.insert(key.clone(), value);
        changed.push((key, old));
    }
    changed
}
