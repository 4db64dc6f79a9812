//! Node create/read/update/delete paths.

use tracing::debug;

use crate::error::{Result, TrellisError};
use crate::model::{validate_props, Node, NodeId, PropMap};

use super::{merge_props, GraphStore, Mutation};

impl GraphStore {
    /// Creates a node with the given properties and returns its identity.
    ///
    /// Fails with `InvalidProperties` when any key or value violates the
    /// validation rules; on success the node, its empty adjacency lists,
    /// and its property-index entries become visible atomically.
    pub fn create_node(&self, properties: PropMap) -> Result<NodeId> {
        validate_props(&properties)?;
        let node = {
            let mut t = self.tables.write();
            let id = t.next_node_id;
            t.next_node_id += 1;
            for (key, value) in &properties {
                super::index_ops::index_property(&mut t, key, value, id);
            }
            t.out_adj.insert(id, Default::default());
            t.in_adj.insert(id, Default::default());
            let node = Node { id, properties };
            t.nodes.insert(id, node.clone());
            node
        };
        debug!(node = node.id, "created node");
        let id = node.id;
        self.notify(Mutation::NodeCreated(node));
        Ok(id)
    }

    /// Returns a copy of the node, or `NodeNotFound`.
    pub fn get_node(&self, id: NodeId) -> Result<Node> {
        self.tables
            .read()
            .nodes
            .get(&id)
            .cloned()
            .ok_or(TrellisError::NodeNotFound(id))
    }

    /// Whether the node exists.
    pub fn node_exists(&self, id: NodeId) -> bool {
        self.tables.read().nodes.contains_key(&id)
    }

    /// Merges `updates` into the node's property map, maintaining the
    /// property index for every changed key. Returns the updated node.
    pub fn update_node(&self, id: NodeId, updates: PropMap) -> Result<Node> {
        validate_props(&updates)?;
        let (node, changed) = {
            let mut t = self.tables.write();
            let mut node = t
                .nodes
                .get(&id)
                .cloned()
                .ok_or(TrellisError::NodeNotFound(id))?;
            let changed = merge_props(&mut node.properties, updates);
            for (key, old) in &changed {
                if let Some(old_value) = old {
                    super::index_ops::unindex_property(&mut t, key, old_value, id);
                }
            }
            for (key, _) in &changed {
                let value = node.properties[key].clone();
                super::index_ops::index_property(&mut t, key, &value, id);
            }
            t.nodes.insert(id, node.clone());
            (node, changed)
        };
        debug!(node = id, keys = changed.len(), "updated node");
        self.notify(Mutation::NodeUpdated(node.clone()));
        Ok(node)
    }

    /// Deletes the node, all incident edges, and every derived index entry.
    /// Idempotent: deleting an absent node returns `Ok(false)`.
    pub fn delete_node(&self, id: NodeId) -> Result<bool> {
        let removed_edges = {
            let mut t = self.tables.write();
            let Some(node) = t.nodes.remove(&id) else {
                return Ok(false);
            };
            for (key, value) in &node.properties {
                super::index_ops::unindex_property(&mut t, key, value, id);
            }

            let mut incident: Vec<u64> = Vec::new();
            if let Some(out) = t.out_adj.remove(&id) {
                incident.extend(out);
            }
            if let Some(inn) = t.in_adj.remove(&id) {
                incident.extend(inn);
            }
            let mut removed = Vec::new();
            for edge_id in incident {
                // A self-loop appears in both lists; the second removal is a no-op.
                if super::edge_ops::remove_edge_entry(&mut t, edge_id) {
                    removed.push(edge_id);
                }
            }
            removed
        };
        debug!(node = id, "deleted node");
        for edge_id in removed_edges {
            self.notify(Mutation::EdgeDeleted(edge_id));
        }
        self.notify(Mutation::NodeDeleted(id));
        Ok(true)
    }
}
