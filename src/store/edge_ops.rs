//! Edge create/read/update/delete paths and adjacency maintenance.

use tracing::debug;

use crate::error::{Result, TrellisError};
use crate::model::{validate_label, validate_props, Edge, EdgeId, NodeId, PropMap};

use super::{merge_props, GraphStore, Mutation, Tables};

impl GraphStore {
    /// Creates a directed labeled edge and returns its identity.
    ///
    /// Fails with `NodeNotFound` when either endpoint is absent, and with
    /// `InvalidLabel` / `InvalidProperties` on validation violations. On
    /// success the edge, both adjacency entries, and the label-index entry
    /// become visible atomically.
    pub fn create_edge(
        &self,
        from: NodeId,
        to: NodeId,
        label: &str,
        properties: PropMap,
    ) -> Result<EdgeId> {
        validate_label(label)?;
        validate_props(&properties)?;
        let mut t = self.tables.write();
        if !t.nodes.contains_key(&from) {
            return Err(TrellisError::NodeNotFound(from));
        }
        if !t.nodes.contains_key(&to) {
            return Err(TrellisError::NodeNotFound(to));
        }
        let id = t.next_edge_id;
        t.next_edge_id += 1;
        t.out_adj.entry(from).or_default().push(id);
        t.in_adj.entry(to).or_default().push(id);
        t.label_index
            .entry(label.to_owned())
            .or_default()
            .insert(id);
        let edge = Edge {
            id,
            from,
            to,
            label: label.to_owned(),
            properties,
        };
        t.edges.insert(id, edge.clone());
        drop(t);
        debug!(edge = id, from, to, label, "created edge");
        self.notify(Mutation::EdgeCreated(edge));
        Ok(id)
    }

    /// Returns a copy of the edge, or `EdgeNotFound`.
    pub fn get_edge(&self, id: EdgeId) -> Result<Edge> {
        self.tables
            .read()
            .edges
            .get(&id)
            .cloned()
            .ok_or(TrellisError::EdgeNotFound(id))
    }

    /// Merges `updates` into the edge's property map. Edge properties are
    /// not indexed, so no index maintenance happens here.
    pub fn update_edge(&self, id: EdgeId, updates: PropMap) -> Result<Edge> {
        validate_props(&updates)?;
        let edge = {
            let mut t = self.tables.write();
            let edge = t
                .edges
                .get_mut(&id)
                .ok_or(TrellisError::EdgeNotFound(id))?;
            merge_props(&mut edge.properties, updates);
            edge.clone()
        };
        self.notify(Mutation::EdgeUpdated(edge.clone()));
        Ok(edge)
    }

    /// Deletes the edge and its adjacency and label-index entries.
    /// Idempotent: deleting an absent edge returns `Ok(false)`.
    pub fn delete_edge(&self, id: EdgeId) -> Result<bool> {
        let removed = {
            let mut t = self.tables.write();
            remove_edge_entry(&mut t, id)
        };
        if removed {
            debug!(edge = id, "deleted edge");
            self.notify(Mutation::EdgeDeleted(id));
        }
        Ok(removed)
    }

    /// Edges leaving `id`, in creation order.
    pub fn get_edges_from(&self, id: NodeId) -> Result<Vec<Edge>> {
        let t = self.tables.read();
        let adj = t.out_adj.get(&id).ok_or(TrellisError::NodeNotFound(id))?;
        Ok(adj.iter().map(|eid| t.edges[eid].clone()).collect())
    }

    /// Edges arriving at `id`, in creation order.
    pub fn get_edges_to(&self, id: NodeId) -> Result<Vec<Edge>> {
        let t = self.tables.read();
        let adj = t.in_adj.get(&id).ok_or(TrellisError::NodeNotFound(id))?;
        Ok(adj.iter().map(|eid| t.edges[eid].clone()).collect())
    }
}

/// Removes an edge from the edge table, both adjacency lists, and the label
/// index. Safe to call for already-removed edges.
pub(crate) fn remove_edge_entry(t: &mut Tables, id: EdgeId) -> bool {
    let Some(edge) = t.edges.remove(&id) else {
        return false;
    };
    if let Some(out) = t.out_adj.get_mut(&edge.from) {
        out.retain(|eid| *eid != id);
    }
    if let Some(inn) = t.in_adj.get_mut(&edge.to) {
        inn.retain(|eid| *eid != id);
    }
    if let Some(set) = t.label_index.get_mut(&edge.label) {
        set.remove(&id);
        if set.is_empty() {
            t.label_index.remove(&edge.label);
        }
    }
    true
}
