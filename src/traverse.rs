//! Breadth-first traversal and shortest-path search.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};
use crate::model::NodeId;
use crate::store::GraphStore;

/// Edge direction selector for traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Out,
    In,
    Both,
}

/// Maximum traversal depth accepted by [`GraphStore::traverse`] and
/// [`GraphStore::find_path`].
pub const MAX_DEPTH: u32 = 100;

fn check_depth(depth: u32) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(TrellisError::InvalidDepth {
            given: depth,
            max: MAX_DEPTH,
        });
    }
    Ok(())
}

impl GraphStore {
    /// Nodes reachable from `start` within `depth` hops in the chosen
    /// direction, excluding `start` itself, in BFS discovery order.
    ///
    /// Depth 0 yields the empty set. Each node is visited at most once;
    /// `Both` uses set semantics across the two directions.
    pub fn traverse(&self, start: NodeId, direction: Direction, depth: u32) -> Result<Vec<NodeId>> {
        check_depth(depth)?;
        if !self.node_exists(start) {
            return Err(TrellisError::NodeNotFound(start));
        }
        if depth == 0 {
            return Ok(Vec::new());
        }

        let mut visited = rustc_hash::FxHashSet::default();
        visited.insert(start);
        let mut order = Vec::new();
        let mut frontier = vec![start];
        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for node in frontier {
                for neighbor in self.neighbors(node, direction)? {
                    if visited.insert(neighbor) {
                        order.push(neighbor);
                        next.push(neighbor);
                    }
                }
            }
            frontier = next;
        }
        Ok(order)
    }

    /// Shortest path from `from` to `to` over outgoing edges, endpoints
    /// inclusive, pruned at `max_depth` hops.
    ///
    /// Ties resolve to the first path discovered in BFS order over the
    /// adjacency-list iteration order (edge-creation order). Fails with
    /// `PathNotFound` when no path exists within the bound.
    pub fn find_path(&self, from: NodeId, to: NodeId, max_depth: u32) -> Result<Vec<NodeId>> {
        check_depth(max_depth)?;
        if !self.node_exists(from) {
            return Err(TrellisError::NodeNotFound(from));
        }
        if !self.node_exists(to) {
            return Err(TrellisError::NodeNotFound(to));
        }
        if from == to {
            return Ok(vec![from]);
        }

        let not_found = TrellisError::PathNotFound {
            from,
            to,
            max_depth,
        };
        let mut predecessor: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        let mut queue = VecDeque::new();
        queue.push_back((from, 0u32));
        predecessor.insert(from, from);
        while let Some((node, dist)) = queue.pop_front() {
            if dist == max_depth {
                continue;
            }
            for neighbor in self.neighbors(node, Direction::Out)? {
                if predecessor.contains_key(&neighbor) {
                    continue;
                }
                predecessor.insert(neighbor, node);
                if neighbor == to {
                    let mut path = vec![to];
                    let mut cursor = to;
                    while cursor != from {
                        cursor = predecessor[&cursor];
                        path.push(cursor);
                    }
                    path.reverse();
                    return Ok(path);
                }
                queue.push_back((neighbor, dist + 1));
            }
        }
        Err(not_found)
    }
}
