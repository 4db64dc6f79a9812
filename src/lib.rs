//! # Trellis - Embedded In-Memory Graph Store
//!
//! Trellis is an embedded property-graph store with secondary property and
//! label indexes, a small pattern-query engine, a suite of graph-analytics
//! kernels, and a distributed data-lifecycle layer that classifies records
//! and places them across hot, warm, and cold storage tiers with
//! conflict-free replication between cluster members.
//!
//! ## Quick Start
//!
//! ```rust
//! use trellis::{props, Direction, GraphStore};
//!
//! let store = GraphStore::new();
//! let alice = store.create_node(props([("name", "Alice")]))?;
//! let bob = store.create_node(props([("name", "Bob")]))?;
//! store.create_edge(alice, bob, "knows", Default::default())?;
//!
//! assert_eq!(store.traverse(alice, Direction::Out, 1)?, vec![bob]);
//! # Ok::<(), trellis::TrellisError>(())
//! ```
//!
//! ## Architecture
//!
//! - **Store**: single-writer in-memory tables with lock-free readers
//! - **Query**: parse → plan against the indexes → execute, with plan
//!   memoization
//! - **Analytics**: snapshot-based kernels (PageRank, centralities,
//!   communities, cores)
//! - **Cluster**: membership, partition ring, heartbeat failure detection
//! - **Lifecycle**: classification → tier placement → TTL cleanup
//! - **Replication**: vector-clocked replica sets with pluggable conflict
//!   resolution
//! - **Orchestrator**: phased shutdown/startup and emergency failover

#![forbid(unsafe_code)]

pub mod analytics;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod node;
pub mod orchestrator;
pub mod query;
pub mod replication;
pub mod retry;
pub mod rpc;
pub mod store;
pub mod traverse;

pub use crate::cluster::{ClusterHealth, ClusterManager, HealthMonitor, MemberId};
pub use crate::config::Config;
pub use crate::error::{Result, TrellisError};
pub use crate::lifecycle::{Classification, LifecycleManager, Placement, Tier};
pub use crate::model::{props, Edge, EdgeId, Node, NodeId, PropMap, PropValue};
pub use crate::node::{ClusterNode, NodeOptions};
pub use crate::query::{QueryEngine, QueryResult};
pub use crate::replication::{Payload, ReplicationEngine, ReplicationPolicy, VectorClock};
pub use crate::store::{GraphStats, GraphStore};
pub use crate::traverse::Direction;
