//! Cluster membership and key ownership.
//!
//! [`ClusterManager`] tracks the local identity, the membership set, and
//! the partition ring. Membership changes rebuild the ring; placement
//! queries go through [`ClusterManager::owner`].

use std::collections::BTreeSet;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::config::ClusterConfig;
use crate::error::{Result, TrellisError};

pub mod health;
pub mod ring;

pub use health::{ClusterHealth, HealthMonitor, PeerStatus};
pub use ring::PartitionRing;

/// Cluster member identifier.
pub type MemberId = String;

/// Snapshot of cluster state returned by [`ClusterManager::info`].
#[derive(Debug, Clone, Serialize)]
pub struct ClusterInfo {
    pub local: MemberId,
    pub members: Vec<MemberId>,
    pub partitions: usize,
}

pub struct ClusterManager {
    local: MemberId,
    members: RwLock<BTreeSet<MemberId>>,
    ring: RwLock<PartitionRing>,
}

impl ClusterManager {
    /// Creates a single-member cluster containing only the local node.
    pub fn new(local: impl Into<MemberId>, config: &ClusterConfig) -> Self {
        let local = local.into();
        let mut members = BTreeSet::new();
        members.insert(local.clone());
        let mut ring = PartitionRing::new(config.partitions, config.points_per_member);
        ring.rebuild(&[local.clone()]);
        Self {
            local,
            members: RwLock::new(members),
            ring: RwLock::new(ring),
        }
    }

    pub fn local(&self) -> &MemberId {
        &self.local
    }

    /// Current membership, sorted.
    pub fn members(&self) -> Vec<MemberId> {
        self.members.read().iter().cloned().collect()
    }

    pub fn is_member(&self, member: &str) -> bool {
        self.members.read().contains(member)
    }

    /// Adds a peer and rebuilds the ring. Re-joining is a no-op.
    pub fn join(&self, peer: impl Into<MemberId>) -> Result<()> {
        let peer = peer.into();
        if peer.is_empty() {
            return Err(TrellisError::Validation(
                "member identifier cannot be empty".into(),
            ));
        }
        let mut members = self.members.write();
        if members.insert(peer.clone()) {
            let list: Vec<MemberId> = members.iter().cloned().collect();
            self.ring.write().rebuild(&list);
            info!(peer = %peer, members = list.len(), "member joined, ring rebuilt");
        }
        Ok(())
    }

    /// Removes a departed peer and rebuilds the ring. The local member
    /// cannot be removed.
    pub fn remove(&self, peer: &str) -> Result<()> {
        if peer == self.local {
            return Err(TrellisError::ConstraintViolation(
                "cannot remove the local member".into(),
            ));
        }
        let mut members = self.members.write();
        if members.remove(peer) {
            let list: Vec<MemberId> = members.iter().cloned().collect();
            self.ring.write().rebuild(&list);
            info!(peer = %peer, members = list.len(), "member departed, ring rebuilt");
        }
        Ok(())
    }

    pub fn info(&self) -> ClusterInfo {
        ClusterInfo {
            local: self.local.clone(),
            members: self.members(),
            partitions: self.ring.read().partitions(),
        }
    }

    /// Owning member for a key.
    pub fn owner(&self, key: &str) -> Result<MemberId> {
        self.ring
            .read()
            .owner(key)
            .cloned()
            .ok_or_else(|| TrellisError::ClusterUnavailable("partition ring is empty".into()))
    }

    /// Primary plus distinct replica owners for a key, at most `n` total.
    pub fn replica_owners(&self, key: &str, n: usize) -> Vec<MemberId> {
        self.ring.read().replica_owners(key, n)
    }
}
