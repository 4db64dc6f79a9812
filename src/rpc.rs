//! Transport-agnostic peer RPC surface.
//!
//! Engines call peers through [`PeerRpc`] trait objects resolved from a
//! [`InProcessNetwork`] registry; the network also answers liveness probes
//! for the health monitor. Every cross-peer call runs under a hard
//! deadline; expiry yields the retryable `Timeout` error class.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::cluster::MemberId;
use crate::error::{Result, TrellisError};
use crate::lifecycle::Placement;
use crate::replication::{Payload, ReplicaUpdate, ReplicationPolicy};

/// Default deadlines for the cross-peer call classes.
pub mod deadlines {
    use std::time::Duration;

    /// Point-to-point replica updates.
    pub const POINT_TO_POINT: Duration = Duration::from_secs(5);
    /// Placement-plan forwarding.
    pub const PLACEMENT_FORWARD: Duration = Duration::from_secs(10);
    /// Peer recovery attempts.
    pub const RECOVERY: Duration = Duration::from_secs(30);
}

/// Logical peer surface. Implemented by the cluster node facade and
/// consumed through the network registry.
#[async_trait]
pub trait PeerRpc: Send + Sync {
    async fn store_replica(
        &self,
        key: &str,
        payload: Payload,
        policy: ReplicationPolicy,
    ) -> Result<()>;

    async fn update_replica(
        &self,
        key: &str,
        update: ReplicaUpdate,
        source: &MemberId,
    ) -> Result<()>;

    async fn forward_placement(&self, plan: Placement) -> Result<()>;

    async fn get_access_count(&self, key: &str) -> Result<u64>;

    async fn pause_operations(&self) -> Result<()>;

    async fn resume_operations(&self) -> Result<()>;
}

impl std::fmt::Debug for dyn PeerRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn PeerRpc")
    }
}

/// Liveness probe used by the heartbeat loop.
#[async_trait]
pub trait PeerProbe: Send + Sync {
    async fn ping(&self, peer: &MemberId) -> bool;
}

/// In-process peer registry: the loopback transport used by tests and
/// single-process clusters. Registration is the moment a peer becomes
/// reachable; deregistration simulates its crash.
#[derive(Default)]
pub struct InProcessNetwork {
    peers: RwLock<FxHashMap<MemberId, Arc<dyn PeerRpc>>>,
}

impl InProcessNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, member: impl Into<MemberId>, handler: Arc<dyn PeerRpc>) {
        self.peers.write().insert(member.into(), handler);
    }

    pub fn deregister(&self, member: &str) {
        self.peers.write().remove(member);
    }

    pub fn contains(&self, member: &str) -> bool {
        self.peers.read().contains_key(member)
    }

    /// Resolves a peer handle, failing with `ConnectionFailed` when the
    /// peer is not reachable.
    pub fn peer(&self, member: &str) -> Result<Arc<dyn PeerRpc>> {
        self.peers
            .read()
            .get(member)
            .cloned()
            .ok_or_else(|| TrellisError::ConnectionFailed(member.to_owned()))
    }
}

#[async_trait]
impl PeerProbe for InProcessNetwork {
    async fn ping(&self, peer: &MemberId) -> bool {
        self.contains(peer)
    }
}

/// Runs a future under a hard deadline, mapping expiry to `Timeout`.
pub async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| TrellisError::Timeout(deadline))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_peer_is_connection_failed() {
        let network = InProcessNetwork::new();
        let err = network.peer("nowhere").unwrap_err();
        assert_eq!(err.code(), "ConnectionFailed");
        assert!(err.is_retryable());
        assert!(!network.ping(&"nowhere".to_string()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_maps_to_timeout() {
        let result: Result<()> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert_eq!(result.unwrap_err().code(), "Timeout");
    }
}
