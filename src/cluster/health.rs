//! Peer health monitoring and failure detection.
//!
//! The monitor probes every non-local member at a fixed heartbeat
//! interval. Missed heartbeats increment a per-peer failure counter; a
//! successful probe resets it. At the failure threshold the peer is
//! declared failed and a recovery task makes one reconnect attempt within
//! the recovery timeout; if that fails, the peer is marked permanently
//! failed and the departure callback runs.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ClusterConfig;
use crate::rpc::PeerProbe;

use super::{ClusterManager, MemberId};

/// Cluster-wide health rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterHealth {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

/// Per-peer detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerStatus {
    Up,
    Suspect,
    Failed,
    PermanentlyFailed,
}

#[derive(Debug)]
struct PeerState {
    failures: u32,
    status: PeerStatus,
}

/// Callback invoked when a peer is declared permanently failed.
pub type DepartureHook = Arc<dyn Fn(&MemberId) + Send + Sync>;

pub struct HealthMonitor {
    heartbeat_interval: Duration,
    failure_threshold: u32,
    recovery_timeout: Duration,
    peers: Mutex<FxHashMap<MemberId, PeerState>>,
}

impl HealthMonitor {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            failure_threshold: config.failure_threshold,
            recovery_timeout: Duration::from_millis(config.recovery_timeout_ms),
            peers: Mutex::new(FxHashMap::default()),
        }
    }

    /// Starts tracking a peer as up.
    pub fn watch(&self, peer: impl Into<MemberId>) {
        self.peers.lock().entry(peer.into()).or_insert(PeerState {
            failures: 0,
            status: PeerStatus::Up,
        });
    }

    pub fn forget(&self, peer: &str) {
        self.peers.lock().remove(peer);
    }

    /// Records a missed heartbeat. Returns the new status when the peer
    /// transitions, in particular `Failed` at the threshold.
    pub fn note_down(&self, peer: &str) -> Option<PeerStatus> {
        let mut peers = self.peers.lock();
        let state = peers.get_mut(peer)?;
        if state.status == PeerStatus::PermanentlyFailed {
            return None;
        }
        state.failures += 1;
        let next = if state.failures >= self.failure_threshold {
            PeerStatus::Failed
        } else {
            PeerStatus::Suspect
        };
        if next != state.status {
            state.status = next;
            warn!(peer = %peer, failures = state.failures, status = ?next, "peer heartbeat missed");
            Some(next)
        } else {
            None
        }
    }

    /// Records a successful heartbeat, resetting the failure counter.
    pub fn note_up(&self, peer: &str) {
        let mut peers = self.peers.lock();
        if let Some(state) = peers.get_mut(peer) {
            if state.status != PeerStatus::Up {
                info!(peer = %peer, "peer recovered");
            }
            state.failures = 0;
            state.status = PeerStatus::Up;
        }
    }

    pub fn mark_permanently_failed(&self, peer: &str) {
        let mut peers = self.peers.lock();
        if let Some(state) = peers.get_mut(peer) {
            state.status = PeerStatus::PermanentlyFailed;
        }
    }

    pub fn status(&self, peer: &str) -> Option<PeerStatus> {
        self.peers.lock().get(peer).map(|s| s.status)
    }

    /// Peers currently declared failed (including permanently).
    pub fn failed_peers(&self) -> Vec<MemberId> {
        self.peers
            .lock()
            .iter()
            .filter(|(_, s)| {
                matches!(s.status, PeerStatus::Failed | PeerStatus::PermanentlyFailed)
            })
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    /// Health rollup: healthy with zero failed peers, degraded below half,
    /// critical at half or more, unknown with nothing monitored.
    pub fn health(&self) -> ClusterHealth {
        let peers = self.peers.lock();
        if peers.is_empty() {
            return ClusterHealth::Unknown;
        }
        let failed = peers
            .values()
            .filter(|s| matches!(s.status, PeerStatus::Failed | PeerStatus::PermanentlyFailed))
            .count();
        if failed == 0 {
            ClusterHealth::Healthy
        } else if failed * 2 < peers.len() {
            ClusterHealth::Degraded
        } else {
            ClusterHealth::Critical
        }
    }

    /// Heartbeat loop: probes every non-local member each interval. The
    /// timer is re-armed after each tick so ticks never overlap. Failed
    /// peers get a recovery task; permanent failures invoke `on_departure`.
    pub async fn run(
        self: Arc<Self>,
        cluster: Arc<ClusterManager>,
        probe: Arc<dyn PeerProbe>,
        on_departure: DepartureHook,
    ) {
        loop {
            tokio::time::sleep(self.heartbeat_interval).await;
            self.tick(&cluster, &probe, &on_departure).await;
        }
    }

    /// Single heartbeat round; exposed for deterministic tests.
    pub async fn tick(
        self: &Arc<Self>,
        cluster: &Arc<ClusterManager>,
        probe: &Arc<dyn PeerProbe>,
        on_departure: &DepartureHook,
    ) {
        for peer in cluster.members() {
            if &peer == cluster.local() {
                continue;
            }
            self.watch(peer.clone());
            if matches!(self.status(&peer), Some(PeerStatus::PermanentlyFailed)) {
                continue;
            }
            if probe.ping(&peer).await {
                self.note_up(&peer);
            } else if self.note_down(&peer) == Some(PeerStatus::Failed) {
                self.spawn_recovery(peer, Arc::clone(probe), Arc::clone(on_departure));
            }
        }
    }

    fn spawn_recovery(
        self: &Arc<Self>,
        peer: MemberId,
        probe: Arc<dyn PeerProbe>,
        on_departure: DepartureHook,
    ) {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            info!(peer = %peer, timeout = ?monitor.recovery_timeout, "scheduling peer recovery");
            let reconnected =
                tokio::time::timeout(monitor.recovery_timeout, probe.ping(&peer))
                    .await
                    .unwrap_or(false);
            if reconnected {
                monitor.note_up(&peer);
            } else {
                warn!(peer = %peer, "recovery window expired, marking permanently failed");
                monitor.mark_permanently_failed(&peer);
                on_departure(&peer);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(&ClusterConfig::default())
    }

    #[test]
    fn threshold_declares_failure() {
        let m = monitor();
        m.watch("m2");
        assert_eq!(m.note_down("m2"), Some(PeerStatus::Suspect));
        assert_eq!(m.note_down("m2"), None);
        assert_eq!(m.note_down("m2"), Some(PeerStatus::Failed));
        assert_eq!(m.status("m2"), Some(PeerStatus::Failed));
    }

    #[test]
    fn recovery_resets_the_counter() {
        let m = monitor();
        m.watch("m2");
        m.note_down("m2");
        m.note_down("m2");
        m.note_up("m2");
        assert_eq!(m.status("m2"), Some(PeerStatus::Up));
        // The counter restarted; two more misses stay below threshold.
        m.note_down("m2");
        m.note_down("m2");
        assert_eq!(m.status("m2"), Some(PeerStatus::Suspect));
    }

    #[test]
    fn health_rollup() {
        let m = monitor();
        assert_eq!(m.health(), ClusterHealth::Unknown);

        m.watch("m2");
        m.watch("m3");
        m.watch("m4");
        assert_eq!(m.health(), ClusterHealth::Healthy);

        for _ in 0..3 {
            m.note_down("m2");
        }
        assert_eq!(m.health(), ClusterHealth::Degraded);

        for _ in 0..3 {
            m.note_down("m3");
        }
        assert_eq!(m.health(), ClusterHealth::Critical);
    }
}
