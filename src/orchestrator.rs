//! Cluster-wide transition orchestration.
//!
//! Shutdown runs `prepare → drain → persist → coordinate → shutdown`;
//! startup runs `initialize → discover → synchronize → activate → ready`.
//! Every phase executes under a deadline; expiry either escalates to the
//! next phase or triggers the phase's rollback plan. Emergency failover is
//! a condensed shutdown → placement recompute → startup against the
//! surviving peers and does not touch the snapshot.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cluster::{ClusterManager, MemberId};
use crate::config::OrchestratorConfig;
use crate::error::{Result, TrellisError};
use crate::lifecycle::{LifecycleManager, PlacementEngine, Tier};
use crate::replication::{now_millis, ReplicationEngine};
use crate::rpc::{with_deadline, InProcessNetwork};

/// Ordered shutdown phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPhase {
    Prepare,
    Drain,
    Persist,
    Coordinate,
    Shutdown,
}

impl ShutdownPhase {
    pub const SEQUENCE: [ShutdownPhase; 5] = [
        ShutdownPhase::Prepare,
        ShutdownPhase::Drain,
        ShutdownPhase::Persist,
        ShutdownPhase::Coordinate,
        ShutdownPhase::Shutdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownPhase::Prepare => "prepare",
            ShutdownPhase::Drain => "drain",
            ShutdownPhase::Persist => "persist",
            ShutdownPhase::Coordinate => "coordinate",
            ShutdownPhase::Shutdown => "shutdown",
        }
    }
}

/// Ordered startup phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPhase {
    Initialize,
    Discover,
    Synchronize,
    Activate,
    Ready,
}

impl StartupPhase {
    pub const SEQUENCE: [StartupPhase; 5] = [
        StartupPhase::Initialize,
        StartupPhase::Discover,
        StartupPhase::Synchronize,
        StartupPhase::Activate,
        StartupPhase::Ready,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StartupPhase::Initialize => "initialize",
            StartupPhase::Discover => "discover",
            StartupPhase::Synchronize => "synchronize",
            StartupPhase::Activate => "activate",
            StartupPhase::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    Planned,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupKind {
    Standard,
    Recovery,
}

/// What to do when a phase misses its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPlan {
    EmergencyStop,
    PartialRollback,
    DataRecovery,
}

/// Result of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    /// Deadline missed; the orchestrator moved on.
    Escalated,
    /// Deadline missed; the rollback plan ran.
    RolledBack(RollbackPlan),
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseOutcome {
    pub phase: String,
    pub status: PhaseStatus,
    pub elapsed_ms: u64,
}

/// Full report of a shutdown or startup run.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    pub phases: Vec<PhaseOutcome>,
}

impl TransitionReport {
    pub fn completed(&self) -> bool {
        self.phases
            .iter()
            .all(|p| p.status == PhaseStatus::Completed)
    }
}

/// Persisted cluster state: `{nodes, partitions, timestamp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub nodes: Vec<String>,
    pub partitions: usize,
    pub timestamp: u64,
}

impl ClusterSnapshot {
    /// Writes the snapshot as `cluster_state_<timestamp>.json` in `dir`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("cluster_state_{}.json", self.timestamp));
        let encoded = serde_json::to_vec_pretty(self)
            .map_err(|err| TrellisError::Serialization(err.to_string()))?;
        std::fs::write(&path, encoded)?;
        Ok(path)
    }

    /// Reads the newest snapshot in `dir`, if any.
    pub fn read_latest(dir: &Path) -> Result<Option<ClusterSnapshot>> {
        if !dir.exists() {
            return Ok(None);
        }
        let mut latest: Option<ClusterSnapshot> = None;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("cluster_state_") || !name.ends_with(".json") {
                continue;
            }
            let bytes = std::fs::read(entry.path())?;
            let snapshot: ClusterSnapshot = serde_json::from_slice(&bytes)
                .map_err(|err| TrellisError::Serialization(err.to_string()))?;
            if latest
                .as_ref()
                .map(|s| snapshot.timestamp > s.timestamp)
                .unwrap_or(true)
            {
                latest = Some(snapshot);
            }
        }
        Ok(latest)
    }
}

pub struct Orchestrator {
    cluster: Arc<ClusterManager>,
    lifecycle: Arc<LifecycleManager>,
    placement: Arc<PlacementEngine>,
    replication: Arc<ReplicationEngine>,
    network: Arc<InProcessNetwork>,
    snapshot_dir: Option<PathBuf>,
    phase_deadline: Duration,
    /// Shared pause flag; the node facade rejects peer calls while set.
    paused: Arc<AtomicBool>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cluster: Arc<ClusterManager>,
        lifecycle: Arc<LifecycleManager>,
        placement: Arc<PlacementEngine>,
        replication: Arc<ReplicationEngine>,
        network: Arc<InProcessNetwork>,
        snapshot_dir: Option<PathBuf>,
        config: &OrchestratorConfig,
        paused: Arc<AtomicBool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            lifecycle,
            placement,
            replication,
            network,
            snapshot_dir,
            phase_deadline: Duration::from_millis(config.phase_deadline_ms),
            paused,
        })
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    async fn run_phase<F, Fut>(
        &self,
        name: &str,
        rollback: Option<RollbackPlan>,
        body: F,
    ) -> PhaseOutcome
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.phase_deadline, body()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let status = match outcome {
            Ok(Ok(())) => PhaseStatus::Completed,
            Ok(Err(err)) => {
                error!(phase = name, error = %err, "phase failed");
                match rollback {
                    Some(plan) => PhaseStatus::RolledBack(plan),
                    None => PhaseStatus::Escalated,
                }
            }
            Err(_) => {
                warn!(phase = name, deadline = ?self.phase_deadline, "phase deadline expired");
                match rollback {
                    Some(plan) => PhaseStatus::RolledBack(plan),
                    None => PhaseStatus::Escalated,
                }
            }
        };
        info!(phase = name, status = ?status, elapsed_ms, "phase finished");
        PhaseOutcome {
            phase: name.to_owned(),
            status,
            elapsed_ms,
        }
    }

    /// Runs the ordered shutdown sequence.
    pub async fn graceful_shutdown(&self, kind: ShutdownKind) -> Result<TransitionReport> {
        info!(kind = ?kind, "beginning graceful shutdown");
        let mut phases = Vec::new();

        phases.push(
            self.run_phase(ShutdownPhase::Prepare.as_str(), None, || async {
                self.paused.store(true, Ordering::Release);
                self.broadcast_pause(true).await;
                Ok(())
            })
            .await,
        );

        phases.push(
            self.run_phase(ShutdownPhase::Drain.as_str(), None, || async {
                self.drain_hot_tier()?;
                self.placement.drain();
                Ok(())
            })
            .await,
        );

        phases.push(
            self.run_phase(ShutdownPhase::Persist.as_str(), Some(RollbackPlan::DataRecovery), || async {
                self.persist_state()
            })
            .await,
        );

        phases.push(
            self.run_phase(ShutdownPhase::Coordinate.as_str(), None, || async {
                self.replication.flush().await;
                self.replication.consistency_check();
                Ok(())
            })
            .await,
        );

        phases.push(
            self.run_phase(ShutdownPhase::Shutdown.as_str(), None, || async {
                self.drop_volatile_records()?;
                self.network.deregister(self.cluster.local());
                Ok(())
            })
            .await,
        );

        Ok(TransitionReport { phases })
    }

    /// Runs the ordered startup sequence.
    pub async fn coordinate_startup(&self, kind: StartupKind) -> Result<TransitionReport> {
        info!(kind = ?kind, "beginning coordinated startup");
        let mut phases = Vec::new();

        phases.push(
            self.run_phase(StartupPhase::Initialize.as_str(), None, || async {
                if let Some(dir) = &self.snapshot_dir {
                    if let Some(snapshot) = ClusterSnapshot::read_latest(dir)? {
                        info!(
                            members = snapshot.nodes.len(),
                            partitions = snapshot.partitions,
                            timestamp = snapshot.timestamp,
                            "restoring cluster state from snapshot"
                        );
                        for node in &snapshot.nodes {
                            if node != self.cluster.local() {
                                self.cluster.join(node.clone())?;
                            }
                        }
                    }
                }
                Ok(())
            })
            .await,
        );

        phases.push(
            self.run_phase(StartupPhase::Discover.as_str(), None, || async {
                for seed in crate::config::Config::seed_peers() {
                    if seed != *self.cluster.local() && self.network.contains(&seed) {
                        self.cluster.join(seed)?;
                    }
                }
                Ok(())
            })
            .await,
        );

        phases.push(
            self.run_phase(
                StartupPhase::Synchronize.as_str(),
                Some(RollbackPlan::PartialRollback),
                || async {
                    self.reload_persistent_records()?;
                    self.replication.consistency_check();
                    Ok(())
                },
            )
            .await,
        );

        phases.push(
            self.run_phase(StartupPhase::Activate.as_str(), None, || async {
                self.paused.store(false, Ordering::Release);
                self.broadcast_pause(false).await;
                Ok(())
            })
            .await,
        );

        phases.push(
            self.run_phase(StartupPhase::Ready.as_str(), None, || async {
                info!(local = %self.cluster.local(), members = self.cluster.members().len(), "node ready");
                Ok(())
            })
            .await,
        );

        Ok(TransitionReport { phases })
    }

    /// Condensed shutdown → placement recompute → startup against the
    /// surviving peers. Skips the snapshot entirely.
    pub async fn emergency_failover(&self, surviving: &[MemberId]) -> Result<TransitionReport> {
        warn!(surviving = surviving.len(), "emergency failover engaged");
        let mut phases = Vec::new();

        phases.push(
            self.run_phase("prepare", None, || async {
                self.paused.store(true, Ordering::Release);
                Ok(())
            })
            .await,
        );

        phases.push(
            self.run_phase("recompute", Some(RollbackPlan::EmergencyStop), || async {
                let lost: Vec<MemberId> = self
                    .cluster
                    .members()
                    .into_iter()
                    .filter(|m| m != self.cluster.local() && !surviving.contains(m))
                    .collect();
                for member in &lost {
                    self.cluster.remove(member)?;
                    self.lifecycle.handle_member_departure(member);
                    self.replication.handle_peer_failure(member);
                }
                Ok(())
            })
            .await,
        );

        phases.push(
            self.run_phase("activate", None, || async {
                self.paused.store(false, Ordering::Release);
                Ok(())
            })
            .await,
        );

        Ok(TransitionReport { phases })
    }

    async fn broadcast_pause(&self, pause: bool) {
        for member in self.cluster.members() {
            if &member == self.cluster.local() {
                continue;
            }
            let Ok(peer) = self.network.peer(&member) else {
                continue;
            };
            let call = async {
                if pause {
                    peer.pause_operations().await
                } else {
                    peer.resume_operations().await
                }
            };
            if let Err(err) = with_deadline(crate::rpc::deadlines::POINT_TO_POINT, call).await {
                warn!(peer = %member, error = %err, "pause/resume broadcast failed");
            }
        }
    }

    /// Moves hot records whose classification wants a cooler primary tier
    /// down to warm before shutdown.
    fn drain_hot_tier(&self) -> Result<()> {
        let tiers = self.placement.tiers();
        for key in self.lifecycle.keys() {
            let Some(tag) = self.lifecycle.classification(&key) else {
                continue;
            };
            if tag.policy().primary_tier == Tier::Hot {
                continue;
            }
            if tiers.locate(&key)? == Some(Tier::Hot) {
                self.placement.migrate(&key, Tier::Hot, Tier::Warm)?;
            }
        }
        Ok(())
    }

    /// Writes the cluster-state snapshot and backs persistent payloads
    /// into the cold tier (keeping a warm copy).
    fn persist_state(&self) -> Result<()> {
        let tiers = self.placement.tiers();
        for key in self
            .lifecycle
            .keys_tagged(crate::lifecycle::Classification::Persistent)
        {
            if let Some((tier, payload)) = tiers.fetch(&key)? {
                if tier != Tier::Cold {
                    tiers.put(Tier::Cold, &key, payload.clone())?;
                }
                tiers.put(Tier::Warm, &key, payload)?;
            }
        }

        if let Some(dir) = &self.snapshot_dir {
            let snapshot = ClusterSnapshot {
                nodes: self.cluster.members(),
                partitions: self.cluster.info().partitions,
                timestamp: now_millis(),
            };
            let path = snapshot.write(dir)?;
            info!(path = %path.display(), "cluster state persisted");
        } else {
            warn!("no snapshot directory configured, skipping state persistence");
        }
        Ok(())
    }

    /// Promotes cold persistent payloads back to their warm backing after
    /// startup.
    fn reload_persistent_records(&self) -> Result<()> {
        let tiers = self.placement.tiers();
        for key in self
            .lifecycle
            .keys_tagged(crate::lifecycle::Classification::Persistent)
        {
            if let Some(payload) = tiers.get(Tier::Cold, &key)? {
                if tiers.get(Tier::Warm, &key)?.is_none() {
                    tiers.put(Tier::Warm, &key, payload)?;
                }
            }
        }
        Ok(())
    }

    /// Drops hot-only volatile payloads; session and ephemeral data does
    /// not survive a shutdown.
    fn drop_volatile_records(&self) -> Result<()> {
        let tiers = self.placement.tiers();
        for key in self.lifecycle.keys() {
            let volatile = matches!(
                self.lifecycle.classification(&key),
                Some(
                    crate::lifecycle::Classification::Ephemeral
                        | crate::lifecycle::Classification::Session
                )
            );
            if volatile {
                tiers.remove(Tier::Hot, &key)?;
            }
        }
        Ok(())
    }
}
