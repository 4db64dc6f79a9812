//! Replication engine: replica sets, vector-clock versioning, asynchronous
//! propagation, and conflict resolution.
//!
//! Each member runs one engine holding its view of every replica set it
//! participates in or coordinates. Writers advance their own vector-clock
//! component, apply locally, and queue propagation to peer replicas; a
//! single outbound worker drains the queue so sends to a given peer keep
//! their order. Propagation failures are recorded in the replica set and
//! never surfaced to the mutator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::cluster::{ClusterManager, MemberId};
use crate::config::ReplicationConfig;
use crate::error::{Result, TrellisError};
use crate::rpc::{with_deadline, InProcessNetwork};

pub mod payload;
pub mod resolve;
pub mod vclock;

pub use payload::Payload;
pub use resolve::{Candidate, Strategy};
pub use vclock::{ClockOrdering, VectorClock};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Replication policy: how many replicas a key gets and how conflicts
/// resolve. A closed set; the adaptive variant derives its parameters from
/// access rate and payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationPolicy {
    Minimal,
    Balanced,
    Maximum,
    Adaptive,
}

impl ReplicationPolicy {
    /// Inclusive `(min, max)` replica counts.
    pub fn replica_bounds(&self) -> (usize, usize) {
        match self {
            ReplicationPolicy::Minimal => (1, 2),
            ReplicationPolicy::Balanced => (2, 3),
            ReplicationPolicy::Maximum => (3, 5),
            ReplicationPolicy::Adaptive => (1, 5),
        }
    }

    /// Replica count for a key given current membership and, for the
    /// adaptive policy, payload size and access rate.
    pub fn target_replicas(&self, members: usize, payload: &Payload, access_rate: f64) -> usize {
        let (min, max) = self.replica_bounds();
        let wanted = match self {
            ReplicationPolicy::Adaptive => {
                // Large payloads replicate less, hot keys replicate more.
                let base = if payload.approx_size() > 4096 { 2 } else { 3 };
                if access_rate > 10.0 {
                    base + 1
                } else {
                    base
                }
            }
            _ => max,
        };
        wanted.clamp(min, max).min(members.max(1))
    }

    /// Conflict-resolution strategy; the adaptive policy keys on payload
    /// shape.
    pub fn strategy_for(&self, payload: &Payload) -> Strategy {
        match self {
            ReplicationPolicy::Minimal => Strategy::LastWriteWins,
            ReplicationPolicy::Balanced => Strategy::VectorClock,
            ReplicationPolicy::Maximum => Strategy::Consensus,
            ReplicationPolicy::Adaptive => match payload {
                Payload::Node { .. } | Payload::Edge { .. } => Strategy::SmartMerge,
                Payload::Map(_) => Strategy::VectorClock,
                Payload::Scalar(_) => Strategy::LastWriteWins,
            },
        }
    }
}

impl std::str::FromStr for ReplicationPolicy {
    type Err = TrellisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Ok(ReplicationPolicy::Minimal),
            "balanced" => Ok(ReplicationPolicy::Balanced),
            "maximum" => Ok(ReplicationPolicy::Maximum),
            "adaptive" => Ok(ReplicationPolicy::Adaptive),
            other => Err(TrellisError::Validation(format!(
                "unknown replication policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaRole {
    Primary,
    Replica,
}

/// A concurrent version shelved for later resolution.
#[derive(Debug, Clone)]
pub struct ConflictEntry {
    pub source: MemberId,
    pub payload: Payload,
    pub clock: VectorClock,
    pub last_updated: u64,
}

/// One member's copy of a replicated key, as known to this engine.
#[derive(Debug, Clone)]
pub struct Replica {
    pub member: MemberId,
    pub payload: Payload,
    pub version: u64,
    pub clock: VectorClock,
    pub last_updated: u64,
    pub role: ReplicaRole,
    pub conflicts: Vec<ConflictEntry>,
}

/// The full replica set for one key.
#[derive(Debug, Clone)]
pub struct ReplicaSet {
    pub key: String,
    pub policy: ReplicationPolicy,
    pub primary: MemberId,
    pub replicas: Vec<Replica>,
    pub last_sync: u64,
    /// Propagation failures, recorded rather than surfaced.
    pub sync_errors: Vec<String>,
}

impl ReplicaSet {
    pub fn members(&self) -> Vec<MemberId> {
        self.replicas.iter().map(|r| r.member.clone()).collect()
    }

    fn replica_mut(&mut self, member: &str) -> Option<&mut Replica> {
        self.replicas.iter_mut().find(|r| r.member == member)
    }

    fn replica(&self, member: &str) -> Option<&Replica> {
        self.replicas.iter().find(|r| r.member == member)
    }
}

/// Wire form of one replica update.
#[derive(Debug, Clone)]
pub struct ReplicaUpdate {
    pub payload: Payload,
    pub clock: VectorClock,
    pub version: u64,
    pub last_updated: u64,
}

/// Serializable status summary for one replica set.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicaStatus {
    pub key: String,
    pub policy: ReplicationPolicy,
    pub primary: MemberId,
    pub members: Vec<MemberId>,
    pub versions: Vec<u64>,
    pub conflicts: usize,
    pub divergent: bool,
    pub sync_errors: usize,
}

enum Outbound {
    Store {
        key: String,
        payload: Payload,
        policy: ReplicationPolicy,
        targets: Vec<MemberId>,
    },
    Update {
        key: String,
        update: ReplicaUpdate,
        targets: Vec<MemberId>,
    },
}

pub struct ReplicationEngine {
    local: MemberId,
    cluster: Arc<ClusterManager>,
    network: Arc<InProcessNetwork>,
    sets: RwLock<FxHashMap<String, ReplicaSet>>,
    propagation_deadline: Duration,
    consistency_interval: Duration,
    inconsistencies: AtomicU64,
    outbound: Mutex<Option<UnboundedSender<Outbound>>>,
    pending_sends: AtomicU64,
}

impl ReplicationEngine {
    pub fn new(
        cluster: Arc<ClusterManager>,
        network: Arc<InProcessNetwork>,
        config: &ReplicationConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            local: cluster.local().clone(),
            cluster,
            network,
            sets: RwLock::new(FxHashMap::default()),
            propagation_deadline: Duration::from_millis(config.propagation_deadline_ms),
            consistency_interval: Duration::from_millis(config.consistency_interval_ms),
            inconsistencies: AtomicU64::new(0),
            outbound: Mutex::new(None),
            pending_sends: AtomicU64::new(0),
        })
    }

    pub fn local(&self) -> &MemberId {
        &self.local
    }

    /// Total inconsistencies observed by the consistency check.
    pub fn inconsistencies(&self) -> u64 {
        self.inconsistencies.load(Ordering::Relaxed)
    }

    /// Creates a replica set for `key`, placing replicas on ring members
    /// and queueing propagation to the remote ones. Fails with
    /// `DuplicateEntry` when the key is already replicated.
    pub fn create(
        self: &Arc<Self>,
        key: &str,
        policy: ReplicationPolicy,
        payload: Payload,
    ) -> Result<Vec<MemberId>> {
        {
            let sets = self.sets.read();
            if sets.contains_key(key) {
                return Err(TrellisError::DuplicateEntry(key.to_owned()));
            }
        }
        let target = policy.target_replicas(self.cluster.members().len(), &payload, 0.0);
        let members = self.cluster.replica_owners(key, target);
        if members.is_empty() {
            return Err(TrellisError::ClusterUnavailable(
                "no members available for replication".into(),
            ));
        }
        let mut clock = VectorClock::new();
        clock.increment(&self.local);
        let set = self.build_set(key, policy, &payload, &members, clock);
        self.sets.write().insert(key.to_owned(), set);
        debug!(key = %key, replicas = members.len(), "created replica set");

        let targets: Vec<MemberId> =
            members.iter().filter(|m| **m != self.local).cloned().collect();
        if !targets.is_empty() {
            self.enqueue(Outbound::Store {
                key: key.to_owned(),
                payload,
                policy,
                targets,
            });
        }
        Ok(members)
    }

    fn build_set(
        &self,
        key: &str,
        policy: ReplicationPolicy,
        payload: &Payload,
        members: &[MemberId],
        clock: VectorClock,
    ) -> ReplicaSet {
        let now = now_millis();
        let primary = members[0].clone();
        let replicas = members
            .iter()
            .map(|member| Replica {
                member: member.clone(),
                payload: payload.clone(),
                version: 1,
                clock: clock.clone(),
                last_updated: now,
                role: if *member == primary {
                    ReplicaRole::Primary
                } else {
                    ReplicaRole::Replica
                },
                conflicts: Vec::new(),
            })
            .collect();
        ReplicaSet {
            key: key.to_owned(),
            policy,
            primary,
            replicas,
            last_sync: now,
            sync_errors: Vec::new(),
        }
    }

    /// Server side of `store_replica`: adopts the set as shipped by the
    /// coordinating member. Membership derives from the same ring, so the
    /// receiver reconstructs the same replica list.
    pub fn accept_store(&self, key: &str, payload: Payload, policy: ReplicationPolicy) {
        let target = policy.target_replicas(self.cluster.members().len(), &payload, 0.0);
        let mut members = self.cluster.replica_owners(key, target);
        if members.is_empty() {
            members = vec![self.local.clone()];
        }
        // The receiver adopts the copy with an empty clock; the next update
        // from any writer dominates it.
        let set = self.build_set(key, policy, &payload, &members, VectorClock::new());
        self.sets.write().insert(key.to_owned(), set);
    }

    /// Applies a local update: advances the local clock component, merges
    /// map fields (or replaces other shapes), and queues propagation.
    pub fn update(self: &Arc<Self>, key: &str, update: Payload) -> Result<()> {
        self.update_at(key, update, now_millis())
    }

    /// [`ReplicationEngine::update`] with an explicit wall-clock timestamp.
    pub fn update_at(self: &Arc<Self>, key: &str, update: Payload, at: u64) -> Result<()> {
        let (wire, targets) = {
            let mut sets = self.sets.write();
            let set = sets.get_mut(key).ok_or_else(|| {
                TrellisError::ConstraintViolation(format!("key '{key}' is not replicated"))
            })?;
            if set.replica(&self.local).is_none() {
                // The coordinator keeps a tracking replica even when the
                // ring placed the key elsewhere.
                set.replicas.push(Replica {
                    member: self.local.clone(),
                    payload: update.clone(),
                    version: 0,
                    clock: VectorClock::new(),
                    last_updated: 0,
                    role: ReplicaRole::Replica,
                    conflicts: Vec::new(),
                });
            }
            let local = self.local.clone();
            let replica = set.replica_mut(&local).expect("local replica present");
            replica.clock.increment(&local);
            replica.payload.apply_update(&update);
            replica.version += 1;
            replica.last_updated = at;
            let wire = ReplicaUpdate {
                payload: replica.payload.clone(),
                clock: replica.clock.clone(),
                version: replica.version,
                last_updated: at,
            };
            let targets: Vec<MemberId> = set
                .members()
                .into_iter()
                .filter(|m| *m != self.local)
                .collect();
            (wire, targets)
        };
        if !targets.is_empty() {
            self.enqueue(Outbound::Update {
                key: key.to_owned(),
                update: wire,
                targets,
            });
        }
        Ok(())
    }

    /// Server side of `update_replica`: applies dominating updates,
    /// ignores stale ones, and shelves concurrent ones on the conflict
    /// list.
    pub fn accept_update(&self, key: &str, update: ReplicaUpdate, source: &str) -> Result<()> {
        let mut sets = self.sets.write();
        let Some(set) = sets.get_mut(key) else {
            warn!(key = %key, source = %source, "update for unknown replica set dropped");
            return Ok(());
        };

        // Bookkeeping: the sender's entry reflects its authoritative copy.
        if let Some(entry) = set.replica_mut(source) {
            entry.payload = update.payload.clone();
            entry.clock = update.clock.clone();
            entry.version = update.version;
            entry.last_updated = update.last_updated;
        }

        let local = self.local.clone();
        let Some(replica) = set.replica_mut(&local) else {
            return Ok(());
        };
        match update.clock.compare(&replica.clock) {
            ClockOrdering::After => {
                replica.payload = update.payload;
                replica.clock.merge(&update.clock);
                replica.version = replica.version.max(update.version);
                replica.last_updated = update.last_updated;
            }
            ClockOrdering::Before | ClockOrdering::Equal => {}
            ClockOrdering::Concurrent => {
                warn!(key = %key, source = %source, "concurrent update shelved as conflict");
                replica.conflicts.push(ConflictEntry {
                    source: source.to_owned(),
                    payload: update.payload,
                    clock: update.clock,
                    last_updated: update.last_updated,
                });
            }
        }
        set.last_sync = now_millis();
        Ok(())
    }

    /// Resolves divergence for one key with the policy's strategy and
    /// installs the winner on every known replica entry.
    pub fn resolve(&self, key: &str) -> Result<Payload> {
        let mut sets = self.sets.write();
        let set = sets.get_mut(key).ok_or_else(|| {
            TrellisError::ConstraintViolation(format!("key '{key}' is not replicated"))
        })?;

        let mut candidates: Vec<Candidate> = Vec::new();
        for replica in &set.replicas {
            candidates.push(Candidate {
                member: replica.member.clone(),
                payload: replica.payload.clone(),
                clock: replica.clock.clone(),
                last_updated: replica.last_updated,
            });
            for conflict in &replica.conflicts {
                candidates.push(Candidate {
                    member: conflict.source.clone(),
                    payload: conflict.payload.clone(),
                    clock: conflict.clock.clone(),
                    last_updated: conflict.last_updated,
                });
            }
        }
        if candidates.is_empty() {
            return Err(TrellisError::ConstraintViolation(format!(
                "key '{key}' has no surviving replicas"
            )));
        }
        // Deterministic candidate order so every member converges.
        candidates.sort_by(|a, b| {
            a.member
                .cmp(&b.member)
                .then_with(|| a.last_updated.cmp(&b.last_updated))
        });

        let strategy = set.policy.strategy_for(&candidates[0].payload);
        let Some(resolved) = resolve::resolve(strategy, &candidates) else {
            return Err(TrellisError::ConstraintViolation(format!(
                "key '{key}' produced no resolution candidates"
            )));
        };

        let mut merged_clock = VectorClock::new();
        for candidate in &candidates {
            merged_clock.merge(&candidate.clock);
        }
        let last_updated = candidates
            .iter()
            .map(|c| c.last_updated)
            .max()
            .unwrap_or_else(now_millis);
        let version = set.replicas.iter().map(|r| r.version).max().unwrap_or(0) + 1;
        for replica in &mut set.replicas {
            replica.payload = resolved.clone();
            replica.clock = merged_clock.clone();
            replica.version = version;
            replica.last_updated = last_updated;
            replica.conflicts.clear();
        }
        info!(key = %key, strategy = ?strategy, "resolved replica divergence");
        Ok(resolved)
    }

    /// Periodic consistency pass: any set whose entries disagree (or carry
    /// shelved conflicts) counts as an inconsistency and gets resolved.
    /// Returns the number of sets repaired.
    pub fn consistency_check(&self) -> usize {
        let divergent: Vec<String> = {
            let sets = self.sets.read();
            sets.values()
                .filter(|set| Self::is_divergent(set))
                .map(|set| set.key.clone())
                .collect()
        };
        for key in &divergent {
            self.inconsistencies.fetch_add(1, Ordering::Relaxed);
            if let Err(err) = self.resolve(key) {
                warn!(key = %key, error = %err, "consistency resolution failed");
            }
        }
        let now = now_millis();
        for set in self.sets.write().values_mut() {
            set.last_sync = now;
        }
        divergent.len()
    }

    fn is_divergent(set: &ReplicaSet) -> bool {
        if set.replicas.iter().any(|r| !r.conflicts.is_empty()) {
            return true;
        }
        let first = match set.replicas.first() {
            Some(replica) => &replica.payload,
            None => return false,
        };
        set.replicas.iter().any(|r| &r.payload != first)
    }

    /// Removes a failed peer from every set, promotes a new primary where
    /// needed, and replenishes sets that fell below the policy minimum.
    pub fn handle_peer_failure(self: &Arc<Self>, member: &str) {
        let mut stores = Vec::new();
        {
            let mut sets = self.sets.write();
            for set in sets.values_mut() {
                let before = set.replicas.len();
                set.replicas.retain(|r| r.member != member);
                if set.replicas.len() == before {
                    continue;
                }
                if set.primary == member {
                    // Promote the freshest survivor.
                    if let Some(promoted) = set
                        .replicas
                        .iter_mut()
                        .max_by(|a, b| {
                            a.last_updated
                                .cmp(&b.last_updated)
                                .then_with(|| a.member.cmp(&b.member))
                        })
                    {
                        promoted.role = ReplicaRole::Primary;
                        set.primary = promoted.member.clone();
                        info!(key = %set.key, primary = %set.primary, "promoted replica to primary");
                    }
                }
                let (min, _) = set.policy.replica_bounds();
                if !set.replicas.is_empty() && set.replicas.len() < min {
                    let existing = set.members();
                    let latest = set
                        .replicas
                        .iter()
                        .max_by_key(|r| r.last_updated)
                        .map(|r| r.payload.clone());
                    let candidates = self.cluster.replica_owners(&set.key, min + existing.len());
                    for candidate in candidates {
                        if set.replicas.len() >= min {
                            break;
                        }
                        if candidate == member || existing.contains(&candidate) {
                            continue;
                        }
                        let Some(payload) = latest.clone() else { break };
                        let template = set.replicas[0].clone();
                        set.replicas.push(Replica {
                            member: candidate.clone(),
                            payload: payload.clone(),
                            version: template.version,
                            clock: template.clock.clone(),
                            last_updated: template.last_updated,
                            role: ReplicaRole::Replica,
                            conflicts: Vec::new(),
                        });
                        stores.push((set.key.clone(), payload, set.policy, candidate));
                    }
                }
            }
        }
        for (key, payload, policy, target) in stores {
            self.enqueue(Outbound::Store {
                key,
                payload,
                policy,
                targets: vec![target],
            });
        }
    }

    /// Local view of the replicated payload.
    pub fn get(&self, key: &str) -> Option<Payload> {
        let sets = self.sets.read();
        let set = sets.get(key)?;
        set.replica(&self.local)
            .or_else(|| set.replicas.first())
            .map(|r| r.payload.clone())
    }

    pub fn status(&self, key: &str) -> Option<ReplicaStatus> {
        let sets = self.sets.read();
        let set = sets.get(key)?;
        Some(ReplicaStatus {
            key: set.key.clone(),
            policy: set.policy,
            primary: set.primary.clone(),
            members: set.members(),
            versions: set.replicas.iter().map(|r| r.version).collect(),
            conflicts: set.replicas.iter().map(|r| r.conflicts.len()).sum(),
            divergent: Self::is_divergent(set),
            sync_errors: set.sync_errors.len(),
        })
    }

    pub fn keys(&self) -> Vec<String> {
        self.sets.read().keys().cloned().collect()
    }

    /// Consistency-check loop; the timer re-arms after each pass.
    pub async fn run_consistency_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.consistency_interval).await;
            let repaired = self.consistency_check();
            if repaired > 0 {
                info!(repaired, "consistency check repaired divergent sets");
            }
        }
    }

    /// Drains queued propagation until the engine is dropped. Lazily
    /// started on the first outbound message.
    fn enqueue(self: &Arc<Self>, message: Outbound) {
        let mut guard = self.outbound.lock();
        if guard.is_none() {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                warn!("no async runtime, replication intent dropped");
                return;
            };
            let (tx, mut rx) = mpsc::unbounded_channel();
            let engine = Arc::clone(self);
            handle.spawn(async move {
                while let Some(message) = rx.recv().await {
                    engine.dispatch(message).await;
                    engine.pending_sends.fetch_sub(1, Ordering::Release);
                }
            });
            *guard = Some(tx);
        }
        if let Some(sender) = guard.as_ref() {
            self.pending_sends.fetch_add(1, Ordering::Acquire);
            if sender.send(message).is_err() {
                self.pending_sends.fetch_sub(1, Ordering::Release);
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, message: Outbound) {
        match message {
            Outbound::Store {
                key,
                payload,
                policy,
                targets,
            } => {
                for target in targets {
                    let result = match self.network.peer(&target) {
                        Ok(peer) => {
                            with_deadline(
                                self.propagation_deadline,
                                peer.store_replica(&key, payload.clone(), policy),
                            )
                            .await
                        }
                        Err(err) => Err(err),
                    };
                    if let Err(err) = result {
                        self.record_sync_error(&key, &target, &err);
                    }
                }
            }
            Outbound::Update {
                key,
                update,
                targets,
            } => {
                for target in targets {
                    let result = match self.network.peer(&target) {
                        Ok(peer) => {
                            with_deadline(
                                self.propagation_deadline,
                                peer.update_replica(&key, update.clone(), &self.local),
                            )
                            .await
                        }
                        Err(err) => Err(err),
                    };
                    if let Err(err) = result {
                        self.record_sync_error(&key, &target, &err);
                    }
                }
            }
        }
    }

    fn record_sync_error(&self, key: &str, member: &str, err: &TrellisError) {
        warn!(key = %key, peer = %member, error = %err, "replication propagation failed");
        if let Some(set) = self.sets.write().get_mut(key) {
            set.sync_errors.push(format!("{member}: {err}"));
        }
    }

    /// Waits until every queued propagation has been dispatched.
    pub async fn flush(&self) {
        while self.pending_sends.load(Ordering::Acquire) > 0 {
            tokio::task::yield_now().await;
        }
    }
}
