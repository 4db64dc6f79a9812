//! Cluster node facade.
//!
//! Wires the graph store, query engine, cluster manager, health monitor,
//! lifecycle, placement, replication, and orchestrator into one unit,
//! registers the node's peer-RPC server on the network, and owns the
//! background task handles.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cluster::{ClusterManager, HealthMonitor, MemberId};
use crate::config::Config;
use crate::error::{Result, TrellisError};
use crate::lifecycle::{
    Classification, LifecycleManager, Placement, PlacementEngine, TierSet,
};
use crate::orchestrator::{
    Orchestrator, ShutdownKind, StartupKind, TransitionReport,
};
use crate::query::QueryEngine;
use crate::replication::{Payload, ReplicaUpdate, ReplicationEngine, ReplicationPolicy};
use crate::rpc::{InProcessNetwork, PeerProbe, PeerRpc};
use crate::store::{GraphStore, Mutation};

/// Construction options for a [`ClusterNode`].
pub struct NodeOptions {
    pub member_id: MemberId,
    pub config: Config,
    /// Directory for cluster-state snapshots; `None` disables persistence.
    pub snapshot_dir: Option<PathBuf>,
    /// Directory backing the cold tier; `None` keeps it in memory.
    pub cold_dir: Option<PathBuf>,
    /// Mirror graph mutations into the replication layer.
    pub replicate_graph: bool,
}

impl NodeOptions {
    pub fn new(member_id: impl Into<MemberId>) -> Self {
        Self {
            member_id: member_id.into(),
            config: Config::default(),
            snapshot_dir: None,
            cold_dir: None,
            replicate_graph: false,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: PathBuf) -> Self {
        self.snapshot_dir = Some(dir);
        self
    }

    pub fn with_cold_dir(mut self, dir: PathBuf) -> Self {
        self.cold_dir = Some(dir);
        self
    }

    pub fn with_graph_replication(mut self) -> Self {
        self.replicate_graph = true;
        self
    }
}

/// One member's full engine stack.
pub struct ClusterNode {
    store: Arc<GraphStore>,
    query: QueryEngine,
    cluster: Arc<ClusterManager>,
    health: Arc<HealthMonitor>,
    lifecycle: Arc<LifecycleManager>,
    tiers: Arc<TierSet>,
    placement: Arc<PlacementEngine>,
    replication: Arc<ReplicationEngine>,
    orchestrator: Arc<Orchestrator>,
    network: Arc<InProcessNetwork>,
    paused: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClusterNode {
    /// Builds the engine stack and registers this member on the network.
    pub fn new(options: NodeOptions, network: Arc<InProcessNetwork>) -> Result<Arc<Self>> {
        let config = options.config;
        let store = Arc::new(GraphStore::new());
        let query = QueryEngine::new(Arc::clone(&store));
        let cluster = Arc::new(ClusterManager::new(options.member_id.clone(), &config.cluster));
        let health = Arc::new(HealthMonitor::new(&config.cluster));
        let lifecycle = LifecycleManager::new(Arc::clone(&cluster), &config.lifecycle);
        let tiers = Arc::new(TierSet::new(&config.placement, options.cold_dir)?);
        let placement = PlacementEngine::new(Arc::clone(&tiers), &config.placement);
        let replication =
            ReplicationEngine::new(Arc::clone(&cluster), Arc::clone(&network), &config.replication);
        let paused = Arc::new(AtomicBool::new(false));
        let orchestrator = Orchestrator::new(
            Arc::clone(&cluster),
            Arc::clone(&lifecycle),
            Arc::clone(&placement),
            Arc::clone(&replication),
            Arc::clone(&network),
            options.snapshot_dir,
            &config.orchestrator,
            Arc::clone(&paused),
        );

        let node = Arc::new(Self {
            store,
            query,
            cluster,
            health,
            lifecycle,
            tiers,
            placement,
            replication,
            orchestrator,
            network: Arc::clone(&network),
            paused,
            tasks: Mutex::new(Vec::new()),
        });

        if options.replicate_graph {
            node.install_graph_replication();
        }

        let server: Arc<dyn PeerRpc> = Arc::new(PeerServer {
            lifecycle: Arc::clone(&node.lifecycle),
            replication: Arc::clone(&node.replication),
            paused: Arc::clone(&node.paused),
        });
        network.register(node.cluster.local().clone(), server);
        Ok(node)
    }

    /// Mirrors committed graph mutations into adaptive replica sets keyed
    /// `node:<id>` / `edge:<id>`.
    fn install_graph_replication(self: &Arc<Self>) {
        let replication = Arc::clone(&self.replication);
        self.store.set_observer(Arc::new(move |mutation: &Mutation| {
            let (key, payload) = match mutation {
                Mutation::NodeCreated(node) | Mutation::NodeUpdated(node) => (
                    format!("node:{}", node.id),
                    Some(Payload::Node {
                        id: node.id,
                        properties: node.properties.clone(),
                    }),
                ),
                Mutation::EdgeCreated(edge) | Mutation::EdgeUpdated(edge) => (
                    format!("edge:{}", edge.id),
                    Some(Payload::Edge {
                        from: edge.from,
                        to: edge.to,
                        label: edge.label.clone(),
                        properties: edge.properties.clone(),
                    }),
                ),
                Mutation::NodeDeleted(id) => (format!("node:{id}"), None),
                Mutation::EdgeDeleted(id) => (format!("edge:{id}"), None),
            };
            match payload {
                Some(payload) => {
                    let result = match replication.update(&key, payload.clone()) {
                        Ok(()) => Ok(()),
                        Err(TrellisError::ConstraintViolation(_)) => replication
                            .create(&key, ReplicationPolicy::Adaptive, payload)
                            .map(|_| ()),
                        Err(err) => Err(err),
                    };
                    if let Err(err) = result {
                        warn!(key = %key, error = %err, "graph replication intent failed");
                    }
                }
                None => {
                    // Deletions do not tear down the replica set eagerly;
                    // TTL cleanup reclaims the key.
                }
            }
        }));
    }

    pub fn local(&self) -> &MemberId {
        self.cluster.local()
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn query(&self) -> &QueryEngine {
        &self.query
    }

    pub fn cluster(&self) -> &Arc<ClusterManager> {
        &self.cluster
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn tiers(&self) -> &Arc<TierSet> {
        &self.tiers
    }

    pub fn placement(&self) -> &Arc<PlacementEngine> {
        &self.placement
    }

    pub fn replication(&self) -> &Arc<ReplicationEngine> {
        &self.replication
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Joins a peer into the local membership after verifying it is
    /// reachable. Transport failures come back with a recovery suggestion
    /// attached to the log.
    pub fn join_cluster(&self, peer: &str) -> Result<()> {
        if !self.network.contains(peer) {
            let err = TrellisError::ConnectionFailed(peer.to_owned());
            if let Some(hint) = err.recovery_suggestion() {
                warn!(peer = %peer, hint, "cluster join failed");
            }
            return Err(err);
        }
        self.cluster.join(peer.to_owned())?;
        self.health.watch(peer.to_owned());
        Ok(())
    }

    /// Classifies a key and stores its payload in the tier the
    /// classification demands.
    pub fn classify_and_store(
        &self,
        key: &str,
        tag: Classification,
        payload: Payload,
        metadata: BTreeMap<String, String>,
    ) -> Result<Placement> {
        let placement = self.lifecycle.classify(key, tag, metadata)?;
        self.tiers.put(placement.tier, key, payload)?;
        Ok(placement)
    }

    /// Spawns the periodic background work: heartbeats, lifecycle cleanup,
    /// consistency checks, tier monitoring, migration drains, and
    /// placement optimization. Each loop re-arms its own timer.
    pub fn start_background(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let probe: Arc<dyn PeerProbe> = Arc::clone(&self.network) as Arc<dyn PeerProbe>;
        let node = Arc::clone(self);
        let departure = Arc::new(move |member: &MemberId| {
            node.on_peer_departed(member);
        });
        tasks.push(tokio::spawn(Arc::clone(&self.health).run(
            Arc::clone(&self.cluster),
            probe,
            departure,
        )));
        tasks.push(tokio::spawn(
            Arc::clone(&self.lifecycle).run_cleanup_loop(Arc::clone(&self.tiers)),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&self.replication).run_consistency_loop(),
        ));
        tasks.push(tokio::spawn(Arc::clone(&self.placement).run_drain_loop()));
        tasks.push(tokio::spawn(Arc::clone(&self.placement).run_monitor_loop()));

        let node = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let interval = node.placement.optimize_interval();
            loop {
                tokio::time::sleep(interval).await;
                node.optimize_placements();
            }
        }));
        info!(local = %self.cluster.local(), "background loops started");
    }

    /// Rescores every classified record and queues any migrations.
    pub fn optimize_placements(&self) -> usize {
        let profiles: Vec<_> = self
            .lifecycle
            .keys()
            .into_iter()
            .filter_map(|key| {
                let size = self
                    .tiers
                    .fetch(&key)
                    .ok()
                    .flatten()
                    .map(|(_, payload)| payload.approx_size())?;
                let profile = self.lifecycle.profile(&key, size)?;
                Some((key, profile))
            })
            .collect();
        self.placement.optimize(&profiles).unwrap_or(0)
    }

    /// Full departure handling: membership, lifecycle placement, replica
    /// sets, and health bookkeeping.
    pub fn on_peer_departed(&self, member: &str) {
        info!(peer = %member, "handling peer departure");
        if self.cluster.remove(member).is_err() {
            return;
        }
        self.lifecycle.handle_member_departure(member);
        self.replication.handle_peer_failure(member);
        self.health.forget(member);
    }

    pub fn stop_background(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    pub async fn graceful_shutdown(&self, kind: ShutdownKind) -> Result<TransitionReport> {
        let report = self.orchestrator.graceful_shutdown(kind).await;
        self.stop_background();
        report
    }

    pub async fn coordinate_startup(&self, kind: StartupKind) -> Result<TransitionReport> {
        let report = self.orchestrator.coordinate_startup(kind).await?;
        // Re-register in case a prior shutdown deregistered this member.
        let server: Arc<dyn PeerRpc> = Arc::new(PeerServer {
            lifecycle: Arc::clone(&self.lifecycle),
            replication: Arc::clone(&self.replication),
            paused: Arc::clone(&self.paused),
        });
        self.network.register(self.cluster.local().clone(), server);
        Ok(report)
    }

    pub async fn emergency_failover(&self, surviving: &[MemberId]) -> Result<TransitionReport> {
        self.orchestrator.emergency_failover(surviving).await
    }
}

impl Drop for ClusterNode {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Server half of the peer RPC surface, registered on the network under
/// this member's identifier.
struct PeerServer {
    lifecycle: Arc<LifecycleManager>,
    replication: Arc<ReplicationEngine>,
    paused: Arc<AtomicBool>,
}

impl PeerServer {
    fn check_accepting(&self) -> Result<()> {
        if self.paused.load(Ordering::Acquire) {
            return Err(TrellisError::ClusterUnavailable(
                "member is paused for a cluster transition".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerRpc for PeerServer {
    async fn store_replica(
        &self,
        key: &str,
        payload: Payload,
        policy: ReplicationPolicy,
    ) -> Result<()> {
        self.check_accepting()?;
        self.replication.accept_store(key, payload, policy);
        Ok(())
    }

    async fn update_replica(
        &self,
        key: &str,
        update: ReplicaUpdate,
        source: &MemberId,
    ) -> Result<()> {
        self.check_accepting()?;
        self.replication.accept_update(key, update, source)
    }

    async fn forward_placement(&self, plan: Placement) -> Result<()> {
        self.check_accepting()?;
        self.lifecycle.adopt(plan);
        Ok(())
    }

    async fn get_access_count(&self, key: &str) -> Result<u64> {
        Ok(self.lifecycle.access_count(key))
    }

    async fn pause_operations(&self) -> Result<()> {
        self.paused.store(true, Ordering::Release);
        Ok(())
    }

    async fn resume_operations(&self) -> Result<()> {
        self.paused.store(false, Ordering::Release);
        Ok(())
    }
}
