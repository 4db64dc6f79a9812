//! Data-lifecycle management: classification, access tracking, placement,
//! and TTL cleanup.
//!
//! The manager records a classification per key, computes where the key
//! should live (primary and replica members via the partition ring, tier
//! via the tag's policy), and evicts idle records whose tag carries a
//! finite TTL on the periodic cleanup tick.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cluster::{ClusterManager, MemberId};
use crate::config::LifecycleConfig;
use crate::error::{Result, TrellisError};

pub mod placement;
pub mod policy;
pub mod tiers;

pub use placement::{
    best_tier, score_tier, Migration, PlacementEngine, PressureSeverity, RecordProfile,
};
pub use policy::{Classification, EvictionPriority, LifecyclePolicy, Tier};
pub use tiers::{TierSet, TierStats};

/// Where a classified key should live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub key: String,
    pub tag: Classification,
    pub primary: MemberId,
    pub replicas: Vec<MemberId>,
    pub tier: Tier,
}

#[derive(Debug, Clone)]
struct RecordMeta {
    tag: Classification,
    metadata: BTreeMap<String, String>,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
    placement: Placement,
}

/// Aggregate lifecycle counters.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleStats {
    pub total: usize,
    pub ephemeral: usize,
    pub session: usize,
    pub computational: usize,
    pub persistent: usize,
}

pub struct LifecycleManager {
    cluster: Arc<ClusterManager>,
    records: RwLock<FxHashMap<String, RecordMeta>>,
    cleanup_interval: Duration,
    session_ttl: Option<Duration>,
    computational_ttl: Option<Duration>,
}

impl LifecycleManager {
    pub fn new(cluster: Arc<ClusterManager>, config: &LifecycleConfig) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            records: RwLock::new(FxHashMap::default()),
            cleanup_interval: Duration::from_millis(config.cleanup_interval_ms),
            session_ttl: config.session_ttl_secs.map(Duration::from_secs),
            computational_ttl: config.computational_ttl_secs.map(Duration::from_secs),
        })
    }

    /// Effective TTL for a tag, honoring configuration overrides.
    pub fn ttl_for(&self, tag: Classification) -> Option<Duration> {
        match tag {
            Classification::Session => self.session_ttl.or(tag.policy().ttl),
            Classification::Computational => self.computational_ttl.or(tag.policy().ttl),
            _ => tag.policy().ttl,
        }
    }

    /// Classifies `key`, recording its metadata and computing the initial
    /// placement. Re-classifying with the same tag under stable membership
    /// yields the same placement.
    pub fn classify(
        &self,
        key: &str,
        tag: Classification,
        metadata: BTreeMap<String, String>,
    ) -> Result<Placement> {
        let placement = self.compute_placement(key, tag)?;
        let now = Instant::now();
        let mut records = self.records.write();
        let meta = records
            .entry(key.to_owned())
            .or_insert_with(|| RecordMeta {
                tag,
                metadata: metadata.clone(),
                created_at: now,
                last_accessed: now,
                access_count: 0,
                placement: placement.clone(),
            });
        meta.tag = tag;
        meta.metadata = metadata;
        meta.placement = placement.clone();
        debug!(key = %key, tag = %tag, primary = %placement.primary, "classified record");
        Ok(placement)
    }

    fn compute_placement(&self, key: &str, tag: Classification) -> Result<Placement> {
        let policy = tag.policy();
        let members = self.cluster.replica_owners(key, policy.min_replicas);
        let primary = members
            .first()
            .cloned()
            .ok_or_else(|| TrellisError::ClusterUnavailable("no members for placement".into()))?;
        Ok(Placement {
            key: key.to_owned(),
            tag,
            primary,
            replicas: members.into_iter().skip(1).collect(),
            tier: policy.primary_tier,
        })
    }

    /// Adopts a placement plan forwarded by a peer, recording (or
    /// refreshing) the key's lifecycle state without recomputing.
    pub fn adopt(&self, placement: Placement) {
        let now = Instant::now();
        let mut records = self.records.write();
        let entry = records
            .entry(placement.key.clone())
            .or_insert_with(|| RecordMeta {
                tag: placement.tag,
                metadata: BTreeMap::new(),
                created_at: now,
                last_accessed: now,
                access_count: 0,
                placement: placement.clone(),
            });
        entry.tag = placement.tag;
        entry.placement = placement;
    }

    /// Records an access, bumping the counter and the idle timer. Returns
    /// the new access count.
    pub fn touch(&self, key: &str) -> Result<u64> {
        let mut records = self.records.write();
        let meta = records.get_mut(key).ok_or_else(|| {
            TrellisError::ConstraintViolation(format!("key '{key}' is not classified"))
        })?;
        meta.access_count += 1;
        meta.last_accessed = Instant::now();
        Ok(meta.access_count)
    }

    /// Access count for a key; zero when unclassified. Serves the
    /// `get_access_count` peer RPC.
    pub fn access_count(&self, key: &str) -> u64 {
        self.records
            .read()
            .get(key)
            .map(|meta| meta.access_count)
            .unwrap_or(0)
    }

    /// Primary plus up to `n - 1` replica members for a key.
    pub fn replica_nodes(&self, key: &str, n: usize) -> Vec<MemberId> {
        self.cluster.replica_owners(key, n)
    }

    /// Current placement of a classified key.
    pub fn placement(&self, key: &str) -> Option<Placement> {
        self.records.read().get(key).map(|m| m.placement.clone())
    }

    pub fn classification(&self, key: &str) -> Option<Classification> {
        self.records.read().get(key).map(|m| m.tag)
    }

    /// Access profile used by the placement scorer.
    pub fn profile(&self, key: &str, size_bytes: usize) -> Option<RecordProfile> {
        let records = self.records.read();
        let meta = records.get(key)?;
        let minutes = meta.created_at.elapsed().as_secs_f64() / 60.0;
        let access_freq = if minutes > 0.0 {
            meta.access_count as f64 / minutes
        } else {
            meta.access_count as f64
        };
        Some(RecordProfile {
            tag: meta.tag,
            size_bytes,
            access_freq,
        })
    }

    /// Recomputes placement for every record that referenced a departed
    /// member. Call after the cluster manager has dropped the member.
    /// Returns the changed placements.
    pub fn handle_member_departure(&self, member: &str) -> Vec<Placement> {
        let mut changed = Vec::new();
        let mut records = self.records.write();
        for (key, meta) in records.iter_mut() {
            let involved = meta.placement.primary == member
                || meta.placement.replicas.iter().any(|m| m == member);
            if !involved {
                continue;
            }
            if let Ok(placement) = self.compute_placement(key, meta.tag) {
                meta.placement = placement.clone();
                changed.push(placement);
            }
        }
        if !changed.is_empty() {
            info!(member = %member, records = changed.len(), "recomputed placements after departure");
        }
        changed
    }

    /// Evicts records with a finite TTL that have been idle past it.
    /// Returns the evicted keys; callers drop the payloads from the tiers.
    pub fn cleanup_at(&self, now: Instant) -> Vec<String> {
        let mut evicted = Vec::new();
        let mut records = self.records.write();
        records.retain(|key, meta| {
            let Some(ttl) = self.ttl_for(meta.tag) else {
                return true;
            };
            let idle = now.saturating_duration_since(meta.last_accessed);
            if idle > ttl {
                evicted.push(key.clone());
                false
            } else {
                true
            }
        });
        if !evicted.is_empty() {
            info!(evicted = evicted.len(), "lifecycle cleanup evicted idle records");
        }
        evicted
    }

    pub fn cleanup(&self) -> Vec<String> {
        self.cleanup_at(Instant::now())
    }

    /// Drops a record's lifecycle state (used after explicit deletion).
    pub fn forget(&self, key: &str) -> bool {
        self.records.write().remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    /// Keys carrying a specific tag.
    pub fn keys_tagged(&self, tag: Classification) -> Vec<String> {
        self.records
            .read()
            .iter()
            .filter(|(_, meta)| meta.tag == tag)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn stats(&self) -> LifecycleStats {
        let records = self.records.read();
        let mut stats = LifecycleStats {
            total: records.len(),
            ephemeral: 0,
            session: 0,
            computational: 0,
            persistent: 0,
        };
        for meta in records.values() {
            match meta.tag {
                Classification::Ephemeral => stats.ephemeral += 1,
                Classification::Session => stats.session += 1,
                Classification::Computational => stats.computational += 1,
                Classification::Persistent => stats.persistent += 1,
            }
        }
        stats
    }

    /// The policy table, for operator inspection.
    pub fn policies() -> Vec<(Classification, LifecyclePolicy)> {
        Classification::ALL
            .iter()
            .map(|&tag| (tag, tag.policy()))
            .collect()
    }

    /// Cleanup loop (30 s default); the timer re-arms after each tick so
    /// ticks never overlap. Evicted payloads are purged from `tiers`.
    pub async fn run_cleanup_loop(self: Arc<Self>, tiers: Arc<TierSet>) {
        loop {
            tokio::time::sleep(self.cleanup_interval).await;
            for key in self.cleanup() {
                let _ = tiers.purge(&key);
            }
        }
    }
}
