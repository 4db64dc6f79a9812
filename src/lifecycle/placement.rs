//! Tier scoring and migration.
//!
//! Each record scores every tier on four weighted components
//! (performance 0.3, cost 0.3, durability 0.2, utilization 0.2); the
//! highest score wins. Migrations copy before they delete, and a source
//! delete that fails is deferred rather than lost, so the copy is
//! at-least-once and duplicates reconcile later.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PlacementConfig;
use crate::error::{Result, TrellisError};

use super::policy::{Classification, Tier};
use super::tiers::TierSet;

/// Severity of a memory-pressure signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureSeverity {
    Low,
    Medium,
    High,
}

impl PressureSeverity {
    /// Fraction of hot items to demote.
    fn hot_fraction(&self) -> f64 {
        match self {
            PressureSeverity::Low => 0.10,
            PressureSeverity::Medium => 0.25,
            PressureSeverity::High => 0.50,
        }
    }
}

/// Access profile of one record, used by the scoring model.
#[derive(Debug, Clone, Copy)]
pub struct RecordProfile {
    pub tag: Classification,
    pub size_bytes: usize,
    /// Accesses per minute since classification.
    pub access_freq: f64,
}

/// One queued tier migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migration {
    pub key: String,
    pub from: Tier,
    pub to: Tier,
}

/// Per-tier cost constants for the cost component.
fn tier_costs(tier: Tier) -> (f64, f64, f64) {
    // (memory cost per MB, cost per access, maintenance cost)
    match tier {
        Tier::Hot => (10.0, 0.1, 5.0),
        Tier::Warm => (5.0, 0.5, 10.0),
        Tier::Cold => (1.0, 2.0, 15.0),
    }
}

/// Score of `tier` for a record: `0.3*perf + 0.3*cost + 0.2*durability +
/// 0.2*utilization`, each component in `[0, 100]`.
pub fn score_tier(profile: &RecordProfile, tier: Tier, utilization: f64) -> f64 {
    let latency_req = profile.tag.latency_requirement();
    let performance = if tier.latency_rank() <= latency_req {
        100.0
    } else {
        100.0 - 40.0 * f64::from(tier.latency_rank() - latency_req)
    };

    let durability_req = profile.tag.durability_requirement();
    let durability = if tier.durability_rank() >= durability_req {
        100.0
    } else {
        100.0 - 40.0 * f64::from(durability_req - tier.durability_rank())
    };

    let (memory_cost, access_cost, maintenance) = tier_costs(tier);
    let size_mb = profile.size_bytes as f64 / (1024.0 * 1024.0);
    let cost =
        (100.0 - (size_mb * memory_cost + profile.access_freq * access_cost + maintenance)).max(0.0);

    let utilization_score = 100.0 - 50.0 * utilization.clamp(0.0, 2.0);

    0.3 * performance + 0.3 * cost + 0.2 * durability + 0.2 * utilization_score
}

/// Highest-scoring tier for a record; ties keep the hotter tier.
pub fn best_tier(profile: &RecordProfile, tiers: &TierSet) -> Tier {
    let mut best = Tier::Hot;
    let mut best_score = f64::MIN;
    for tier in Tier::ALL {
        let score = score_tier(profile, tier, tiers.utilization(tier));
        if score > best_score {
            best = tier;
            best_score = score;
        }
    }
    best
}

/// Migration driver over a shared [`TierSet`].
pub struct PlacementEngine {
    tiers: Arc<TierSet>,
    queue: Mutex<VecDeque<Migration>>,
    /// Source deletes that failed mid-migration, retried on drain ticks.
    deferred_deletes: Mutex<Vec<(Tier, String)>>,
    migrations_done: AtomicU64,
    drain_interval: Duration,
    monitor_interval: Duration,
    optimize_interval: Duration,
}

impl PlacementEngine {
    pub fn new(tiers: Arc<TierSet>, config: &PlacementConfig) -> Arc<Self> {
        Arc::new(Self {
            tiers,
            queue: Mutex::new(VecDeque::new()),
            deferred_deletes: Mutex::new(Vec::new()),
            migrations_done: AtomicU64::new(0),
            drain_interval: Duration::from_millis(config.drain_interval_ms),
            monitor_interval: Duration::from_millis(config.monitor_interval_ms),
            optimize_interval: Duration::from_millis(config.optimize_interval_ms),
        })
    }

    pub fn tiers(&self) -> &Arc<TierSet> {
        &self.tiers
    }

    pub fn migrations_done(&self) -> u64 {
        self.migrations_done.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn enqueue(&self, migration: Migration) {
        debug!(key = %migration.key, from = %migration.from, to = %migration.to, "queued migration");
        self.queue.lock().push_back(migration);
    }

    /// Copies a record to the target tier, verifies the copy, then deletes
    /// the source. A failing source delete is deferred, leaving a
    /// duplicate that later drains reconcile.
    pub fn migrate(&self, key: &str, from: Tier, to: Tier) -> Result<()> {
        if from == to {
            return Ok(());
        }
        let payload = self
            .tiers
            .get(from, key)?
            .ok_or_else(|| TrellisError::ConstraintViolation(format!(
                "record '{key}' is not in the {from} tier"
            )))?;
        self.tiers.put(to, key, payload.clone())?;
        let verified = self.tiers.get(to, key)?;
        if verified.as_ref() != Some(&payload) {
            return Err(TrellisError::ConstraintViolation(format!(
                "verification failed migrating '{key}' to {to}"
            )));
        }
        if let Err(err) = self.tiers.remove(from, key) {
            warn!(key = %key, tier = %from, error = %err, "source delete deferred");
            self.deferred_deletes.lock().push((from, key.to_owned()));
        }
        self.migrations_done.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, from = %from, to = %to, "migrated record");
        Ok(())
    }

    /// Processes every queued migration and retries deferred deletes.
    /// Returns the number of migrations completed.
    pub fn drain(&self) -> usize {
        let pending: Vec<Migration> = self.queue.lock().drain(..).collect();
        let mut done = 0;
        for migration in pending {
            match self.migrate(&migration.key, migration.from, migration.to) {
                Ok(()) => done += 1,
                Err(err) => {
                    warn!(key = %migration.key, error = %err, "migration failed");
                }
            }
        }

        let deferred: Vec<(Tier, String)> =
            std::mem::take(&mut *self.deferred_deletes.lock());
        for (tier, key) in deferred {
            if self.tiers.remove(tier, &key).is_err() {
                self.deferred_deletes.lock().push((tier, key));
            }
        }
        done
    }

    /// Responds to a memory-pressure signal by demoting hot items (oldest
    /// first); high severity additionally spills 30% of warm to cold.
    /// Returns the number of migrations enqueued.
    pub fn memory_pressure(&self, severity: PressureSeverity) -> usize {
        let mut enqueued = 0;
        let hot_keys = self.tiers.keys_by_age(Tier::Hot);
        let demote = ((hot_keys.len() as f64) * severity.hot_fraction()).ceil() as usize;
        for key in hot_keys.into_iter().take(demote) {
            self.enqueue(Migration {
                key,
                from: Tier::Hot,
                to: Tier::Warm,
            });
            enqueued += 1;
        }
        if severity == PressureSeverity::High {
            let warm_keys = self.tiers.keys_by_age(Tier::Warm);
            let spill = ((warm_keys.len() as f64) * 0.30).ceil() as usize;
            for key in warm_keys.into_iter().take(spill) {
                self.enqueue(Migration {
                    key,
                    from: Tier::Warm,
                    to: Tier::Cold,
                });
                enqueued += 1;
            }
        }
        info!(severity = ?severity, enqueued, "memory pressure response queued");
        enqueued
    }

    /// Rescores each record in `profiles` and enqueues a migration when a
    /// different tier wins. Returns enqueued count.
    pub fn optimize(&self, profiles: &[(String, RecordProfile)]) -> Result<usize> {
        let mut enqueued = 0;
        for (key, profile) in profiles {
            let Some(current) = self.tiers.locate(key)? else {
                continue;
            };
            let target = best_tier(profile, &self.tiers);
            if target != current {
                self.enqueue(Migration {
                    key: key.clone(),
                    from: current,
                    to: target,
                });
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    /// Migration-queue drain loop (10 s default).
    pub async fn run_drain_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.drain_interval).await;
            self.drain();
        }
    }

    /// Tier monitor loop (60 s default): logs occupancy and demotes out of
    /// an over-full hot tier.
    pub async fn run_monitor_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.monitor_interval).await;
            for stat in self.tiers.stats() {
                debug!(tier = %stat.tier, records = stat.records, utilization = stat.utilization, "tier status");
            }
            if self.tiers.utilization(Tier::Hot) > 0.9 {
                self.memory_pressure(PressureSeverity::Low);
            }
        }
    }

    pub fn optimize_interval(&self) -> Duration {
        self.optimize_interval
    }
}
