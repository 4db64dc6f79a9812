//! Engine configuration: nested per-subsystem sections with preset
//! constructors, optional TOML file loading, and environment seeding.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, TrellisError};

/// Environment variable carrying comma-separated seed member identifiers.
pub const SEEDS_ENV: &str = "TRELLIS_SEEDS";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub partitions: usize,
    pub points_per_member: usize,
    pub heartbeat_interval_ms: u64,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            partitions: 256,
            points_per_member: 64,
            heartbeat_interval_ms: 5_000,
            failure_threshold: 3,
            recovery_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub cleanup_interval_ms: u64,
    /// Overrides for the built-in classification TTLs, in seconds.
    pub session_ttl_secs: Option<u64>,
    pub computational_ttl_secs: Option<u64>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: 30_000,
            session_ttl_secs: None,
            computational_ttl_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub propagation_deadline_ms: u64,
    pub consistency_interval_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            propagation_deadline_ms: 5_000,
            consistency_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub forward_deadline_ms: u64,
    pub monitor_interval_ms: u64,
    pub drain_interval_ms: u64,
    pub optimize_interval_ms: u64,
    /// Item capacities per tier, used by the utilization penalty.
    pub hot_capacity: usize,
    pub warm_capacity: usize,
    pub cold_capacity: usize,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            forward_deadline_ms: 10_000,
            monitor_interval_ms: 60_000,
            drain_interval_ms: 10_000,
            optimize_interval_ms: 300_000,
            hot_capacity: 10_000,
            warm_capacity: 50_000,
            cold_capacity: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub phase_deadline_ms: u64,
    pub recovery_deadline_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            phase_deadline_ms: 60_000,
            recovery_deadline_ms: 30_000,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub lifecycle: LifecycleConfig,
    pub replication: ReplicationConfig,
    pub placement: PlacementConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Production preset: the defaults.
    pub fn production() -> Self {
        Self::default()
    }

    /// Tightened intervals for local development and integration tests.
    pub fn local_dev() -> Self {
        Self {
            cluster: ClusterConfig {
                heartbeat_interval_ms: 500,
                recovery_timeout_ms: 2_000,
                ..Default::default()
            },
            lifecycle: LifecycleConfig {
                cleanup_interval_ms: 1_000,
                ..Default::default()
            },
            replication: ReplicationConfig {
                propagation_deadline_ms: 1_000,
                consistency_interval_ms: 1_000,
            },
            placement: PlacementConfig {
                monitor_interval_ms: 2_000,
                drain_interval_ms: 500,
                optimize_interval_ms: 10_000,
                ..Default::default()
            },
            orchestrator: OrchestratorConfig {
                phase_deadline_ms: 5_000,
                recovery_deadline_ms: 2_000,
            },
        }
    }

    /// Loads configuration from a TOML file. Missing sections fall back to
    /// their defaults; a missing file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|err| TrellisError::Serialization(format!("config parse: {err}")))
    }

    /// Loads from the platform config directory when present, falling back
    /// to defaults otherwise.
    pub fn load_default() -> Self {
        let Some(dir) = dirs::config_dir() else {
            return Self::default();
        };
        let path = dir.join("trellis").join("config.toml");
        if path.exists() {
            Self::load(&path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Seed member identifiers from the environment, comma-separated.
    pub fn seed_peers() -> Vec<String> {
        std::env::var(SEEDS_ENV)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.cluster.heartbeat_interval_ms)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.recovery_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.lifecycle.cleanup_interval_ms)
    }

    pub fn propagation_deadline(&self) -> Duration {
        Duration::from_millis(self.replication.propagation_deadline_ms)
    }

    pub fn consistency_interval(&self) -> Duration {
        Duration::from_millis(self.replication.consistency_interval_ms)
    }

    pub fn phase_deadline(&self) -> Duration {
        Duration::from_millis(self.orchestrator.phase_deadline_ms)
    }
}
