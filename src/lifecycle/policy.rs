//! Classification tags and the per-tag lifecycle policy table.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};

/// Storage tier, ordered hot → warm → cold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Hot, Tier::Warm, Tier::Cold];

    /// Latency class rank: 0 fastest.
    pub(crate) fn latency_rank(&self) -> u8 {
        match self {
            Tier::Hot => 0,
            Tier::Warm => 1,
            Tier::Cold => 2,
        }
    }

    /// Durability class rank: 0 weakest.
    pub(crate) fn durability_rank(&self) -> u8 {
        match self {
            Tier::Hot => 0,
            Tier::Warm => 1,
            Tier::Cold => 2,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        })
    }
}

impl std::str::FromStr for Tier {
    type Err = TrellisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(Tier::Hot),
            "warm" => Ok(Tier::Warm),
            "cold" => Ok(Tier::Cold),
            other => Err(TrellisError::Validation(format!("unknown tier '{other}'"))),
        }
    }
}

/// How eagerly a record may be evicted under pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPriority {
    Never,
    Low,
    Medium,
    High,
}

/// Record classification. A closed set; each tag fixes TTL, replication
/// floor, primary tier, and eviction priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Ephemeral,
    Session,
    Computational,
    Persistent,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::Ephemeral,
        Classification::Session,
        Classification::Computational,
        Classification::Persistent,
    ];

    pub fn policy(&self) -> LifecyclePolicy {
        match self {
            Classification::Ephemeral => LifecyclePolicy {
                ttl: None,
                min_replicas: 1,
                primary_tier: Tier::Hot,
                eviction: EvictionPriority::Low,
            },
            Classification::Session => LifecyclePolicy {
                ttl: Some(Duration::from_secs(1800)),
                min_replicas: 1,
                primary_tier: Tier::Hot,
                eviction: EvictionPriority::High,
            },
            Classification::Computational => LifecyclePolicy {
                ttl: Some(Duration::from_secs(3600)),
                min_replicas: 2,
                primary_tier: Tier::Warm,
                eviction: EvictionPriority::Medium,
            },
            Classification::Persistent => LifecyclePolicy {
                ttl: None,
                min_replicas: 3,
                primary_tier: Tier::Cold,
                eviction: EvictionPriority::Never,
            },
        }
    }

    /// Latency demanded of the record's tier: 0 fastest, 2 relaxed.
    pub(crate) fn latency_requirement(&self) -> u8 {
        match self {
            Classification::Ephemeral | Classification::Session => 0,
            Classification::Computational => 1,
            Classification::Persistent => 2,
        }
    }

    /// Durability demanded: 0 none, 2 durable.
    pub(crate) fn durability_requirement(&self) -> u8 {
        match self {
            Classification::Ephemeral | Classification::Session => 0,
            Classification::Computational => 1,
            Classification::Persistent => 2,
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Classification::Ephemeral => "ephemeral",
            Classification::Session => "session",
            Classification::Computational => "computational",
            Classification::Persistent => "persistent",
        })
    }
}

impl std::str::FromStr for Classification {
    type Err = TrellisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ephemeral" => Ok(Classification::Ephemeral),
            "session" => Ok(Classification::Session),
            "computational" => Ok(Classification::Computational),
            "persistent" => Ok(Classification::Persistent),
            other => Err(TrellisError::Validation(format!(
                "unknown classification '{other}'"
            ))),
        }
    }
}

/// Per-tag lifecycle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LifecyclePolicy {
    /// `None` means no TTL expiry (ephemeral stays idle-evictable under
    /// memory pressure; persistent is never evicted).
    #[serde(serialize_with = "serialize_ttl")]
    pub ttl: Option<Duration>,
    pub min_replicas: usize,
    pub primary_tier: Tier,
    pub eviction: EvictionPriority,
}

fn serialize_ttl<S: serde::Serializer>(
    ttl: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match ttl {
        Some(d) => serializer.serialize_some(&d.as_secs()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_table_matches_contract() {
        let session = Classification::Session.policy();
        assert_eq!(session.ttl, Some(Duration::from_secs(1800)));
        assert_eq!(session.min_replicas, 1);
        assert_eq!(session.primary_tier, Tier::Hot);
        assert_eq!(session.eviction, EvictionPriority::High);

        let computational = Classification::Computational.policy();
        assert_eq!(computational.ttl, Some(Duration::from_secs(3600)));
        assert_eq!(computational.min_replicas, 2);
        assert_eq!(computational.primary_tier, Tier::Warm);

        let persistent = Classification::Persistent.policy();
        assert_eq!(persistent.ttl, None);
        assert_eq!(persistent.min_replicas, 3);
        assert_eq!(persistent.primary_tier, Tier::Cold);
        assert_eq!(persistent.eviction, EvictionPriority::Never);

        let ephemeral = Classification::Ephemeral.policy();
        assert_eq!(ephemeral.ttl, None);
        assert_eq!(ephemeral.min_replicas, 1);
        assert_eq!(ephemeral.primary_tier, Tier::Hot);
    }

    #[test]
    fn tags_parse_round_trip() {
        for tag in Classification::ALL {
            let parsed: Classification = tag.to_string().parse().unwrap();
            assert_eq!(parsed, tag);
        }
        assert!("permanent".parse::<Classification>().is_err());
    }
}
