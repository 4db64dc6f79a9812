//! The three storage tiers.
//!
//! Hot and warm are in-memory tables; cold writes one JSON file per key
//! under a data directory (falling back to an in-memory table when no
//! directory is configured, which the tests use). Tier lookups never block
//! writers to other tiers.

use std::path::PathBuf;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

use crate::config::PlacementConfig;
use crate::error::{Result, TrellisError};
use crate::replication::{now_millis, Payload};

use super::policy::Tier;

#[derive(Debug, Clone)]
struct StoredRecord {
    payload: Payload,
    stored_at_ms: u64,
    size_bytes: usize,
}

#[derive(Default)]
struct MemoryTier {
    records: RwLock<FxHashMap<String, StoredRecord>>,
}

impl MemoryTier {
    fn put(&self, key: &str, payload: Payload) {
        let record = StoredRecord {
            size_bytes: payload.approx_size(),
            payload,
            stored_at_ms: now_millis(),
        };
        self.records.write().insert(key.to_owned(), record);
    }

    fn get(&self, key: &str) -> Option<Payload> {
        self.records.read().get(key).map(|r| r.payload.clone())
    }

    fn remove(&self, key: &str) -> bool {
        self.records.write().remove(key).is_some()
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }

    fn keys_by_age(&self) -> Vec<String> {
        let records = self.records.read();
        let mut keys: Vec<(&String, u64)> = records
            .iter()
            .map(|(key, record)| (key, record.stored_at_ms))
            .collect();
        keys.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        keys.into_iter().map(|(key, _)| key.clone()).collect()
    }

    fn total_bytes(&self) -> usize {
        self.records.read().values().map(|r| r.size_bytes).sum()
    }
}

/// Cold tier: JSON-file-per-key when a directory is configured, otherwise
/// an in-memory table.
struct ColdTier {
    dir: Option<PathBuf>,
    index: MemoryTier,
}

impl ColdTier {
    fn new(dir: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = &dir {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            dir,
            index: MemoryTier::default(),
        })
    }

    fn file_for(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| {
            let hash = xxhash_rust::xxh64::xxh64(key.as_bytes(), 0);
            dir.join(format!("record-{hash:016x}.json"))
        })
    }

    fn put(&self, key: &str, payload: Payload) -> Result<()> {
        if let Some(path) = self.file_for(key) {
            let encoded = serde_json::to_vec_pretty(&payload)
                .map_err(|err| TrellisError::Serialization(err.to_string()))?;
            std::fs::write(path, encoded)?;
        }
        self.index.put(key, payload);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Payload>> {
        if let Some(record) = self.index.get(key) {
            return Ok(Some(record));
        }
        let Some(path) = self.file_for(key) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        let payload = serde_json::from_slice(&bytes)
            .map_err(|err| TrellisError::Serialization(err.to_string()))?;
        Ok(Some(payload))
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let had_index = self.index.remove(key);
        if let Some(path) = self.file_for(key) {
            if path.exists() {
                std::fs::remove_file(path)?;
                return Ok(true);
            }
        }
        Ok(had_index)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Per-tier occupancy snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TierStats {
    pub tier: Tier,
    pub records: usize,
    pub capacity: usize,
    pub utilization: f64,
    pub bytes: usize,
}

/// The hot/warm/cold store triple.
pub struct TierSet {
    hot: MemoryTier,
    warm: MemoryTier,
    cold: ColdTier,
    hot_capacity: usize,
    warm_capacity: usize,
    cold_capacity: usize,
}

impl TierSet {
    pub fn new(config: &PlacementConfig, cold_dir: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            hot: MemoryTier::default(),
            warm: MemoryTier::default(),
            cold: ColdTier::new(cold_dir)?,
            hot_capacity: config.hot_capacity,
            warm_capacity: config.warm_capacity,
            cold_capacity: config.cold_capacity,
        })
    }

    pub fn put(&self, tier: Tier, key: &str, payload: Payload) -> Result<()> {
        debug!(key = %key, tier = %tier, "storing record");
        match tier {
            Tier::Hot => {
                self.hot.put(key, payload);
                Ok(())
            }
            Tier::Warm => {
                self.warm.put(key, payload);
                Ok(())
            }
            Tier::Cold => self.cold.put(key, payload),
        }
    }

    pub fn get(&self, tier: Tier, key: &str) -> Result<Option<Payload>> {
        match tier {
            Tier::Hot => Ok(self.hot.get(key)),
            Tier::Warm => Ok(self.warm.get(key)),
            Tier::Cold => self.cold.get(key),
        }
    }

    pub fn remove(&self, tier: Tier, key: &str) -> Result<bool> {
        match tier {
            Tier::Hot => Ok(self.hot.remove(key)),
            Tier::Warm => Ok(self.warm.remove(key)),
            Tier::Cold => self.cold.remove(key),
        }
    }

    /// First tier holding the key, searching hot → warm → cold.
    pub fn locate(&self, key: &str) -> Result<Option<Tier>> {
        for tier in Tier::ALL {
            if self.get(tier, key)?.is_some() {
                return Ok(Some(tier));
            }
        }
        Ok(None)
    }

    /// Fetches the payload wherever it lives.
    pub fn fetch(&self, key: &str) -> Result<Option<(Tier, Payload)>> {
        for tier in Tier::ALL {
            if let Some(payload) = self.get(tier, key)? {
                return Ok(Some((tier, payload)));
            }
        }
        Ok(None)
    }

    /// Removes the key from every tier it appears in.
    pub fn purge(&self, key: &str) -> Result<bool> {
        let mut removed = false;
        for tier in Tier::ALL {
            removed |= self.remove(tier, key)?;
        }
        Ok(removed)
    }

    pub fn len(&self, tier: Tier) -> usize {
        match tier {
            Tier::Hot => self.hot.len(),
            Tier::Warm => self.warm.len(),
            Tier::Cold => self.cold.len(),
        }
    }

    pub fn capacity(&self, tier: Tier) -> usize {
        match tier {
            Tier::Hot => self.hot_capacity,
            Tier::Warm => self.warm_capacity,
            Tier::Cold => self.cold_capacity,
        }
    }

    pub fn utilization(&self, tier: Tier) -> f64 {
        let capacity = self.capacity(tier);
        if capacity == 0 {
            return 1.0;
        }
        self.len(tier) as f64 / capacity as f64
    }

    /// Keys in a tier, oldest first. Cold is intentionally excluded from
    /// age-based eviction sweeps, so only hot and warm answer.
    pub fn keys_by_age(&self, tier: Tier) -> Vec<String> {
        match tier {
            Tier::Hot => self.hot.keys_by_age(),
            Tier::Warm => self.warm.keys_by_age(),
            Tier::Cold => self.cold.index.keys_by_age(),
        }
    }

    pub fn stats(&self) -> Vec<TierStats> {
        Tier::ALL
            .iter()
            .map(|&tier| TierStats {
                tier,
                records: self.len(tier),
                capacity: self.capacity(tier),
                utilization: self.utilization(tier),
                bytes: match tier {
                    Tier::Hot => self.hot.total_bytes(),
                    Tier::Warm => self.warm.total_bytes(),
                    Tier::Cold => self.cold.index.total_bytes(),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropValue;

    fn tiers() -> TierSet {
        TierSet::new(&PlacementConfig::default(), None).unwrap()
    }

    fn scalar(n: i64) -> Payload {
        Payload::Scalar(PropValue::Int(n))
    }

    #[test]
    fn put_get_remove_each_tier() {
        let set = tiers();
        for tier in Tier::ALL {
            set.put(tier, "k", scalar(1)).unwrap();
            assert_eq!(set.get(tier, "k").unwrap(), Some(scalar(1)));
            assert!(set.remove(tier, "k").unwrap());
            assert_eq!(set.get(tier, "k").unwrap(), None);
        }
    }

    #[test]
    fn locate_prefers_hotter_tiers() {
        let set = tiers();
        set.put(Tier::Warm, "k", scalar(1)).unwrap();
        assert_eq!(set.locate("k").unwrap(), Some(Tier::Warm));
        set.put(Tier::Hot, "k", scalar(2)).unwrap();
        assert_eq!(set.locate("k").unwrap(), Some(Tier::Hot));
    }

    #[test]
    fn cold_tier_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let set = TierSet::new(&PlacementConfig::default(), Some(dir.path().to_path_buf()))
            .unwrap();
        set.put(Tier::Cold, "durable", scalar(42)).unwrap();

        // A fresh set over the same directory reads the file back.
        let reopened =
            TierSet::new(&PlacementConfig::default(), Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(reopened.get(Tier::Cold, "durable").unwrap(), Some(scalar(42)));
    }

    #[test]
    fn age_ordering_is_stable() {
        let set = tiers();
        set.put(Tier::Hot, "a", scalar(1)).unwrap();
        set.put(Tier::Hot, "b", scalar(2)).unwrap();
        set.put(Tier::Hot, "c", scalar(3)).unwrap();
        let keys = set.keys_by_age(Tier::Hot);
        assert_eq!(keys.len(), 3);
        // Same-millisecond inserts fall back to key order.
        assert!(keys.contains(&"a".to_string()));
    }
}
