//! Consistent-hash partition ring.
//!
//! Each member contributes a fixed number of virtual points hashed from
//! `(member, i)`; the ring is the sorted sequence of `(hash, member)`. A
//! key is owned by the first point whose hash is greater than or equal to
//! the key's hash, wrapping at the end. The hash function (xxh64, seed 0)
//! is pinned: changing it changes every placement.

use xxhash_rust::xxh64::xxh64;

use super::MemberId;

/// Default number of logical partitions.
pub const DEFAULT_PARTITIONS: usize = 256;

/// Virtual points contributed by each member.
pub const POINTS_PER_MEMBER: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct PartitionRing {
    points: Vec<(u64, MemberId)>,
    partitions: usize,
    points_per_member: usize,
}

pub(crate) fn hash_key(key: &str) -> u64 {
    xxh64(key.as_bytes(), 0)
}

fn hash_point(member: &str, index: usize) -> u64 {
    xxh64(format!("{member}:{index}").as_bytes(), 0)
}

impl PartitionRing {
    pub fn new(partitions: usize, points_per_member: usize) -> Self {
        Self {
            points: Vec::new(),
            partitions,
            points_per_member,
        }
    }

    /// Rebuilds the ring from the full membership. `O(P * |members|)`.
    pub fn rebuild(&mut self, members: &[MemberId]) {
        self.points.clear();
        for member in members {
            for i in 0..self.points_per_member {
                self.points.push((hash_point(member, i), member.clone()));
            }
        }
        self.points.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Owning member for `key`: first point at or after the key hash,
    /// wrapping past the end.
    pub fn owner(&self, key: &str) -> Option<&MemberId> {
        self.owner_of_hash(hash_key(key))
    }

    fn owner_of_hash(&self, hash: u64) -> Option<&MemberId> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self
            .points
            .partition_point(|(point, _)| *point < hash);
        let idx = if idx == self.points.len() { 0 } else { idx };
        Some(&self.points[idx].1)
    }

    /// Primary plus up to `n - 1` distinct non-primary members, chosen by
    /// hashing `(key, i)` for increasing `i`. Stops early when membership
    /// is exhausted.
    pub fn replica_owners(&self, key: &str, n: usize) -> Vec<MemberId> {
        let mut owners = Vec::new();
        let Some(primary) = self.owner(key) else {
            return owners;
        };
        owners.push(primary.clone());
        let distinct_members = {
            let mut members: Vec<&MemberId> = self.points.iter().map(|(_, m)| m).collect();
            members.sort();
            members.dedup();
            members.len()
        };
        let want = n.min(distinct_members);
        let mut i = 1usize;
        // Bounded probe: each round hashes a derived key; duplicates skip.
        while owners.len() < want && i < self.points_per_member * distinct_members.max(1) * 4 {
            let candidate = self.owner_of_hash(hash_key(&format!("{key}:{i}")));
            if let Some(member) = candidate {
                if !owners.contains(member) {
                    owners.push(member.clone());
                }
            }
            i += 1;
        }
        owners
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_of(members: &[&str]) -> PartitionRing {
        let mut ring = PartitionRing::new(DEFAULT_PARTITIONS, POINTS_PER_MEMBER);
        let members: Vec<MemberId> = members.iter().map(|m| m.to_string()).collect();
        ring.rebuild(&members);
        ring
    }

    #[test]
    fn empty_ring_owns_nothing() {
        let ring = PartitionRing::new(DEFAULT_PARTITIONS, POINTS_PER_MEMBER);
        assert!(ring.owner("key").is_none());
    }

    #[test]
    fn ownership_is_deterministic() {
        let ring = ring_of(&["m1", "m2", "m3"]);
        let owner_a = ring.owner("some-key").unwrap().clone();
        let owner_b = ring.owner("some-key").unwrap().clone();
        assert_eq!(owner_a, owner_b);

        let rebuilt = ring_of(&["m3", "m1", "m2"]);
        assert_eq!(rebuilt.owner("some-key").unwrap(), &owner_a);
    }

    #[test]
    fn keys_spread_across_members() {
        let ring = ring_of(&["m1", "m2", "m3"]);
        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            seen.insert(ring.owner(&format!("key-{i}")).unwrap().clone());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn replica_owners_are_distinct() {
        let ring = ring_of(&["m1", "m2", "m3", "m4"]);
        let owners = ring.replica_owners("record-1", 3);
        assert_eq!(owners.len(), 3);
        let set: std::collections::HashSet<_> = owners.iter().collect();
        assert_eq!(set.len(), 3);
        assert_eq!(&owners[0], ring.owner("record-1").unwrap());
    }

    #[test]
    fn replica_count_caps_at_membership() {
        let ring = ring_of(&["m1", "m2"]);
        let owners = ring.replica_owners("record-1", 5);
        assert_eq!(owners.len(), 2);
    }
}
