//! Conflict-resolution strategies.
//!
//! A resolver takes the divergent candidate versions of one key and
//! produces a single payload. Strategies are pure functions keyed on the
//! policy tag, so every member resolving the same candidate set converges
//! on the same result without coordination.

use crate::cluster::MemberId;

use super::payload::Payload;
use super::vclock::VectorClock;

/// Resolution strategy selected by the replication policy (and, for the
/// adaptive policy, the payload shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    LastWriteWins,
    VectorClock,
    Consensus,
    SmartMerge,
}

/// One divergent version of a key under resolution.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub member: MemberId,
    pub payload: Payload,
    pub clock: VectorClock,
    pub last_updated: u64,
}

/// Applies a strategy to a non-empty candidate set.
pub fn resolve(strategy: Strategy, candidates: &[Candidate]) -> Option<Payload> {
    if candidates.is_empty() {
        return None;
    }
    Some(match strategy {
        Strategy::LastWriteWins => last_write_wins(candidates).payload.clone(),
        Strategy::VectorClock => vector_clock(candidates),
        Strategy::Consensus => consensus(candidates),
        Strategy::SmartMerge => smart_merge(candidates),
    })
}

/// Greatest `last_updated` wins; ties break on lexicographic member id.
fn last_write_wins(candidates: &[Candidate]) -> &Candidate {
    candidates
        .iter()
        .max_by(|a, b| {
            a.last_updated
                .cmp(&b.last_updated)
                .then_with(|| a.member.cmp(&b.member))
        })
        .expect("non-empty candidate set")
}

/// Dominant clock wins outright. Concurrent map-like versions of the same
/// shape merge field by field with last-writer-wins per key; anything else
/// falls back to last-write-wins.
fn vector_clock(candidates: &[Candidate]) -> Payload {
    if let Some(dominant) = candidates.iter().find(|c| {
        candidates
            .iter()
            .all(|other| !other.clock.conflicts_with(&c.clock) && !other.clock.dominates(&c.clock))
    }) {
        return dominant.payload.clone();
    }
    if mergeable(candidates) {
        return merge_map_like(candidates);
    }
    last_write_wins(candidates).payload.clone()
}

/// Majority vote over payload equality; no majority falls back to
/// last-write-wins.
fn consensus(candidates: &[Candidate]) -> Payload {
    for candidate in candidates {
        let votes = candidates
            .iter()
            .filter(|other| other.payload == candidate.payload)
            .count();
        if votes * 2 > candidates.len() {
            return candidate.payload.clone();
        }
    }
    last_write_wins(candidates).payload.clone()
}

/// Shape-aware merge. Node-shaped payloads merge property maps; edge-shaped
/// payloads merge only when `from`/`to`/`label` agree; plain maps merge;
/// scalars fall back to last-write-wins.
fn smart_merge(candidates: &[Candidate]) -> Payload {
    let first = &candidates[0].payload;
    match first {
        Payload::Node { .. } | Payload::Map(_) if mergeable(candidates) => {
            merge_map_like(candidates)
        }
        Payload::Edge { from, to, label, .. } => {
            let endpoints_agree = candidates.iter().all(|c| match &c.payload {
                Payload::Edge {
                    from: f,
                    to: t,
                    label: l,
                    ..
                } => f == from && t == to && l == label,
                _ => false,
            });
            if endpoints_agree {
                merge_map_like(candidates)
            } else {
                last_write_wins(candidates).payload.clone()
            }
        }
        _ => last_write_wins(candidates).payload.clone(),
    }
}

/// All candidates map-like and of the same shape.
fn mergeable(candidates: &[Candidate]) -> bool {
    let first = std::mem::discriminant(&candidates[0].payload);
    candidates[0].payload.is_map_like()
        && candidates
            .iter()
            .all(|c| std::mem::discriminant(&c.payload) == first)
}

/// Union of fields across candidates, each key taken from the candidate
/// with the greatest `(last_updated, member)`. The base record (identity
/// fields of node/edge shapes) comes from the last writer.
fn merge_map_like(candidates: &[Candidate]) -> Payload {
    let mut order: Vec<&Candidate> = candidates.iter().collect();
    order.sort_by(|a, b| {
        a.last_updated
            .cmp(&b.last_updated)
            .then_with(|| a.member.cmp(&b.member))
    });
    let mut merged = order[0].payload.clone();
    for candidate in &order[1..] {
        merged.apply_update(&candidate.payload);
    }
    merged
}
