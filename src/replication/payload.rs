//! Replicated payload values.
//!
//! Payloads are opaque bytes at the transport boundary but a typed variant
//! at the resolver boundary: node-shaped, edge-shaped, generic map, or
//! scalar. The shape decides which merge rules apply during conflict
//! resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{NodeId, PropMap, PropValue};

/// A replicated value, tagged by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Payload {
    /// Node-shaped: `{id, properties}`.
    Node { id: NodeId, properties: PropMap },
    /// Edge-shaped: `{from, to, label, properties}`.
    Edge {
        from: NodeId,
        to: NodeId,
        label: String,
        properties: PropMap,
    },
    /// Free-form string-keyed map.
    Map(BTreeMap<String, PropValue>),
    /// Single scalar value.
    Scalar(PropValue),
}

impl Payload {
    /// Whether this payload carries a mergeable key-value structure.
    pub fn is_map_like(&self) -> bool {
        matches!(
            self,
            Payload::Map(_) | Payload::Node { .. } | Payload::Edge { .. }
        )
    }

    /// Property map of a map-like payload.
    pub fn fields(&self) -> Option<&PropMap> {
        match self {
            Payload::Map(map) => Some(map),
            Payload::Node { properties, .. } => Some(properties),
            Payload::Edge { properties, .. } => Some(properties),
            Payload::Scalar(_) => None,
        }
    }

    fn fields_mut(&mut self) -> Option<&mut PropMap> {
        match self {
            Payload::Map(map) => Some(map),
            Payload::Node { properties, .. } => Some(properties),
            Payload::Edge { properties, .. } => Some(properties),
            Payload::Scalar(_) => None,
        }
    }

    /// Applies an update: map-like payloads of the same shape merge field
    /// by field (incoming wins per key); everything else is replaced.
    pub fn apply_update(&mut self, incoming: &Payload) {
        let same_shape = std::mem::discriminant(self) == std::mem::discriminant(incoming);
        if same_shape && self.is_map_like() {
            if let (Some(target), Some(source)) = (self.fields_mut(), incoming.fields()) {
                for (key, value) in source {
                    target.insert(key.clone(), value.clone());
                }
                return;
            }
        }
        *self = incoming.clone();
    }

    /// Rough serialized size in bytes; feeds the placement cost model and
    /// the adaptive replication policy.
    pub fn approx_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::props;

    #[test]
    fn map_updates_merge_per_key() {
        let mut payload = Payload::Map(props([("a", PropValue::Int(1)), ("b", PropValue::Int(2))]));
        payload.apply_update(&Payload::Map(props([
            ("b", PropValue::Int(20)),
            ("c", PropValue::Int(3)),
        ])));
        let Payload::Map(map) = payload else { panic!() };
        assert_eq!(map["a"], PropValue::Int(1));
        assert_eq!(map["b"], PropValue::Int(20));
        assert_eq!(map["c"], PropValue::Int(3));
    }

    #[test]
    fn shape_change_replaces() {
        let mut payload = Payload::Map(props([("a", PropValue::Int(1))]));
        payload.apply_update(&Payload::Scalar(PropValue::Int(9)));
        assert_eq!(payload, Payload::Scalar(PropValue::Int(9)));
    }

    #[test]
    fn json_round_trip() {
        let payload = Payload::Edge {
            from: 1,
            to: 2,
            label: "knows".into(),
            properties: props([("since", PropValue::Int(2020))]),
        };
        let encoded = serde_json::to_string(&payload).unwrap();
        let decoded: Payload = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }
}
