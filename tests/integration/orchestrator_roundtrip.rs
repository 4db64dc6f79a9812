use std::collections::BTreeMap;
use std::sync::Arc;

use trellis::lifecycle::Tier;
use trellis::node::{ClusterNode, NodeOptions};
use trellis::orchestrator::{ClusterSnapshot, ShutdownKind, StartupKind};
use trellis::replication::Payload;
use trellis::rpc::InProcessNetwork;
use trellis::{Classification, Config, PropValue};

fn payload_for(i: usize) -> Payload {
    let mut map = BTreeMap::new();
    map.insert("seq".to_string(), PropValue::Int(i as i64));
    map.insert("body".to_string(), PropValue::Str(format!("record-{i}")));
    Payload::Map(map)
}

fn tag_for(i: usize) -> Classification {
    match i % 4 {
        0 => Classification::Ephemeral,
        1 => Classification::Session,
        2 => Classification::Computational,
        _ => Classification::Persistent,
    }
}

#[tokio::test]
async fn shutdown_startup_round_trip_preserves_persistent_data() {
    let snapshot_dir = tempfile::tempdir().unwrap();
    let cold_dir = tempfile::tempdir().unwrap();
    let network = InProcessNetwork::new();
    let node = ClusterNode::new(
        NodeOptions::new("m1")
            .with_config(Config::local_dev())
            .with_snapshot_dir(snapshot_dir.path().to_path_buf())
            .with_cold_dir(cold_dir.path().to_path_buf()),
        Arc::clone(&network),
    )
    .unwrap();

    // A hundred keys spread across all four classifications.
    for i in 0..100 {
        node.classify_and_store(&format!("key-{i}"), tag_for(i), payload_for(i), BTreeMap::new())
            .unwrap();
    }

    let report = node.graceful_shutdown(ShutdownKind::Planned).await.unwrap();
    assert!(report.completed(), "shutdown report: {report:?}");

    // The snapshot landed on disk with the membership and partition count.
    let snapshot = ClusterSnapshot::read_latest(snapshot_dir.path())
        .unwrap()
        .expect("snapshot written during persist phase");
    assert_eq!(snapshot.nodes, vec!["m1".to_string()]);
    assert_eq!(snapshot.partitions, 256);

    let report = node
        .coordinate_startup(StartupKind::Standard)
        .await
        .unwrap();
    assert!(report.completed(), "startup report: {report:?}");
    assert!(!node.is_paused());

    for i in 0..100 {
        let key = format!("key-{i}");
        match tag_for(i) {
            Classification::Persistent => {
                let (_, payload) = node
                    .tiers()
                    .fetch(&key)
                    .unwrap()
                    .unwrap_or_else(|| panic!("persistent {key} lost"));
                assert_eq!(payload, payload_for(i));
            }
            Classification::Ephemeral | Classification::Session => {
                // Volatile data may be absent after the round trip.
                assert_eq!(node.tiers().get(Tier::Hot, &key).unwrap(), None);
            }
            Classification::Computational => {}
        }
    }
}

#[tokio::test]
async fn drain_phase_demotes_mismatched_hot_records() {
    let snapshot_dir = tempfile::tempdir().unwrap();
    let network = InProcessNetwork::new();
    let node = ClusterNode::new(
        NodeOptions::new("m1")
            .with_config(Config::local_dev())
            .with_snapshot_dir(snapshot_dir.path().to_path_buf()),
        Arc::clone(&network),
    )
    .unwrap();

    // Classified computational (wants warm) but parked in hot.
    node.lifecycle()
        .classify("misplaced", Classification::Computational, BTreeMap::new())
        .unwrap();
    node.tiers().put(Tier::Hot, "misplaced", payload_for(1)).unwrap();

    let report = node.graceful_shutdown(ShutdownKind::Planned).await.unwrap();
    assert!(report.completed());
    assert_eq!(node.tiers().get(Tier::Hot, "misplaced").unwrap(), None);
    assert_eq!(
        node.tiers().get(Tier::Warm, "misplaced").unwrap(),
        Some(payload_for(1))
    );
}

#[tokio::test]
async fn snapshot_json_shape_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = ClusterSnapshot {
        nodes: vec!["m1".into(), "m2".into()],
        partitions: 256,
        timestamp: 1_700_000_000_000,
    };
    let path = snapshot.write(dir.path()).unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(raw["nodes"], serde_json::json!(["m1", "m2"]));
    assert_eq!(raw["partitions"], serde_json::json!(256));
    assert_eq!(raw["timestamp"], serde_json::json!(1_700_000_000_000u64));
}

#[tokio::test]
async fn emergency_failover_drops_lost_members() {
    let network = InProcessNetwork::new();
    let members = ["m1", "m2", "m3"];
    let nodes: Vec<Arc<ClusterNode>> = members
        .iter()
        .map(|m| {
            ClusterNode::new(
                NodeOptions::new(*m).with_config(Config::local_dev()),
                Arc::clone(&network),
            )
            .unwrap()
        })
        .collect();
    for node in &nodes {
        for member in &members {
            if *member != node.local().as_str() {
                node.join_cluster(member).unwrap();
            }
        }
    }

    let node = &nodes[0];
    for i in 0..20 {
        node.classify_and_store(
            &format!("key-{i}"),
            Classification::Computational,
            payload_for(i),
            BTreeMap::new(),
        )
        .unwrap();
    }

    network.deregister("m3");
    let report = node
        .emergency_failover(&["m2".to_string()])
        .await
        .unwrap();
    assert!(report.completed(), "failover report: {report:?}");
    assert!(!node.is_paused());
    assert_eq!(node.cluster().members(), vec!["m1".to_string(), "m2".to_string()]);

    for i in 0..20 {
        let placement = node.lifecycle().placement(&format!("key-{i}")).unwrap();
        assert_ne!(placement.primary, "m3");
        assert!(!placement.replicas.contains(&"m3".to_string()));
    }
}
