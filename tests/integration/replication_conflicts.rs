use std::collections::BTreeMap;
use std::sync::Arc;

use trellis::node::{ClusterNode, NodeOptions};
use trellis::replication::Payload;
use trellis::rpc::InProcessNetwork;
use trellis::{Config, PropValue, ReplicationPolicy};

fn spawn_cluster(members: &[&str]) -> (Arc<InProcessNetwork>, Vec<Arc<ClusterNode>>) {
    let network = InProcessNetwork::new();
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
        for member in members {
            if member != node.local() {
                node.join_cluster(member).unwrap();
            }
        }
    }
    (network, nodes)
}

fn map_of(pairs: &[(&str, PropValue)]) -> Payload {
    let map: BTreeMap<String, PropValue> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Payload::Map(map)
}

#[tokio::test]
async fn create_propagates_to_all_replica_members() {
    let (_network, nodes) = spawn_cluster(&["m1", "m2", "m3"]);
    let members = nodes[0]
        .replication()
        .create("K", ReplicationPolicy::Balanced, map_of(&[]))
        .unwrap();
    assert_eq!(members.len(), 3);
    nodes[0].replication().flush().await;

    for node in &nodes {
        assert!(node.replication().get("K").is_some(), "{} missing K", node.local());
    }
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let (_network, nodes) = spawn_cluster(&["m1"]);
    nodes[0]
        .replication()
        .create("K", ReplicationPolicy::Minimal, map_of(&[]))
        .unwrap();
    let err = nodes[0]
        .replication()
        .create("K", ReplicationPolicy::Minimal, map_of(&[]))
        .unwrap_err();
    assert_eq!(err.code(), "DuplicateEntry");
}

/// Concurrent map updates on two members with incomparable vector clocks:
/// after propagation and a consistency tick the balanced resolver yields
/// the union of keys, overlapping values drawn from the later writer.
#[tokio::test]
async fn concurrent_map_updates_converge_to_union() {
    let (_network, nodes) = spawn_cluster(&["m1", "m2", "m3"]);
    let (m1, m2, m3) = (&nodes[0], &nodes[1], &nodes[2]);

    m1.replication()
        .create("K", ReplicationPolicy::Balanced, map_of(&[]))
        .unwrap();
    m1.replication().flush().await;

    // Both writers update before either propagation lands: incomparable
    // clocks, overlapping "shared" key.
    let t1 = 2_000_000_000_000;
    let t2 = t1 + 500;
    m1.replication()
        .update_at(
            "K",
            map_of(&[
                ("from_m1", PropValue::Int(1)),
                ("shared", PropValue::Str("first".into())),
            ]),
            t1,
        )
        .unwrap();
    m2.replication()
        .update_at(
            "K",
            map_of(&[
                ("from_m2", PropValue::Int(2)),
                ("shared", PropValue::Str("second".into())),
            ]),
            t2,
        )
        .unwrap();
    m1.replication().flush().await;
    m2.replication().flush().await;

    // Conflicts are shelved, not surfaced.
    let status = m1.replication().status("K").unwrap();
    assert!(status.divergent);

    for node in [m1, m2, m3] {
        node.replication().consistency_check();
    }

    let expected = map_of(&[
        ("from_m1", PropValue::Int(1)),
        ("from_m2", PropValue::Int(2)),
        ("shared", PropValue::Str("second".into())),
    ]);
    for node in [m1, m2, m3] {
        assert_eq!(
            node.replication().get("K").unwrap(),
            expected,
            "{} diverged",
            node.local()
        );
        assert!(!node.replication().status("K").unwrap().divergent);
    }
    assert!(m1.replication().inconsistencies() >= 1);
}

#[tokio::test]
async fn dominating_updates_apply_without_conflict() {
    let (_network, nodes) = spawn_cluster(&["m1", "m2"]);
    nodes[0]
        .replication()
        .create("K", ReplicationPolicy::Balanced, map_of(&[]))
        .unwrap();
    nodes[0].replication().flush().await;

    nodes[0]
        .replication()
        .update("K", map_of(&[("a", PropValue::Int(1))]))
        .unwrap();
    nodes[0].replication().flush().await;

    let status = nodes[1].replication().status("K").unwrap();
    assert_eq!(status.conflicts, 0);
    assert_eq!(
        nodes[1].replication().get("K").unwrap(),
        map_of(&[("a", PropValue::Int(1))])
    );
}

#[tokio::test]
async fn map_updates_merge_fields_locally() {
    let (_network, nodes) = spawn_cluster(&["m1"]);
    let engine = nodes[0].replication();
    engine
        .create("K", ReplicationPolicy::Balanced, map_of(&[("keep", PropValue::Int(1))]))
        .unwrap();
    engine
        .update("K", map_of(&[("add", PropValue::Int(2))]))
        .unwrap();

    assert_eq!(
        engine.get("K").unwrap(),
        map_of(&[("keep", PropValue::Int(1)), ("add", PropValue::Int(2))])
    );
}

#[tokio::test]
async fn peer_failure_prunes_and_promotes() {
    let (_network, nodes) = spawn_cluster(&["m1", "m2", "m3"]);
    nodes[0]
        .replication()
        .create("K", ReplicationPolicy::Maximum, map_of(&[]))
        .unwrap();
    nodes[0].replication().flush().await;

    let before = nodes[0].replication().status("K").unwrap();
    assert_eq!(before.members.len(), 3);
    let failed = before.primary.clone();

    nodes[0].replication().handle_peer_failure(&failed);
    let after = nodes[0].replication().status("K").unwrap();
    assert!(!after.members.contains(&failed));
    assert_ne!(after.primary, failed);
    assert!(after.members.contains(&after.primary));
}

#[tokio::test]
async fn propagation_failures_are_recorded_not_surfaced() {
    let (network, nodes) = spawn_cluster(&["m1", "m2"]);
    nodes[0]
        .replication()
        .create("K", ReplicationPolicy::Balanced, map_of(&[]))
        .unwrap();
    nodes[0].replication().flush().await;

    network.deregister("m2");
    // The mutator still succeeds; the failure lands in the set's log.
    nodes[0]
        .replication()
        .update("K", map_of(&[("x", PropValue::Int(1))]))
        .unwrap();
    nodes[0].replication().flush().await;

    let status = nodes[0].replication().status("K").unwrap();
    assert!(status.sync_errors >= 1);
}

#[tokio::test]
async fn graph_mutations_emit_replication_intents() {
    let network = InProcessNetwork::new();
    let node = ClusterNode::new(
        NodeOptions::new("m1")
            .with_config(Config::local_dev())
            .with_graph_replication(),
        Arc::clone(&network),
    )
    .unwrap();

    let id = node
        .store()
        .create_node(trellis::props([("name", "Ada")]))
        .unwrap();
    node.replication().flush().await;

    let payload = node.replication().get(&format!("node:{id}")).unwrap();
    let Payload::Node { id: got, properties } = payload else {
        panic!("expected node-shaped payload");
    };
    assert_eq!(got, id);
    assert_eq!(properties["name"], PropValue::Str("Ada".into()));
}
