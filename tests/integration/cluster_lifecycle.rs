use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use trellis::cluster::PeerStatus;
use trellis::lifecycle::{PressureSeverity, Tier};
use trellis::node::{ClusterNode, NodeOptions};
use trellis::replication::Payload;
use trellis::rpc::InProcessNetwork;
use trellis::{Classification, ClusterHealth, Config, PropValue};

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

fn map_payload(value: i64) -> Payload {
    let mut map = BTreeMap::new();
    map.insert("value".to_string(), PropValue::Int(value));
    Payload::Map(map)
}

#[tokio::test]
async fn members_agree_on_key_ownership() {
    let (_network, nodes) = spawn_cluster(&["m1", "m2", "m3"]);
    for i in 0..50 {
        let key = format!("record-{i}");
        let owner = nodes[0].cluster().owner(&key).unwrap();
        for node in &nodes[1..] {
            assert_eq!(node.cluster().owner(&key).unwrap(), owner);
        }
    }

    let info = nodes[0].cluster().info();
    assert_eq!(info.partitions, 256);
    assert_eq!(info.members.len(), 3);
}

#[tokio::test]
async fn classification_places_and_stores() {
    let (_network, nodes) = spawn_cluster(&["m1", "m2", "m3"]);
    let node = &nodes[0];

    let placement = node
        .classify_and_store("user:1", Classification::Persistent, map_payload(7), BTreeMap::new())
        .unwrap();
    assert_eq!(placement.tier, Tier::Cold);
    assert_eq!(1 + placement.replicas.len(), 3);
    assert_eq!(
        node.tiers().get(Tier::Cold, "user:1").unwrap(),
        Some(map_payload(7))
    );

    // Idempotent given stable membership.
    let again = node
        .classify_and_store("user:1", Classification::Persistent, map_payload(7), BTreeMap::new())
        .unwrap();
    assert_eq!(placement, again);

    // replica_nodes returns primary plus n-1 distinct members.
    let replicas = node.lifecycle().replica_nodes("user:1", 2);
    assert_eq!(replicas.len(), 2);
    assert_eq!(replicas[0], placement.primary);
}

#[tokio::test]
async fn ttl_cleanup_evicts_idle_records() {
    let (_network, nodes) = spawn_cluster(&["m1"]);
    let node = &nodes[0];

    node.classify_and_store("s", Classification::Session, map_payload(1), BTreeMap::new())
        .unwrap();
    node.classify_and_store("p", Classification::Persistent, map_payload(2), BTreeMap::new())
        .unwrap();
    node.lifecycle().touch("s").unwrap();

    let future = Instant::now() + Duration::from_secs(1801);
    let evicted = node.lifecycle().cleanup_at(future);
    assert_eq!(evicted, vec!["s".to_string()]);
    for key in &evicted {
        node.tiers().purge(key).unwrap();
    }
    assert_eq!(node.tiers().get(Tier::Hot, "s").unwrap(), None);
    assert!(node.lifecycle().placement("p").is_some());
}

#[tokio::test]
async fn memory_pressure_demotes_by_fraction() {
    let (_network, nodes) = spawn_cluster(&["m1"]);
    let node = &nodes[0];

    for i in 0..10 {
        node.classify_and_store(
            &format!("hot-{i}"),
            Classification::Ephemeral,
            map_payload(i),
            BTreeMap::new(),
        )
        .unwrap();
    }
    assert_eq!(node.tiers().len(Tier::Hot), 10);

    let queued = node.placement().memory_pressure(PressureSeverity::Medium);
    assert_eq!(queued, 3); // ceil(10 * 0.25)
    node.placement().drain();
    assert_eq!(node.tiers().len(Tier::Hot), 7);
    assert_eq!(node.tiers().len(Tier::Warm), 3);
}

#[tokio::test]
async fn migration_protocol_copies_then_deletes() {
    let (_network, nodes) = spawn_cluster(&["m1"]);
    let node = &nodes[0];

    node.classify_and_store("k", Classification::Session, map_payload(5), BTreeMap::new())
        .unwrap();
    node.placement().migrate("k", Tier::Hot, Tier::Cold).unwrap();
    assert_eq!(node.tiers().locate("k").unwrap(), Some(Tier::Cold));
    assert_eq!(
        node.tiers().get(Tier::Cold, "k").unwrap(),
        Some(map_payload(5))
    );
    assert_eq!(node.tiers().get(Tier::Hot, "k").unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_failure_detection_and_departure() {
    let (network, nodes) = spawn_cluster(&["m1", "m2"]);
    let survivor = Arc::clone(&nodes[0]);
    survivor.start_background();

    assert_eq!(survivor.health().health(), ClusterHealth::Unknown);

    // Kill m2's transport; three missed heartbeats declare it failed and
    // the recovery window expires without a reconnect.
    network.deregister("m2");
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(matches!(
        survivor.health().status("m2"),
        None | Some(PeerStatus::PermanentlyFailed)
    ));
    assert!(!survivor
        .cluster()
        .members()
        .contains(&"m2".to_string()));
    survivor.stop_background();
}

#[tokio::test]
async fn peer_departure_recomputes_placements() {
    let (_network, nodes) = spawn_cluster(&["m1", "m2", "m3"]);
    let node = &nodes[0];

    for i in 0..30 {
        node.classify_and_store(
            &format!("key-{i}"),
            Classification::Computational,
            map_payload(i),
            BTreeMap::new(),
        )
        .unwrap();
    }

    node.on_peer_departed("m2");

    for i in 0..30 {
        let placement = node.lifecycle().placement(&format!("key-{i}")).unwrap();
        assert_ne!(placement.primary, "m2");
        assert!(!placement.replicas.contains(&"m2".to_string()));
    }
}

#[tokio::test]
async fn join_unreachable_peer_fails_with_retryable_error() {
    let (_network, nodes) = spawn_cluster(&["m1"]);
    let err = nodes[0].join_cluster("ghost").unwrap_err();
    assert_eq!(err.code(), "ConnectionFailed");
    assert!(err.is_retryable());
    assert!(err.recovery_suggestion().is_some());
}

#[tokio::test]
async fn pause_and_resume_gate_peer_calls() {
    let (network, nodes) = spawn_cluster(&["m1", "m2"]);
    let peer = network.peer("m2").unwrap();

    peer.pause_operations().await.unwrap();
    let err = peer
        .store_replica("k", map_payload(1), trellis::ReplicationPolicy::Minimal)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ClusterUnavailable");

    peer.resume_operations().await.unwrap();
    peer.store_replica("k", map_payload(1), trellis::ReplicationPolicy::Minimal)
        .await
        .unwrap();
    assert!(nodes[1].replication().get("k").is_some());
}

#[tokio::test]
async fn access_counts_flow_over_rpc() {
    let (network, nodes) = spawn_cluster(&["m1", "m2"]);
    nodes[1]
        .classify_and_store("shared", Classification::Session, map_payload(1), BTreeMap::new())
        .unwrap();
    nodes[1].lifecycle().touch("shared").unwrap();
    nodes[1].lifecycle().touch("shared").unwrap();

    let peer = network.peer("m2").unwrap();
    assert_eq!(peer.get_access_count("shared").await.unwrap(), 2);
    assert_eq!(peer.get_access_count("missing").await.unwrap(), 0);
}

#[tokio::test]
async fn forwarded_placement_is_adopted() {
    let (network, nodes) = spawn_cluster(&["m1", "m2"]);
    let placement = nodes[0]
        .lifecycle()
        .classify("plan-key", Classification::Computational, BTreeMap::new())
        .unwrap();

    let peer = network.peer("m2").unwrap();
    peer.forward_placement(placement.clone()).await.unwrap();
    assert_eq!(nodes[1].lifecycle().placement("plan-key"), Some(placement));
}
