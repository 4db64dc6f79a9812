use trellis::{props, Direction, GraphStore, PropValue, Result};

fn social_network(store: &GraphStore) -> (u64, u64, u64, u64) {
    let a = store
        .create_node(props([("name", "Alice"), ("role", "Engineer")]))
        .unwrap();
    let b = store
        .create_node(props([("name", "Bob"), ("role", "Manager")]))
        .unwrap();
    let c = store
        .create_node(props([("name", "Carol"), ("role", "Engineer")]))
        .unwrap();
    let d = store
        .create_node(props([("name", "David"), ("role", "Director")]))
        .unwrap();
    store.create_edge(a, b, "reports_to", Default::default()).unwrap();
    store.create_edge(c, b, "reports_to", Default::default()).unwrap();
    store.create_edge(b, d, "reports_to", Default::default()).unwrap();
    store.create_edge(a, c, "collaborates", Default::default()).unwrap();
    (a, b, c, d)
}

#[test]
fn social_network_scenario_end_to_end() -> Result<()> {
    let store = GraphStore::new();
    let (a, b, c, d) = social_network(&store);

    let engineers: Vec<u64> = store
        .find_nodes_by_property("role", &"Engineer".into())
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(engineers, vec![a, c]);

    assert_eq!(store.find_edges_by_label("reports_to").len(), 3);

    let mut upstream = store.traverse(d, Direction::In, 2)?;
    upstream.sort_unstable();
    assert_eq!(upstream, vec![a, b, c]);

    let path = store.find_path(a, d, 5)?;
    assert_eq!(path, vec![a, b, d]);
    assert_eq!(path.len(), 3);
    Ok(())
}

#[test]
fn node_count_tracks_creations_and_deletions() {
    let store = GraphStore::new();
    let mut live = Vec::new();
    for i in 0..20i64 {
        live.push(store.create_node(props([("n", PropValue::Int(i))])).unwrap());
    }
    for id in live.iter().take(7) {
        assert!(store.delete_node(*id).unwrap());
    }
    // A second delete of the same identities is a no-op.
    for id in live.iter().take(7) {
        assert!(!store.delete_node(*id).unwrap());
    }
    assert_eq!(store.stats().total_nodes, 13);
    assert_eq!(store.list_nodes().len(), 13);
}

#[test]
fn edges_appear_in_both_adjacency_directions() -> Result<()> {
    let store = GraphStore::new();
    let a = store.create_node(Default::default())?;
    let b = store.create_node(Default::default())?;
    store.create_edge(a, b, "linked", Default::default())?;

    assert_eq!(store.traverse(a, Direction::Out, 1)?, vec![b]);
    assert_eq!(store.traverse(b, Direction::In, 1)?, vec![a]);
    assert_eq!(store.get_edges_from(a)?.len(), 1);
    assert_eq!(store.get_edges_to(b)?.len(), 1);
    assert!(store.get_edges_to(a)?.is_empty());
    Ok(())
}

#[test]
fn validation_failures_surface_as_typed_errors() {
    let store = GraphStore::new();
    let err = store
        .create_node(props([("bad-key", PropValue::Int(1))]))
        .unwrap_err();
    assert_eq!(err.code(), "InvalidProperties");
    assert!(!err.is_retryable());

    let a = store.create_node(Default::default()).unwrap();
    let err = store
        .create_edge(a, 999_999, "x", Default::default())
        .unwrap_err();
    assert_eq!(err.code(), "NodeNotFound");

    let err = store.traverse(a, Direction::Out, 200).unwrap_err();
    assert_eq!(err.code(), "InvalidDepth");
}

#[test]
fn traverse_results_grow_with_depth() -> Result<()> {
    let store = GraphStore::new();
    let ids: Vec<u64> = (0..6)
        .map(|_| store.create_node(Default::default()).unwrap())
        .collect();
    for w in ids.windows(2) {
        store.create_edge(w[0], w[1], "next", Default::default())?;
    }

    let mut previous = Vec::new();
    for depth in 0..=6 {
        let current = store.traverse(ids[0], Direction::Out, depth)?;
        for node in &previous {
            assert!(current.contains(node), "depth {depth} lost node {node}");
        }
        previous = current;
    }
    assert_eq!(previous.len(), 5);
    Ok(())
}

#[test]
fn update_node_keeps_index_consistent() -> Result<()> {
    let store = GraphStore::new();
    let id = store.create_node(props([("state", "new")]))?;

    store.update_node(
        id,
        props([
            ("state", PropValue::from("done")),
            ("extra", PropValue::Bool(true)),
        ]),
    )?;
    assert!(store.find_nodes_by_property("state", &"new".into()).is_empty());
    assert_eq!(store.find_nodes_by_property("state", &"done".into())[0].id, id);
    assert_eq!(
        store
            .find_nodes_by_property("extra", &PropValue::Bool(true))
            .len(),
        1
    );

    // Untouched keys survive the merge.
    let node = store.get_node(id)?;
    assert_eq!(node.properties.len(), 2);
    Ok(())
}
