use trellis::analytics::{
    self, betweenness, closeness, connected_components, degree_distribution, density, diameter,
    eigenvector, global_clustering, k_core, local_clustering, louvain, pagerank, triangle_counts,
    PageRankParams, PowerParams,
};
use trellis::GraphStore;

fn ring(store: &GraphStore, n: usize) -> Vec<u64> {
    let ids: Vec<u64> = (0..n)
        .map(|_| store.create_node(Default::default()).unwrap())
        .collect();
    for i in 0..n {
        store
            .create_edge(ids[i], ids[(i + 1) % n], "next", Default::default())
            .unwrap();
    }
    ids
}

#[test]
fn pagerank_on_a_star_concentrates_at_the_center() {
    let store = GraphStore::new();
    let center = store.create_node(Default::default()).unwrap();
    let leaves: Vec<u64> = (0..4)
        .map(|_| store.create_node(Default::default()).unwrap())
        .collect();
    for &leaf in &leaves {
        store
            .create_edge(leaf, center, "points", Default::default())
            .unwrap();
    }

    let ranks = pagerank(&store, &PageRankParams::default());
    for &leaf in &leaves {
        assert!(ranks[&center] > ranks[&leaf]);
        assert!((ranks[&leaf] - ranks[&leaves[0]]).abs() < 1e-4);
    }
    let total: f64 = ranks.values().sum();
    assert!((total - 1.0).abs() < 1e-4);
    assert!(ranks.values().all(|r| r.is_finite() && (0.0..=1.0).contains(r)));
}

#[test]
fn pagerank_symmetric_on_a_ring() {
    let store = GraphStore::new();
    let ids = ring(&store, 6);
    let ranks = pagerank(&store, &PageRankParams::default());
    let first = ranks[&ids[0]];
    for id in ids {
        assert!((ranks[&id] - first).abs() < 1e-6);
    }
}

#[test]
fn eigenvector_tracks_connectivity() {
    let store = GraphStore::new();
    let ids = ring(&store, 5);
    let scores = eigenvector(&store, &PowerParams::default());
    // Symmetric ring: equal centrality, L2 norm 1.
    let norm: f64 = scores.values().map(|v| v * v).sum::<f64>().sqrt();
    assert!((norm - 1.0).abs() < 1e-6);
    let first = scores[&ids[0]];
    for id in ids {
        assert!((scores[&id] - first).abs() < 1e-6);
    }
}

#[test]
fn triangle_scenario_clustering() {
    let store = GraphStore::new();
    let ids = ring(&store, 3); // 1→2, 2→3, 3→1

    assert_eq!(global_clustering(&store), 1.0);
    for &id in &ids {
        assert_eq!(local_clustering(&store, id).unwrap(), 1.0);
    }
    let components = connected_components(&store);
    assert_eq!(components, vec![ids.clone()]);

    let (per_node, total) = triangle_counts(&store);
    assert_eq!(total, 1);
    assert!(per_node.values().all(|&t| t == 1));
}

#[test]
fn components_partition_and_order_by_size() {
    let store = GraphStore::new();
    let big = ring(&store, 4);
    let small = ring(&store, 2);
    let lone = store.create_node(Default::default()).unwrap();

    let components = connected_components(&store);
    assert_eq!(components.len(), 3);
    assert_eq!(components[0], big);
    assert_eq!(components[1], small);
    assert_eq!(components[2], vec![lone]);

    let total: usize = components.iter().map(|c| c.len()).sum();
    assert_eq!(total, store.stats().total_nodes);
}

#[test]
fn betweenness_of_a_bridge() {
    let store = GraphStore::new();
    // Two pairs joined through a middle node.
    let ids: Vec<u64> = (0..5)
        .map(|_| store.create_node(Default::default()).unwrap())
        .collect();
    for (from, to) in [(0, 2), (1, 2), (2, 3), (2, 4)] {
        store
            .create_edge(ids[from], ids[to], "x", Default::default())
            .unwrap();
    }
    let scores = betweenness(&store);
    // The middle node carries all four cross pairs.
    assert_eq!(scores[&ids[2]], 4.0);
    assert_eq!(scores[&ids[0]], 0.0);
}

#[test]
fn closeness_on_a_chain() {
    let store = GraphStore::new();
    let ids: Vec<u64> = (0..4)
        .map(|_| store.create_node(Default::default()).unwrap())
        .collect();
    for w in ids.windows(2) {
        store.create_edge(w[0], w[1], "next", Default::default()).unwrap();
    }
    // Head reaches 3 nodes at distances 1+2+3.
    assert!((closeness(&store, ids[0]).unwrap() - 3.0 / 6.0).abs() < 1e-9);
    assert_eq!(closeness(&store, ids[3]).unwrap(), 0.0);
}

#[test]
fn louvain_separates_dense_groups() {
    let store = GraphStore::new();
    let mut groups = Vec::new();
    for _ in 0..2 {
        let ids: Vec<u64> = (0..5)
            .map(|_| store.create_node(Default::default()).unwrap())
            .collect();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                store
                    .create_edge(ids[i], ids[j], "intra", Default::default())
                    .unwrap();
            }
        }
        groups.push(ids);
    }
    store
        .create_edge(groups[0][0], groups[1][0], "bridge", Default::default())
        .unwrap();

    let communities = louvain(&store);
    let left = communities[&groups[0][0]];
    let right = communities[&groups[1][0]];
    assert_ne!(left, right);
    for id in &groups[0] {
        assert_eq!(communities[id], left);
    }
    for id in &groups[1] {
        assert_eq!(communities[id], right);
    }
}

#[test]
fn k_core_peels_the_tail() {
    let store = GraphStore::new();
    let core = ring(&store, 4);
    store
        .create_edge(core[0], core[2], "chord", Default::default())
        .unwrap();
    let tail = store.create_node(Default::default()).unwrap();
    store
        .create_edge(core[3], tail, "tail", Default::default())
        .unwrap();

    let cores = k_core(&store);
    assert_eq!(cores[&tail], 1);
    for id in core {
        assert_eq!(cores[&id], 2);
    }
}

#[test]
fn density_diameter_and_degrees() {
    let store = GraphStore::new();
    let ids = ring(&store, 4);

    assert!((density(&store) - 4.0 / 12.0).abs() < 1e-9);
    assert_eq!(diameter(&store), 2);

    let degrees = degree_distribution(&store);
    assert_eq!(degrees.min, 2);
    assert_eq!(degrees.max, 2);
    assert_eq!(degrees.mean, 2.0);
    assert_eq!(degrees.median, 2.0);
    assert_eq!(degrees.std_dev, 0.0);

    let summary = analytics::summary(&store);
    assert_eq!(summary.nodes, ids.len());
    assert_eq!(summary.edges, 4);
    assert_eq!(summary.components, 1);
    assert_eq!(summary.largest_component, 4);
    assert_eq!(summary.triangles, 0);
}
