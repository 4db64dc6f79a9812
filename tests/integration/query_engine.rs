use std::sync::Arc;

use trellis::query::Value;
use trellis::{props, GraphStore, PropValue, QueryEngine};

fn seeded_engine() -> (QueryEngine, Vec<u64>) {
    let store = Arc::new(GraphStore::new());
    let mut ids = Vec::new();
    for (name, role, age) in [
        ("Alice", "Engineer", 34),
        ("Bob", "Manager", 48),
        ("Carol", "Engineer", 29),
        ("David", "Director", 55),
    ] {
        ids.push(
            store
                .create_node(props([
                    ("name", PropValue::from(name)),
                    ("role", role.into()),
                    ("age", PropValue::Int(age)),
                ]))
                .unwrap(),
        );
    }
    store
        .create_edge(ids[0], ids[1], "reports_to", props([("since", PropValue::Int(2020))]))
        .unwrap();
    store
        .create_edge(ids[2], ids[1], "reports_to", props([("since", PropValue::Int(2023))]))
        .unwrap();
    store
        .create_edge(ids[1], ids[3], "reports_to", props([("since", PropValue::Int(2018))]))
        .unwrap();
    store
        .create_edge(ids[0], ids[2], "collaborates", Default::default())
        .unwrap();
    (QueryEngine::new(store), ids)
}

fn node_ids(result: &trellis::QueryResult, column: &str) -> Vec<u64> {
    result
        .rows
        .iter()
        .map(|row| match &row[column] {
            Value::Node(node) => node.id,
            other => panic!("expected node binding, got {other:?}"),
        })
        .collect()
}

#[test]
fn match_all_and_filtered() {
    let (engine, ids) = seeded_engine();

    let all = engine.execute("MATCH (v)").unwrap();
    assert_eq!(all.rows.len(), 4);

    let engineers = engine
        .execute(r#"MATCH (v {role: "Engineer"}) RETURN v"#)
        .unwrap();
    assert_eq!(node_ids(&engineers, "v"), vec![ids[0], ids[2]]);
}

#[test]
fn edge_expansion_with_filters() {
    let (engine, ids) = seeded_engine();

    let reports = engine
        .execute("MATCH (a)-[r:reports_to]->(b) RETURN a, b")
        .unwrap();
    assert_eq!(reports.rows.len(), 3);

    let recent = engine
        .execute("MATCH (a)-[r:reports_to]->(b) WHERE r.since >= 2020 RETURN a")
        .unwrap();
    let mut got = node_ids(&recent, "a");
    got.sort_unstable();
    assert_eq!(got, vec![ids[0], ids[2]]);

    let to_bob = engine
        .execute(r#"MATCH (a)-[r]->(b {name: "Bob"}) RETURN a"#)
        .unwrap();
    assert_eq!(to_bob.rows.len(), 2);
}

#[test]
fn where_clause_combinators() {
    let (engine, _) = seeded_engine();

    let result = engine
        .execute(r#"MATCH (v) WHERE v.age > 30 AND v.role != "Director" RETURN v"#)
        .unwrap();
    assert_eq!(result.rows.len(), 2);

    let result = engine
        .execute(r#"MATCH (v) WHERE v.age < 30 OR v.age > 50 RETURN v"#)
        .unwrap();
    assert_eq!(result.rows.len(), 2);
}

#[test]
fn create_verbs_mutate_the_store() {
    let store = Arc::new(GraphStore::new());
    let engine = QueryEngine::new(Arc::clone(&store));

    let first = engine.execute(r#"CREATE (v {name: "Ada"})"#).unwrap();
    let Value::Id(a) = first.rows[0]["id"] else { panic!() };
    let second = engine.execute(r#"CREATE (v {name: "Grace"})"#).unwrap();
    let Value::Id(b) = second.rows[0]["id"] else { panic!() };

    engine
        .execute(&format!(r#"CREATE ({a})-[:mentors {{since: 1952}}]->({b})"#))
        .unwrap();
    assert_eq!(store.find_edges_by_label("mentors").len(), 1);
}

#[test]
fn command_verbs() {
    let (engine, ids) = seeded_engine();

    let found = engine.execute("FIND NODES role Engineer").unwrap();
    assert_eq!(found.rows.len(), 2);

    let found = engine.execute("FIND EDGES reports_to").unwrap();
    assert_eq!(found.rows.len(), 3);

    let result = engine
        .execute(&format!("TRAVERSE {} 2 out", ids[0]))
        .unwrap();
    let Value::Ids(reached) = &result.rows[0]["nodes"] else {
        panic!()
    };
    assert!(reached.contains(&ids[3]));

    let result = engine
        .execute(&format!("PATH {} {} 5", ids[0], ids[3]))
        .unwrap();
    let Value::Path(path) = &result.rows[0]["path"] else {
        panic!()
    };
    assert_eq!(path, &vec![ids[0], ids[1], ids[3]]);

    let stats = engine.execute("SHOW STATS").unwrap();
    let Value::Stats(stats) = &stats.rows[0]["stats"] else {
        panic!()
    };
    assert_eq!(stats.total_nodes, 4);

    let graph = engine.execute("VISUALIZE").unwrap();
    let Value::Text(text) = &graph.rows[0]["graph"] else {
        panic!()
    };
    assert!(text.contains("->"));
}

#[test]
fn rejects_non_query_strings() {
    let (engine, _) = seeded_engine();
    for bad in ["SELECT * FROM t", "DELETE EVERYTHING", "", "match"] {
        let err = engine.execute(bad).unwrap_err();
        assert_eq!(err.code(), "InvalidQuerySyntax", "input: {bad:?}");
    }
}

#[test]
fn plans_are_memoized_by_fingerprint() {
    let (engine, _) = seeded_engine();
    engine.execute(r#"MATCH (v {role: "Engineer"})"#).unwrap();
    engine
        .execute(r#"MATCH   (v   {role: "Engineer"})"#)
        .unwrap();
    engine.execute("MATCH (v)").unwrap();
    assert_eq!(engine.cached_plans(), 2);
}

#[test]
fn explain_reports_the_plan() {
    let (engine, _) = seeded_engine();
    let plan = engine
        .explain(r#"MATCH (v {role: "Engineer"}) RETURN v"#)
        .unwrap();
    assert!(plan.contains("PropIndexScan"), "plan: {plan}");

    let plan = engine.explain("MATCH (a)-[r:reports_to]->(b)").unwrap();
    assert!(plan.contains("LabelIndexScan"), "plan: {plan}");

    let plan = engine.explain("MATCH (v)").unwrap();
    assert!(plan.contains("NodeScan"), "plan: {plan}");
}
