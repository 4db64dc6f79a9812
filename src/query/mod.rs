//! Query engine: parse, plan, execute.
//!
//! [`QueryEngine`] is the string-in, rows-out surface. `MATCH` queries are
//! planned against the secondary indexes and the compiled plan is memoized
//! by whitespace-normalized fingerprint; command verbs execute directly.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::Result;
use crate::store::GraphStore;

pub mod ast;
pub mod executor;
pub mod parser;
pub mod planner;

pub use executor::{QueryResult, Row, Value};
pub use planner::MatchPlan;

use ast::Query;
use parser::Parser;

struct Prepared {
    query: Query,
    /// Present only for `MATCH` queries.
    plan: Option<MatchPlan>,
}

/// String-query surface over a shared [`GraphStore`].
pub struct QueryEngine {
    store: Arc<GraphStore>,
    cache: Mutex<FxHashMap<String, Arc<Prepared>>>,
}

impl QueryEngine {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Parses, plans, and executes a query string.
    ///
    /// An `EXPLAIN` prefix returns the chosen plan as text instead of
    /// executing the query.
    pub fn execute(&self, text: &str) -> Result<QueryResult> {
        let trimmed = text.trim();
        if let Some(rest) = strip_keyword(trimmed, "EXPLAIN") {
            let description = self.explain(rest)?;
            return Ok(QueryResult {
                columns: vec!["plan".into()],
                rows: vec![{
                    let mut row = Row::new();
                    row.insert("plan".into(), Value::Text(description));
                    row
                }],
            });
        }

        let prepared = self.prepare(trimmed)?;
        match &prepared.plan {
            Some(plan) => executor::execute_match(&self.store, plan),
            None => executor::execute_command(&self.store, &prepared.query),
        }
    }

    /// Returns the plan description for a query without executing it.
    pub fn explain(&self, text: &str) -> Result<String> {
        let prepared = self.prepare(text.trim())?;
        Ok(match &prepared.plan {
            Some(plan) => plan.describe(),
            None => format!("Command({:?})", variant_name(&prepared.query)),
        })
    }

    /// Number of memoized plans; exposed for cache diagnostics.
    pub fn cached_plans(&self) -> usize {
        self.cache.lock().len()
    }

    fn prepare(&self, text: &str) -> Result<Arc<Prepared>> {
        let fingerprint = normalize(text);
        if let Some(hit) = self.cache.lock().get(&fingerprint) {
            return Ok(Arc::clone(hit));
        }
        let query = Parser::parse(text)?;
        let plan = match &query {
            Query::Match(m) => Some(planner::plan_match(m)?),
            _ => None,
        };
        let prepared = Arc::new(Prepared { query, plan });
        debug!(fingerprint = %fingerprint, "memoized query plan");
        self.cache
            .lock()
            .insert(fingerprint, Arc::clone(&prepared));
        Ok(prepared)
    }
}

/// Whitespace-normalized fingerprint used as the plan-cache key.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_keyword<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let head = text.split_whitespace().next()?;
    if head.eq_ignore_ascii_case(word) {
        Some(text[head.len()..].trim_start())
    } else {
        None
    }
}

fn variant_name(query: &Query) -> &'static str {
    match query {
        Query::Match(_) => "Match",
        Query::CreateNode { .. } => "CreateNode",
        Query::CreateEdge { .. } => "CreateEdge",
        Query::FindNodes { .. } => "FindNodes",
        Query::FindEdges { .. } => "FindEdges",
        Query::Traverse { .. } => "Traverse",
        Query::Path { .. } => "Path",
        Query::ShowStats => "ShowStats",
        Query::Visualize => "Visualize",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{props, PropValue};

    fn engine_with_people() -> (QueryEngine, Vec<u64>) {
        let store = Arc::new(GraphStore::new());
        let a = store
            .create_node(props([
                ("name", PropValue::from("Alice")),
                ("role", "Engineer".into()),
                ("age", PropValue::Int(34)),
            ]))
            .unwrap();
        let b = store
            .create_node(props([
                ("name", PropValue::from("Bob")),
                ("role", "Manager".into()),
                ("age", PropValue::Int(48)),
            ]))
            .unwrap();
        let c = store
            .create_node(props([
                ("name", PropValue::from("Carol")),
                ("role", "Engineer".into()),
                ("age", PropValue::Int(29)),
            ]))
            .unwrap();
        store
            .create_edge(a, b, "reports_to", props([("since", PropValue::Int(2021))]))
            .unwrap();
        store
            .create_edge(c, b, "reports_to", props([("since", PropValue::Int(2023))]))
            .unwrap();
        store.create_edge(a, c, "collaborates", Default::default()).unwrap();
        (QueryEngine::new(store), vec![a, b, c])
    }

    #[test]
    fn match_all_nodes() {
        let (engine, ids) = engine_with_people();
        let result = engine.execute("MATCH (v)").unwrap();
        assert_eq!(result.rows.len(), ids.len());
        assert_eq!(result.columns, vec!["v"]);
    }

    #[test]
    fn match_with_property_filter() {
        let (engine, ids) = engine_with_people();
        let result = engine
            .execute(r#"MATCH (v {role: "Engineer"}) RETURN v"#)
            .unwrap();
        let got: Vec<u64> = result
            .rows
            .iter()
            .map(|row| match &row["v"] {
                Value::Node(node) => node.id,
                other => panic!("unexpected value {other:?}"),
            })
            .collect();
        assert_eq!(got, vec![ids[0], ids[2]]);
    }

    #[test]
    fn match_edges_with_label_and_where() {
        let (engine, ids) = engine_with_people();
        let result = engine
            .execute("MATCH (a)-[r:reports_to]->(b) WHERE r.since >= 2022 RETURN a, b")
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        let Value::Node(a) = &result.rows[0]["a"] else {
            panic!()
        };
        assert_eq!(a.id, ids[2]);
    }

    #[test]
    fn where_or_combination() {
        let (engine, _) = engine_with_people();
        let result = engine
            .execute(r#"MATCH (v) WHERE v.age > 40 OR v.name = "Carol" RETURN v"#)
            .unwrap();
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn create_and_query_through_strings() {
        let store = Arc::new(GraphStore::new());
        let engine = QueryEngine::new(Arc::clone(&store));
        let created = engine
            .execute(r#"CREATE (v {name: "Ada"})"#)
            .unwrap();
        let Value::Id(id) = created.rows[0]["id"] else {
            panic!()
        };
        assert_eq!(store.get_node(id).unwrap().properties["name"], "Ada".into());
    }

    #[test]
    fn invalid_verbs_and_cache() {
        let (engine, _) = engine_with_people();
        assert!(engine.execute("SELECT 1").is_err());

        engine.execute("MATCH   (v)").unwrap();
        engine.execute("MATCH (v)").unwrap();
        assert_eq!(engine.cached_plans(), 1);
    }

    #[test]
    fn explain_reports_index_choice() {
        let (engine, _) = engine_with_people();
        let plan = engine
            .explain(r#"MATCH (v {role: "Engineer"})"#)
            .unwrap();
        assert!(plan.contains("PropIndexScan"));

        let result = engine
            .execute("EXPLAIN MATCH (a)-[r:reports_to]->(b)")
            .unwrap();
        let Value::Text(text) = &result.rows[0]["plan"] else {
            panic!()
        };
        assert!(text.contains("LabelIndexScan"));
    }

    #[test]
    fn traverse_and_path_verbs() {
        let (engine, ids) = engine_with_people();
        let result = engine
            .execute(&format!("TRAVERSE {} 2 out", ids[0]))
            .unwrap();
        let Value::Ids(nodes) = &result.rows[0]["nodes"] else {
            panic!()
        };
        assert!(nodes.contains(&ids[1]));

        let result = engine.execute(&format!("PATH {} {}", ids[0], ids[1])).unwrap();
        let Value::Path(path) = &result.rows[0]["path"] else {
            panic!()
        };
        assert_eq!(path.first(), Some(&ids[0]));
        assert_eq!(path.last(), Some(&ids[1]));
    }
}
