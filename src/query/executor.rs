//! Plan execution against the graph store.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::model::{Edge, Node, NodeId, PropMap, PropValue};
use crate::store::{GraphStats, GraphStore};

use super::ast::{BoolExpr, CmpOp, Comparison, Query};
use super::planner::{EdgeSource, MatchPlan, NodeSource};

/// Runtime value flowing into result rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Node(Node),
    Edge(Edge),
    Prop(PropValue),
    Id(u64),
    Ids(Vec<NodeId>),
    Path(Vec<NodeId>),
    Stats(GraphStats),
    Text(String),
}

/// Single output row: alias → value.
pub type Row = BTreeMap<String, Value>;

/// Materialized result of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    fn single(column: &str, value: Value) -> Self {
        let mut row = Row::new();
        row.insert(column.to_owned(), value);
        Self {
            columns: vec![column.to_owned()],
            rows: vec![row],
        }
    }
}

/// Executes a non-`MATCH` query directly against the store.
pub(crate) fn execute_command(store: &GraphStore, query: &Query) -> Result<QueryResult> {
    match query {
        Query::Match(_) => unreachable!("MATCH executes through a plan"),
        Query::CreateNode { props } => {
            let id = store.create_node(props.clone())?;
            Ok(QueryResult::single("id", Value::Id(id)))
        }
        Query::CreateEdge {
            from,
            to,
            label,
            props,
        } => {
            let id = store.create_edge(*from, *to, label, props.clone())?;
            Ok(QueryResult::single("id", Value::Id(id)))
        }
        Query::FindNodes { key, value } => {
            let nodes = store.find_nodes_by_property(key, value);
            Ok(QueryResult {
                columns: vec!["node".into()],
                rows: nodes
                    .into_iter()
                    .map(|node| {
                        let mut row = Row::new();
                        row.insert("node".into(), Value::Node(node));
                        row
                    })
                    .collect(),
            })
        }
        Query::FindEdges { label } => {
            let edges = store.find_edges_by_label(label);
            Ok(QueryResult {
                columns: vec!["edge".into()],
                rows: edges
                    .into_iter()
                    .map(|edge| {
                        let mut row = Row::new();
                        row.insert("edge".into(), Value::Edge(edge));
                        row
                    })
                    .collect(),
            })
        }
        Query::Traverse {
            start,
            direction,
            depth,
        } => {
            let nodes = store.traverse(*start, *direction, *depth)?;
            Ok(QueryResult::single("nodes", Value::Ids(nodes)))
        }
        Query::Path {
            from,
            to,
            max_depth,
        } => {
            let path = store.find_path(*from, *to, *max_depth)?;
            Ok(QueryResult::single("path", Value::Path(path)))
        }
        Query::ShowStats => Ok(QueryResult::single("stats", Value::Stats(store.stats()))),
        Query::Visualize => {
            let mut lines = Vec::new();
            for node in store.list_nodes() {
                let neighbors = store
                    .neighbors(node.id, crate::traverse::Direction::Out)
                    .unwrap_or_default();
                let targets: Vec<String> =
                    neighbors.iter().map(|id| id.to_string()).collect();
                lines.push(format!("{} -> [{}]", node.id, targets.join(", ")));
            }
            Ok(QueryResult::single("graph", Value::Text(lines.join("\n"))))
        }
    }
}

/// Executes a compiled `MATCH` plan.
pub(crate) fn execute_match(store: &GraphStore, plan: &MatchPlan) -> Result<QueryResult> {
    match plan {
        MatchPlan::Nodes {
            source,
            pattern,
            query,
        } => {
            let candidates = match source {
                NodeSource::AllNodes => store.list_nodes(),
                NodeSource::PropIndex { key, value } => store.find_nodes_by_property(key, value),
            };
            let columns = if query.returns.is_empty() {
                vec![pattern.var.clone()]
            } else {
                query.returns.clone()
            };
            let mut rows = Vec::new();
            for node in candidates {
                if !props_match(&node.properties, &pattern.props) {
                    continue;
                }
                let lookup = |var: &str| -> Option<&PropMap> {
                    (var == pattern.var).then_some(&node.properties)
                };
                if let Some(predicate) = &query.predicate {
                    if !eval_predicate(predicate, &lookup) {
                        continue;
                    }
                }
                let mut row = Row::new();
                for column in &columns {
                    row.insert(column.clone(), Value::Node(node.clone()));
                }
                rows.push(row);
            }
            Ok(QueryResult { columns, rows })
        }
        MatchPlan::Edges {
            source,
            left,
            rel,
            right,
            query,
        } => {
            let candidates: Vec<Edge> = match source {
                EdgeSource::AllEdges => store.list_edges(),
                EdgeSource::LabelIndex(label) => store.find_edges_by_label(label),
                EdgeSource::LeftPropIndex { key, value } => {
                    let mut edges = Vec::new();
                    for node in store.find_nodes_by_property(key, value) {
                        edges.extend(store.get_edges_from(node.id)?);
                    }
                    edges.sort_by_key(|e| e.id);
                    edges
                }
            };

            let mut bound = vec![left.var.clone()];
            if let Some(var) = &rel.var {
                bound.push(var.clone());
            }
            bound.push(right.var.clone());
            let columns = if query.returns.is_empty() {
                bound
            } else {
                query.returns.clone()
            };

            let mut rows = Vec::new();
            for edge in candidates {
                if let Some(label) = &rel.label {
                    if edge.label != *label {
                        continue;
                    }
                }
                if !props_match(&edge.properties, &rel.props) {
                    continue;
                }
                let Ok(from_node) = store.get_node(edge.from) else {
                    continue;
                };
                let Ok(to_node) = store.get_node(edge.to) else {
                    continue;
                };
                if !props_match(&from_node.properties, &left.props)
                    || !props_match(&to_node.properties, &right.props)
                {
                    continue;
                }
                let lookup = |var: &str| -> Option<&PropMap> {
                    if var == left.var {
                        Some(&from_node.properties)
                    } else if var == right.var {
                        Some(&to_node.properties)
                    } else if rel.var.as_deref() == Some(var) {
                        Some(&edge.properties)
                    } else {
                        None
                    }
                };
                if let Some(predicate) = &query.predicate {
                    if !eval_predicate(predicate, &lookup) {
                        continue;
                    }
                }
                let mut row = Row::new();
                for column in &columns {
                    let value = if *column == left.var {
                        Value::Node(from_node.clone())
                    } else if *column == right.var {
                        Value::Node(to_node.clone())
                    } else {
                        Value::Edge(edge.clone())
                    };
                    row.insert(column.clone(), value);
                }
                rows.push(row);
            }
            Ok(QueryResult { columns, rows })
        }
    }
}

/// Inline property filters: every `(k, v)` pair must be present and equal.
fn props_match(actual: &PropMap, filters: &PropMap) -> bool {
    filters.iter().all(|(key, expected)| {
        actual
            .get(key)
            .is_some_and(|value| compare_eq(value, expected))
    })
}

fn compare_eq(a: &PropValue, b: &PropValue) -> bool {
    matches!(a.partial_cmp_value(b), Some(Ordering::Equal)) || a == b
}

fn eval_predicate<'a, F>(expr: &BoolExpr, lookup: &F) -> bool
where
    F: Fn(&str) -> Option<&'a PropMap>,
{
    match expr {
        BoolExpr::Cmp(cmp) => eval_comparison(cmp, lookup),
        BoolExpr::And(a, b) => eval_predicate(a, lookup) && eval_predicate(b, lookup),
        BoolExpr::Or(a, b) => eval_predicate(a, lookup) || eval_predicate(b, lookup),
    }
}

fn eval_comparison<'a, F>(cmp: &Comparison, lookup: &F) -> bool
where
    F: Fn(&str) -> Option<&'a PropMap>,
{
    let Some(props) = lookup(&cmp.var) else {
        return false;
    };
    let Some(actual) = props.get(&cmp.prop) else {
        return false;
    };
    match cmp.op {
        CmpOp::Eq => compare_eq(actual, &cmp.value),
        CmpOp::Ne => !compare_eq(actual, &cmp.value),
        CmpOp::Lt => matches!(
            actual.partial_cmp_value(&cmp.value),
            Some(Ordering::Less)
        ),
        CmpOp::Le => matches!(
            actual.partial_cmp_value(&cmp.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CmpOp::Gt => matches!(
            actual.partial_cmp_value(&cmp.value),
            Some(Ordering::Greater)
        ),
        CmpOp::Ge => matches!(
            actual.partial_cmp_value(&cmp.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}
