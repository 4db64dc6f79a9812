//! Rule-based planning for `MATCH` queries.
//!
//! The planner picks the most selective index-backed starting point: a
//! property equality on the leftmost variable drives the property index, a
//! relationship label filter drives the label index, and everything else
//! falls back to a table scan. Residual filters evaluate row by row.

use crate::error::{Result, TrellisError};
use crate::model::PropValue;

use super::ast::{MatchQuery, NodePattern, Pattern, RelPattern};

/// Starting point for a lone-node match.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSource {
    AllNodes,
    PropIndex { key: String, value: PropValue },
}

/// Starting point for an edge expansion.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeSource {
    AllEdges,
    LabelIndex(String),
    /// Drive from the property index on the left endpoint, then expand its
    /// outgoing edges.
    LeftPropIndex { key: String, value: PropValue },
}

/// Compiled plan for a `MATCH` query.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchPlan {
    Nodes {
        source: NodeSource,
        pattern: NodePattern,
        query: MatchQuery,
    },
    Edges {
        source: EdgeSource,
        left: NodePattern,
        rel: RelPattern,
        right: NodePattern,
        query: MatchQuery,
    },
}

impl MatchPlan {
    /// One-line human-readable description, used by `EXPLAIN`.
    pub fn describe(&self) -> String {
        match self {
            MatchPlan::Nodes { source, pattern, query } => {
                let scan = match source {
                    NodeSource::AllNodes => "NodeScan".to_string(),
                    NodeSource::PropIndex { key, value } => {
                        format!("PropIndexScan({key}={value})")
                    }
                };
                format!(
                    "{scan} -> Filter({} inline, {} predicate) -> Project({})",
                    pattern.props.len(),
                    if query.predicate.is_some() { "1" } else { "0" },
                    if query.returns.is_empty() {
                        "*".to_string()
                    } else {
                        query.returns.join(", ")
                    }
                )
            }
            MatchPlan::Edges { source, query, .. } => {
                let scan = match source {
                    EdgeSource::AllEdges => "EdgeScan".to_string(),
                    EdgeSource::LabelIndex(label) => format!("LabelIndexScan({label})"),
                    EdgeSource::LeftPropIndex { key, value } => {
                        format!("PropIndexScan({key}={value}) -> ExpandOut")
                    }
                };
                format!(
                    "{scan} -> Filter -> Project({})",
                    if query.returns.is_empty() {
                        "*".to_string()
                    } else {
                        query.returns.join(", ")
                    }
                )
            }
        }
    }
}

fn first_prop(props: &crate::model::PropMap) -> Option<(String, PropValue)> {
    props
        .iter()
        .next()
        .map(|(k, v)| (k.clone(), v.clone()))
}

/// Compiles a `MATCH` AST into a plan, validating variable references.
pub fn plan_match(query: &MatchQuery) -> Result<MatchPlan> {
    let bound: Vec<&str> = match &query.pattern {
        Pattern::Node(node) => vec![node.var.as_str()],
        Pattern::Edge { left, rel, right } => {
            let mut vars = vec![left.var.as_str()];
            if let Some(var) = &rel.var {
                vars.push(var.as_str());
            }
            vars.push(right.var.as_str());
            vars
        }
    };

    for name in &query.returns {
        if !bound.contains(&name.as_str()) {
            return Err(TrellisError::InvalidQuerySyntax(format!(
                "RETURN references unbound variable '{name}'"
            )));
        }
    }
    if let Some(predicate) = &query.predicate {
        for var in predicate.variables() {
            if !bound.contains(&var) {
                return Err(TrellisError::InvalidQuerySyntax(format!(
                    "WHERE references unbound variable '{var}'"
                )));
            }
        }
    }

    Ok(match &query.pattern {
        Pattern::Node(node) => {
            let source = match first_prop(&node.props) {
                Some((key, value)) => NodeSource::PropIndex { key, value },
                None => NodeSource::AllNodes,
            };
            MatchPlan::Nodes {
                source,
                pattern: node.clone(),
                query: query.clone(),
            }
        }
        Pattern::Edge { left, rel, right } => {
            let source = if let Some((key, value)) = first_prop(&left.props) {
                EdgeSource::LeftPropIndex { key, value }
            } else if let Some(label) = &rel.label {
                EdgeSource::LabelIndex(label.clone())
            } else {
                EdgeSource::AllEdges
            };
            MatchPlan::Edges {
                source,
                left: left.clone(),
                rel: rel.clone(),
                right: right.clone(),
                query: query.clone(),
            }
        }
    })
}
