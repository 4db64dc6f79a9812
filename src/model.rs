//! Data model for graph entities.
//!
//! Defines the core structures stored by the engine: nodes, directed labeled
//! edges, and their property maps, together with the validation rules the
//! write path enforces.
//!
//! # Key Types
//!
//! - [`Node`] - a graph node with a property map
//! - [`Edge`] - a directed, labeled edge between two nodes
//! - [`PropValue`] - the closed set of property value types
//! - [`NodeId`] / [`EdgeId`] - identifiers assigned by the writer

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};

/// Unique identifier for nodes in the graph.
pub type NodeId = u64;

/// Unique identifier for edges in the graph.
pub type EdgeId = u64;

/// Maximum length of a property key.
pub const MAX_KEY_LEN: usize = 255;

/// Maximum length of a string property value.
pub const MAX_STRING_LEN: usize = 10_000;

/// Maximum number of properties on a single node or edge.
pub const MAX_PROPS: usize = 1000;

/// Maximum length of an edge label.
pub const MAX_LABEL_LEN: usize = 255;

/// Property map shared by nodes and edges. Ordered so listings and
/// serialized output are deterministic.
pub type PropMap = BTreeMap<String, PropValue>;

/// A property value stored on a node or an edge.
///
/// The set is closed: strings, 64-bit integers and floats, booleans,
/// symbols (short interned-style names), and homogeneous-or-mixed lists
/// thereof. There is no null; absence is expressed by omitting the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum PropValue {
    /// UTF-8 string, at most [`MAX_STRING_LEN`] characters.
    Str(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Atom-like short name, validated like a property key.
    Symbol(String),
    /// List of property values (lists do not nest further).
    List(Vec<PropValue>),
}

impl PropValue {
    /// Canonical byte encoding used as the property-index key component.
    /// Tagged per variant; floats encode via their IEEE-754 bit pattern.
    pub(crate) fn index_bytes(&self, out: &mut Vec<u8>) {
        match self {
            PropValue::Str(s) => {
                out.push(b's');
                out.extend_from_slice(s.as_bytes());
            }
            PropValue::Int(i) => {
                out.push(b'i');
                out.extend_from_slice(&i.to_be_bytes());
            }
            PropValue::Float(f) => {
                out.push(b'f');
                out.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            PropValue::Bool(b) => {
                out.push(b'b');
                out.push(*b as u8);
            }
            PropValue::Symbol(s) => {
                out.push(b'y');
                out.extend_from_slice(s.as_bytes());
            }
            PropValue::List(items) => {
                out.push(b'l');
                out.extend_from_slice(&(items.len() as u32).to_be_bytes());
                for item in items {
                    let mut inner = Vec::new();
                    item.index_bytes(&mut inner);
                    out.extend_from_slice(&(inner.len() as u32).to_be_bytes());
                    out.extend_from_slice(&inner);
                }
            }
        }
    }
}

impl PropValue {
    /// Ordering between two values of comparable types. Integers and
    /// floats compare numerically across the two variants; every other
    /// cross-type pair is incomparable.
    pub fn partial_cmp_value(&self, other: &PropValue) -> Option<std::cmp::Ordering> {
        use PropValue::*;
        match (self, other) {
            (Str(a), Str(b)) => a.partial_cmp(b),
            (Symbol(a), Symbol(b)) => a.partial_cmp(b),
            (Int(a), Int(b)) => a.partial_cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Bool(a), Bool(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) => write!(f, "{s:?}"),
            PropValue::Int(i) => write!(f, "{i}"),
            PropValue::Float(x) => write!(f, "{x}"),
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Symbol(s) => write!(f, ":{s}"),
            PropValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

/// A node in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Identifier assigned by the writer.
    pub id: NodeId,
    /// Properties as key-value pairs.
    pub properties: PropMap,
}

/// A directed edge connecting two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Identifier assigned by the writer.
    pub id: EdgeId,
    /// Source node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
    /// Non-empty relationship label.
    pub label: String,
    /// Properties as key-value pairs.
    pub properties: PropMap,
}

/// Validates a property key: identifier-shaped, not underscore-prefixed,
/// bounded length.
pub fn validate_prop_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(TrellisError::InvalidProperties(format!(
            "property key '{key}' must be 1..={MAX_KEY_LEN} characters"
        )));
    }
    let mut chars = key.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphabetic() {
        return Err(TrellisError::InvalidProperties(format!(
            "property key '{key}' must start with a letter"
        )));
    }
    if chars.any(|c| !c.is_ascii_alphanumeric() && c != '_') {
        return Err(TrellisError::InvalidProperties(format!(
            "property key '{key}' may only contain letters, digits, and underscores"
        )));
    }
    Ok(())
}

fn validate_prop_value(key: &str, value: &PropValue, nested: bool) -> Result<()> {
    match value {
        PropValue::Str(s) if s.chars().count() > MAX_STRING_LEN => {
            Err(TrellisError::InvalidProperties(format!(
                "string value for '{key}' exceeds {MAX_STRING_LEN} characters"
            )))
        }
        PropValue::Symbol(s) => validate_prop_key(s).map_err(|_| {
            TrellisError::InvalidProperties(format!("symbol value for '{key}' is not a valid name"))
        }),
        PropValue::List(items) => {
            if nested {
                return Err(TrellisError::InvalidProperties(format!(
                    "list value for '{key}' must not contain nested lists"
                )));
            }
            for item in items {
                validate_prop_value(key, item, true)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Validates a full property map against the write-path rules.
pub fn validate_props(props: &PropMap) -> Result<()> {
    if props.len() > MAX_PROPS {
        return Err(TrellisError::InvalidProperties(format!(
            "{} properties exceed the maximum of {MAX_PROPS}",
            props.len()
        )));
    }
    for (key, value) in props {
        validate_prop_key(key)?;
        validate_prop_value(key, value, false)?;
    }
    Ok(())
}

/// Validates an edge label: non-empty, label-shaped, bounded length.
pub fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return Err(TrellisError::InvalidLabel(format!(
            "label '{label}' must be 1..={MAX_LABEL_LEN} characters"
        )));
    }
    let mut chars = label.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphabetic() {
        return Err(TrellisError::InvalidLabel(format!(
            "label '{label}' must start with a letter"
        )));
    }
    if chars.any(|c| !c.is_ascii_alphanumeric() && c != '_' && c != '-') {
        return Err(TrellisError::InvalidLabel(format!(
            "label '{label}' may only contain letters, digits, underscores, and dashes"
        )));
    }
    Ok(())
}

/// Builds a property map from `(key, value)` pairs. Test and example helper.
pub fn props<K, V, I>(pairs: I) -> PropMap
where
    K: Into<String>,
    V: Into<PropValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
