use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::model::{EdgeId, NodeId};

pub type Result<T> = std::result::Result<T, TrellisError>;

/// Crate-wide error type.
///
/// Variants are grouped by class: validation, lookup, capacity/consistency,
/// and cluster/transport. Only the transport class is retryable; see
/// [`TrellisError::is_retryable`].
#[derive(Debug, Error)]
pub enum TrellisError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid properties: {0}")]
    InvalidProperties(String),
    #[error("invalid label: {0}")]
    InvalidLabel(String),
    #[error("invalid query syntax: {0}")]
    InvalidQuerySyntax(String),
    #[error("invalid identifier: {0}")]
    InvalidId(u64),
    #[error("invalid traversal depth {given} (maximum {max})")]
    InvalidDepth { given: u32, max: u32 },
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("edge {0} not found")]
    EdgeNotFound(EdgeId),
    #[error("no path from {from} to {to} within {max_depth} hops")]
    PathNotFound {
        from: NodeId,
        to: NodeId,
        max_depth: u32,
    },
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),
    #[error("connection to {0} failed")]
    ConnectionFailed(String),
    #[error("cluster unavailable: {0}")]
    ClusterUnavailable(String),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TrellisError {
    /// Whether retrying the failed operation can succeed without operator
    /// intervention. Only the cluster/transport class qualifies.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrellisError::ConnectionFailed(_)
                | TrellisError::ClusterUnavailable(_)
                | TrellisError::NetworkError(_)
                | TrellisError::Timeout(_)
        )
    }

    /// Machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            TrellisError::Validation(_) => "ValidationError",
            TrellisError::InvalidProperties(_) => "InvalidProperties",
            TrellisError::InvalidLabel(_) => "InvalidLabel",
            TrellisError::InvalidQuerySyntax(_) => "InvalidQuerySyntax",
            TrellisError::InvalidId(_) => "InvalidId",
            TrellisError::InvalidDepth { .. } => "InvalidDepth",
            TrellisError::NodeNotFound(_) => "NodeNotFound",
            TrellisError::EdgeNotFound(_) => "EdgeNotFound",
            TrellisError::PathNotFound { .. } => "PathNotFound",
            TrellisError::DuplicateEntry(_) => "DuplicateEntry",
            TrellisError::ConstraintViolation(_) => "ConstraintViolation",
            TrellisError::InsufficientResources(_) => "InsufficientResources",
            TrellisError::ConnectionFailed(_) => "ConnectionFailed",
            TrellisError::ClusterUnavailable(_) => "ClusterUnavailable",
            TrellisError::NetworkError(_) => "NetworkError",
            TrellisError::Timeout(_) => "Timeout",
            TrellisError::Unauthorized(_) => "Unauthorized",
            TrellisError::Io(_) => "Io",
            TrellisError::Serialization(_) => "Serialization",
        }
    }

    /// Operator-facing hint appended to transport errors surfaced from
    /// explicit RPCs (cluster join and friends).
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            TrellisError::ConnectionFailed(_) => {
                Some("check that the peer is running and reachable, then retry")
            }
            TrellisError::ClusterUnavailable(_) => {
                Some("wait for quorum to recover or seed additional members")
            }
            TrellisError::NetworkError(_) => Some("retry with backoff; inspect transport logs"),
            TrellisError::Timeout(_) => Some("retry with a longer deadline"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(TrellisError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(TrellisError::ConnectionFailed("m2".into()).is_retryable());
        assert!(!TrellisError::NodeNotFound(7).is_retryable());
        assert!(!TrellisError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(TrellisError::InvalidProperties("x".into()).code(), "InvalidProperties");
        assert_eq!(
            TrellisError::PathNotFound {
                from: 1,
                to: 2,
                max_depth: 3
            }
            .code(),
            "PathNotFound"
        );
    }
}
