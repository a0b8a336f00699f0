use std::fmt;

use anyhow::anyhow;
use serde::Serialize;

use crate::models::{EdgeId, GraphId, NodeId};

pub type Result<T> = std::result::Result<T, LibError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AccessDenied,
    CrossGraphReference,
    DuplicateLabel,
    InvalidInput,
    NotFound,
    Store,
    Unauthenticated,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Graph,
    Node,
    Edge,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::User => "user",
            EntityKind::Graph => "graph",
            EntityKind::Node => "node",
            EntityKind::Edge => "edge",
        };
        f.write_str(name)
    }
}

/// Structured, client-safe context attached to an error response. Ids of
/// graphs other than the one addressed stay in the internal source only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorDetails {
    MissingEntity {
        entity: EntityKind,
        id: i64,
    },
    DuplicateLabel {
        graph_id: GraphId,
        label: String,
        existing_node_id: NodeId,
    },
    ForeignNode {
        graph_id: GraphId,
        node_id: NodeId,
    },
    ForeignEdge {
        graph_id: GraphId,
        edge_id: EdgeId,
    },
}

#[derive(Debug)]
pub struct LibError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub public: &'static str,
    pub details: Option<ErrorDetails>,
    pub source: anyhow::Error,
}

impl LibError {
    pub fn store(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Store,
            code: "store_error",
            public,
            details: None,
            source,
        }
    }

    pub fn invalid(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code: "invalid_input",
            public,
            details: None,
            source,
        }
    }

    pub fn access_denied(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::AccessDenied,
            code: "access_denied",
            public,
            details: None,
            source,
        }
    }

    pub fn unauthenticated(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Unauthenticated,
            code: "unauthenticated",
            public,
            details: None,
            source,
        }
    }

    pub fn not_found(entity: EntityKind, id: i64) -> Self {
        let (code, public) = match entity {
            EntityKind::User => ("user_not_found", "User not found"),
            EntityKind::Graph => ("graph_not_found", "Graph not found"),
            EntityKind::Node => ("node_not_found", "Node not found"),
            EntityKind::Edge => ("edge_not_found", "Edge not found"),
        };
        Self {
            kind: ErrorKind::NotFound,
            code,
            public,
            details: Some(ErrorDetails::MissingEntity { entity, id }),
            source: anyhow!("{} {} not found", entity, id),
        }
    }

    pub fn duplicate_label(graph_id: GraphId, label: &str, existing_node_id: NodeId) -> Self {
        Self {
            kind: ErrorKind::DuplicateLabel,
            code: "duplicate_label",
            public: "A node with this label already exists in the graph",
            details: Some(ErrorDetails::DuplicateLabel {
                graph_id,
                label: label.to_string(),
                existing_node_id,
            }),
            source: anyhow!(
                "label {:?} already used by node {} in graph {}",
                label,
                existing_node_id,
                graph_id
            ),
        }
    }

    pub fn foreign_node(graph_id: GraphId, node_id: NodeId, node_graph_id: GraphId) -> Self {
        Self {
            kind: ErrorKind::CrossGraphReference,
            code: "cross_graph_reference",
            public: "Node does not belong to the specified graph",
            details: Some(ErrorDetails::ForeignNode { graph_id, node_id }),
            source: anyhow!(
                "node {} belongs to graph {}, not graph {}",
                node_id,
                node_graph_id,
                graph_id
            ),
        }
    }

    pub fn foreign_edge(graph_id: GraphId, edge_id: EdgeId, edge_graph_id: GraphId) -> Self {
        Self {
            kind: ErrorKind::CrossGraphReference,
            code: "cross_graph_reference",
            public: "Edge does not belong to the specified graph",
            details: Some(ErrorDetails::ForeignEdge { graph_id, edge_id }),
            source: anyhow!(
                "edge {} belongs to graph {}, not graph {}",
                edge_id,
                edge_graph_id,
                graph_id
            ),
        }
    }

    pub fn unknown(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            code: "unknown_error",
            public,
            details: None,
            source,
        }
    }
}

impl fmt::Display for LibError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.source)
    }
}

impl std::error::Error for LibError {}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for LibError {
    fn from(value: sqlx::Error) -> Self {
        Self::store("Store request failed", anyhow!(value))
    }
}
