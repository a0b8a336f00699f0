use std::collections::BTreeSet;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{LibError, Result};

macro_rules! record_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Ids at or below zero mark a record the client wants created.
            pub const fn is_assigned(self) -> bool {
                self.0 > 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.parse::<i64>().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

record_id!(UserId);
record_id!(GraphId);
record_id!(NodeId);
record_id!(EdgeId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub const fn as_db_value(self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub role: Role,
}

/// Stored graph record. Membership is tracked by id; nodes and edges live in
/// their own tables and are joined in through [`GraphView`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub id: GraphId,
    pub owner_id: UserId,
    pub name: String,
    pub directed: bool,
    pub weighted: bool,
    pub node_ids: BTreeSet<NodeId>,
    pub edge_ids: BTreeSet<EdgeId>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub graph_id: GraphId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub weight: Option<f64>,
    pub graph_id: GraphId,
}

impl Edge {
    pub fn touches(&self, node_id: NodeId) -> bool {
        self.source_id == node_id || self.target_id == node_id
    }
}

#[derive(Debug, Clone)]
pub struct NewEdge {
    pub graph_id: GraphId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub weight: Option<f64>,
}

/// A graph with its member records joined in, as returned to clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphView {
    pub id: GraphId,
    pub owner_id: UserId,
    pub name: String,
    pub directed: bool,
    pub weighted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// One page of results. `limit` is `None` when the listing was not paged.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub page: u32,
    pub limit: Option<u32>,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListGraphsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListGraphsQuery {
    /// Page number and page size. Without a `limit` every graph is listed
    /// and `page` is ignored.
    pub fn pagination(&self) -> (u32, Option<u32>) {
        match self.limit {
            Some(limit) => (self.page.unwrap_or(1).max(1), Some(limit.clamp(1, 200))),
            None => (1, None),
        }
    }
}

/// Graph fields a client may set. An assigned `id` turns the submission into
/// a metadata update of that graph.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSubmission {
    #[serde(default)]
    pub id: Option<GraphId>,
    pub name: String,
    #[serde(default)]
    pub directed: bool,
    #[serde(default)]
    pub weighted: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub name: String,
    #[serde(default)]
    pub directed: bool,
    #[serde(default)]
    pub weighted: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSubmission {
    #[serde(default)]
    pub id: Option<NodeId>,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSubmission {
    #[serde(default)]
    pub id: Option<EdgeId>,
    #[serde(alias = "source_id")]
    pub source_id: NodeId,
    #[serde(alias = "target_id")]
    pub target_id: NodeId,
    #[serde(default)]
    pub weight: Option<f64>,
}

impl GraphSubmission {
    pub fn split(self) -> (Option<GraphId>, GraphMetadata) {
        (
            self.id.filter(|id| id.is_assigned()),
            GraphMetadata {
                name: self.name,
                directed: self.directed,
                weighted: self.weighted,
            },
        )
    }
}

impl GraphMetadata {
    pub fn normalize(self) -> Result<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(LibError::invalid(
                "Graph name is required",
                anyhow!("empty graph name"),
            ));
        }

        Ok(Self {
            name,
            directed: self.directed,
            weighted: self.weighted,
        })
    }
}

impl NodeSubmission {
    pub fn existing_id(&self) -> Option<NodeId> {
        self.id.filter(|id| id.is_assigned())
    }

    /// Labels are compared verbatim, so only blank labels are rejected here.
    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(LibError::invalid(
                "Node label is required",
                anyhow!("node submission {:?} had empty label", self.id),
            ));
        }
        Ok(())
    }
}

impl EdgeSubmission {
    pub fn existing_id(&self) -> Option<EdgeId> {
        self.id.filter(|id| id.is_assigned())
    }

    /// Resolves the weight to store for a graph with the given weighting.
    pub fn weight_for(&self, weighted: bool) -> Result<Option<f64>> {
        if !weighted {
            return Ok(None);
        }

        match self.weight {
            Some(weight) if weight.is_finite() => Ok(Some(weight)),
            Some(weight) => Err(LibError::invalid(
                "Edge weight must be a finite number",
                anyhow!("non-finite weight {} for edge {:?}", weight, self.id),
            )),
            None => Err(LibError::invalid(
                "Weighted graphs require an edge weight",
                anyhow!(
                    "missing weight for edge {:?} ({} -> {})",
                    self.id,
                    self.source_id,
                    self.target_id
                ),
            )),
        }
    }
}
