use anyhow::anyhow;
use serde::Serialize;

use crate::error::{LibError, Result};
use crate::models::{EdgeId, GraphId, NodeId};
use crate::reconcile::GraphState;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphInvariantViolation {
    UnknownNodeReference {
        edge_id: EdgeId,
        missing_node_id: NodeId,
    },
    ForeignNode {
        node_id: NodeId,
        node_graph_id: GraphId,
    },
    ForeignEdge {
        edge_id: EdgeId,
        edge_graph_id: GraphId,
    },
    UnlistedMember {
        graph_id: GraphId,
    },
    EdgeWeightMismatch {
        edge_id: EdgeId,
        weighted: bool,
    },
}

impl GraphInvariantViolation {
    pub const fn error_code(&self) -> &'static str {
        match self {
            GraphInvariantViolation::UnknownNodeReference { .. } => "graph_dangling_edge",
            GraphInvariantViolation::ForeignNode { .. } => "graph_foreign_node",
            GraphInvariantViolation::ForeignEdge { .. } => "graph_foreign_edge",
            GraphInvariantViolation::UnlistedMember { .. } => "graph_membership_mismatch",
            GraphInvariantViolation::EdgeWeightMismatch { .. } => "graph_weight_mismatch",
        }
    }
}

/// Structural violations in a graph's working state: edges pointing at nodes
/// outside the graph, members tagged with another graph id, member sets
/// that disagree with the loaded records, or edge weights that do not fit the
/// graph's weighting.
pub fn graph_invariant_violations(state: &GraphState) -> Vec<GraphInvariantViolation> {
    let graph_id = state.id();
    let mut violations = Vec::new();

    for node in state.nodes() {
        if node.graph_id != graph_id {
            violations.push(GraphInvariantViolation::ForeignNode {
                node_id: node.id,
                node_graph_id: node.graph_id,
            });
        }
    }

    for edge in state.edges() {
        if edge.graph_id != graph_id {
            violations.push(GraphInvariantViolation::ForeignEdge {
                edge_id: edge.id,
                edge_graph_id: edge.graph_id,
            });
        }
        let weight_fits = match edge.weight {
            Some(weight) => state.graph.weighted && weight.is_finite(),
            None => !state.graph.weighted,
        };
        if !weight_fits {
            violations.push(GraphInvariantViolation::EdgeWeightMismatch {
                edge_id: edge.id,
                weighted: state.graph.weighted,
            });
        }
        for endpoint in [edge.source_id, edge.target_id] {
            if state.node(endpoint).is_none() {
                violations.push(GraphInvariantViolation::UnknownNodeReference {
                    edge_id: edge.id,
                    missing_node_id: endpoint,
                });
            }
        }
    }

    let node_ids_match = state.nodes().map(|node| node.id).eq(state.graph.node_ids.iter().copied());
    let edge_ids_match = state.edges().map(|edge| edge.id).eq(state.graph.edge_ids.iter().copied());
    if !node_ids_match || !edge_ids_match {
        violations.push(GraphInvariantViolation::UnlistedMember { graph_id });
    }

    violations
}

pub fn ensure_graph_invariants(state: &GraphState) -> Result<()> {
    let violations = graph_invariant_violations(state);
    if let Some(first) = violations.first() {
        return Err(LibError {
            code: first.error_code(),
            ..LibError::unknown(
                "Graph integrity check failed",
                anyhow!(
                    "graph {} failed integrity validation: {:?}",
                    state.id(),
                    violations
                ),
            )
        });
    }

    Ok(())
}
