//! Deletions implied by a full edge batch.
//!
//! An edge sync submits every edge the client wants the graph to keep. Nodes
//! that no batch edge touches are dropped together with their stored edges,
//! then any stored edge whose id the batch does not repeat is dropped.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::Result;
use crate::models::{Edge, EdgeId, EdgeSubmission, NodeId};
use crate::reconcile::GraphState;
use crate::store::StoreTransaction;

/// A node to remove and the stored edges that must go before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCascade {
    pub node_id: NodeId,
    pub edge_ids: BTreeSet<EdgeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeSyncPlan {
    /// Applied first, in ascending node id order.
    pub cascades: Vec<NodeCascade>,
    /// Edges the batch no longer lists that no cascade already removes.
    pub stale_edges: BTreeSet<EdgeId>,
}

impl EdgeSyncPlan {
    pub fn is_empty(&self) -> bool {
        self.cascades.is_empty() && self.stale_edges.is_empty()
    }

    pub fn removed_node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.cascades.iter().map(|cascade| cascade.node_id)
    }

    pub fn removed_edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.cascades
            .iter()
            .flat_map(|cascade| cascade.edge_ids.iter().copied())
            .chain(self.stale_edges.iter().copied())
    }
}

/// Stored edge ids keyed by every node they touch.
pub fn incident_edges<'a>(edges: impl IntoIterator<Item = &'a Edge>) -> HashMap<NodeId, Vec<EdgeId>> {
    let mut incident: HashMap<NodeId, Vec<EdgeId>> = HashMap::new();
    for edge in edges {
        incident.entry(edge.source_id).or_default().push(edge.id);
        if edge.target_id != edge.source_id {
            incident.entry(edge.target_id).or_default().push(edge.id);
        }
    }
    incident
}

pub fn plan_edge_sync(state: &GraphState, batch: &[EdgeSubmission]) -> EdgeSyncPlan {
    let keep_node_ids: HashSet<NodeId> = batch
        .iter()
        .flat_map(|edge| [edge.source_id, edge.target_id])
        .collect();
    let incident = incident_edges(state.edges());

    let mut cascaded: HashSet<EdgeId> = HashSet::new();
    let mut cascades = Vec::new();
    for node in state.nodes() {
        if keep_node_ids.contains(&node.id) {
            continue;
        }

        let edge_ids = incident
            .get(&node.id)
            .into_iter()
            .flatten()
            .copied()
            .filter(|edge_id| cascaded.insert(*edge_id))
            .collect();
        cascades.push(NodeCascade {
            node_id: node.id,
            edge_ids,
        });
    }

    let submitted_edge_ids: HashSet<EdgeId> =
        batch.iter().filter_map(EdgeSubmission::existing_id).collect();
    let stale_edges = state
        .edges()
        .map(|edge| edge.id)
        .filter(|edge_id| !submitted_edge_ids.contains(edge_id) && !cascaded.contains(edge_id))
        .collect();

    EdgeSyncPlan {
        cascades,
        stale_edges,
    }
}

/// Executes `plan` through `tx`: each cascade deletes its edges and then its
/// node, and stale edges go last.
pub async fn apply_edge_sync_plan<T: StoreTransaction>(
    tx: &mut T,
    state: &mut GraphState,
    plan: &EdgeSyncPlan,
) -> Result<()> {
    for cascade in &plan.cascades {
        for edge_id in &cascade.edge_ids {
            tx.delete_edge(*edge_id).await?;
            state.forget_edge(*edge_id);
        }
        tx.delete_node(cascade.node_id).await?;
        state.forget_node(cascade.node_id);
    }

    for edge_id in &plan.stale_edges {
        tx.delete_edge(*edge_id).await?;
        state.forget_edge(*edge_id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;

    use super::*;
    use crate::models::{Graph, GraphId, Node, UserId};

    fn node(id: i64, label: &str) -> Node {
        Node {
            id: NodeId(id),
            label: label.to_string(),
            graph_id: GraphId(1),
        }
    }

    fn edge(id: i64, source: i64, target: i64) -> Edge {
        Edge {
            id: EdgeId(id),
            source_id: NodeId(source),
            target_id: NodeId(target),
            weight: None,
            graph_id: GraphId(1),
        }
    }

    fn submitted(id: Option<i64>, source: i64, target: i64) -> EdgeSubmission {
        EdgeSubmission {
            id: id.map(EdgeId),
            source_id: NodeId(source),
            target_id: NodeId(target),
            weight: None,
        }
    }

    fn state(nodes: Vec<Node>, edges: Vec<Edge>) -> GraphState {
        let now = NaiveDate::from_ymd_opt(2026, 1, 1)
            .expect("valid date")
            .and_hms_opt(0, 0, 0)
            .expect("valid datetime");
        let graph = Graph {
            id: GraphId(1),
            owner_id: UserId(1),
            name: "g".to_string(),
            directed: false,
            weighted: false,
            node_ids: nodes.iter().map(|node| node.id).collect(),
            edge_ids: edges.iter().map(|edge| edge.id).collect(),
            created_at: now,
            updated_at: now,
        };
        GraphState::from_parts(graph, nodes, edges)
    }

    fn ids<T: Ord + Copy>(items: &[T]) -> BTreeSet<T> {
        items.iter().copied().collect()
    }

    #[test]
    fn dropping_an_edge_drops_the_node_it_alone_referenced() {
        // A=1, B=2, C=3; A-B=10, B-C=11
        let graph = state(
            vec![node(1, "A"), node(2, "B"), node(3, "C")],
            vec![edge(10, 1, 2), edge(11, 2, 3)],
        );

        let plan = plan_edge_sync(&graph, &[submitted(Some(10), 1, 2)]);

        assert_eq!(
            plan.cascades,
            vec![NodeCascade {
                node_id: NodeId(3),
                edge_ids: ids(&[EdgeId(11)]),
            }]
        );
        assert!(plan.stale_edges.is_empty());
    }

    #[test]
    fn empty_batch_drops_everything() {
        let graph = state(
            vec![node(1, "A"), node(2, "B"), node(3, "Lonely")],
            vec![edge(10, 1, 2)],
        );

        let plan = plan_edge_sync(&graph, &[]);

        assert_eq!(
            plan.removed_node_ids().collect::<Vec<_>>(),
            vec![NodeId(1), NodeId(2), NodeId(3)]
        );
        // The edge is claimed by the first cascade only.
        assert_eq!(plan.cascades[0].edge_ids, ids(&[EdgeId(10)]));
        assert!(plan.cascades[1].edge_ids.is_empty());
        assert!(plan.cascades[2].edge_ids.is_empty());
        assert_eq!(plan.removed_edge_ids().count(), 1);
    }

    #[test]
    fn isolated_nodes_are_dropped_without_edges() {
        let graph = state(vec![node(1, "A"), node(2, "B")], vec![]);
        let plan = plan_edge_sync(&graph, &[]);
        assert_eq!(plan.cascades.len(), 2);
        assert_eq!(plan.removed_edge_ids().count(), 0);
    }

    #[test]
    fn stored_edges_missing_from_batch_are_stale() {
        let graph = state(
            vec![node(1, "A"), node(2, "B")],
            vec![edge(10, 1, 2), edge(11, 2, 1)],
        );

        // A new edge with the same endpoints does not keep the stored ones.
        let plan = plan_edge_sync(&graph, &[submitted(None, 1, 2), submitted(Some(0), 2, 1)]);

        assert!(plan.cascades.is_empty());
        assert_eq!(plan.stale_edges, ids(&[EdgeId(10), EdgeId(11)]));
    }

    #[test]
    fn resubmitting_the_stored_state_plans_nothing() {
        let graph = state(
            vec![node(1, "A"), node(2, "B"), node(3, "C")],
            vec![edge(10, 1, 2), edge(11, 2, 3)],
        );

        let plan = plan_edge_sync(
            &graph,
            &[submitted(Some(10), 1, 2), submitted(Some(11), 2, 3)],
        );

        assert!(plan.is_empty());
    }

    #[test]
    fn cascade_ignores_the_batch_for_edges_touching_dropped_nodes() {
        let graph = state(
            vec![node(1, "A"), node(2, "B"), node(3, "C")],
            vec![edge(10, 1, 2)],
        );

        // Edge 10 is retargeted from B to C, so B is no longer referenced.
        let plan = plan_edge_sync(&graph, &[submitted(Some(10), 1, 3)]);

        assert_eq!(
            plan.cascades,
            vec![NodeCascade {
                node_id: NodeId(2),
                edge_ids: ids(&[EdgeId(10)]),
            }]
        );
        assert!(plan.stale_edges.is_empty());
    }

    #[test]
    fn self_loops_are_listed_once() {
        let graph = state(vec![node(1, "A")], vec![edge(10, 1, 1)]);
        let incident = incident_edges(graph.edges());
        assert_eq!(incident[&NodeId(1)], vec![EdgeId(10)]);

        let plan = plan_edge_sync(&graph, &[]);
        assert_eq!(plan.removed_edge_ids().collect::<Vec<_>>(), vec![EdgeId(10)]);
    }
}
