use std::collections::BTreeMap;

use crate::error::{EntityKind, LibError, Result};
use crate::models::{
    Edge, EdgeId, EdgeSubmission, Graph, GraphId, GraphView, NewEdge, Node, NodeId, NodeSubmission,
};
use crate::store::StoreTransaction;

/// Working copy of one graph and its members, loaded inside a transaction
/// and kept in step with every write made through it.
#[derive(Debug, Clone)]
pub struct GraphState {
    pub graph: Graph,
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
}

impl GraphState {
    pub fn from_parts(graph: Graph, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            graph,
            nodes: nodes.into_iter().map(|node| (node.id, node)).collect(),
            edges: edges.into_iter().map(|edge| (edge.id, edge)).collect(),
        }
    }

    pub async fn load<T: StoreTransaction>(tx: &mut T, graph_id: GraphId) -> Result<Self> {
        let graph = find_graph(tx, graph_id).await?;
        Self::hydrate(tx, graph).await
    }

    pub async fn hydrate<T: StoreTransaction>(tx: &mut T, graph: Graph) -> Result<Self> {
        let nodes = tx.graph_nodes(graph.id).await?;
        let edges = tx.graph_edges(graph.id).await?;
        Ok(Self::from_parts(graph, nodes, edges))
    }

    pub fn id(&self) -> GraphId {
        self.graph.id
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    /// Node currently carrying exactly `label`, if any.
    pub fn node_with_label(&self, label: &str) -> Option<&Node> {
        self.nodes.values().find(|node| node.label == label)
    }

    pub(crate) fn remember_node(&mut self, node: Node) {
        self.graph.node_ids.insert(node.id);
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn remember_edge(&mut self, edge: Edge) {
        self.graph.edge_ids.insert(edge.id);
        self.edges.insert(edge.id, edge);
    }

    pub(crate) fn forget_node(&mut self, id: NodeId) {
        self.graph.node_ids.remove(&id);
        self.nodes.remove(&id);
    }

    pub(crate) fn forget_edge(&mut self, id: EdgeId) {
        self.graph.edge_ids.remove(&id);
        self.edges.remove(&id);
    }

    pub fn into_view(self) -> GraphView {
        GraphView {
            id: self.graph.id,
            owner_id: self.graph.owner_id,
            name: self.graph.name,
            directed: self.graph.directed,
            weighted: self.graph.weighted,
            created_at: self.graph.created_at,
            updated_at: self.graph.updated_at,
            nodes: self.nodes.into_values().collect(),
            edges: self.edges.into_values().collect(),
        }
    }
}

pub async fn find_graph<T: StoreTransaction>(tx: &mut T, graph_id: GraphId) -> Result<Graph> {
    tx.find_graph(graph_id)
        .await?
        .ok_or_else(|| LibError::not_found(EntityKind::Graph, graph_id.0))
}

/// Creates or renames a single node of `state`'s graph.
///
/// Creation refuses a label already used in the graph. Renames are not
/// checked against other labels.
pub async fn upsert_node<T: StoreTransaction>(
    tx: &mut T,
    state: &mut GraphState,
    submitted: &NodeSubmission,
) -> Result<Node> {
    submitted.validate()?;

    let Some(node_id) = submitted.existing_id() else {
        return create_node(tx, state, &submitted.label).await;
    };

    let mut node = lookup_node(tx, state, node_id).await?;
    ensure_member_node(state, &node)?;
    node.label = submitted.label.clone();
    tx.update_node(&node).await?;
    tracing::debug!(graph_id = %state.id(), node_id = %node.id, "updated node label");
    state.remember_node(node.clone());
    Ok(node)
}

async fn create_node<T: StoreTransaction>(
    tx: &mut T,
    state: &mut GraphState,
    label: &str,
) -> Result<Node> {
    if let Some(existing) = state.node_with_label(label) {
        return Err(LibError::duplicate_label(state.id(), label, existing.id));
    }

    let node = tx.insert_node(state.id(), label).await?;
    tracing::debug!(graph_id = %state.id(), node_id = %node.id, "created node");
    state.remember_node(node.clone());
    Ok(node)
}

/// Creates or rewrites a single edge of `state`'s graph. Both endpoints must
/// already be nodes of the same graph.
pub async fn upsert_edge<T: StoreTransaction>(
    tx: &mut T,
    state: &mut GraphState,
    submitted: &EdgeSubmission,
) -> Result<Edge> {
    let source = lookup_node(tx, state, submitted.source_id).await?;
    let target = lookup_node(tx, state, submitted.target_id).await?;
    ensure_member_node(state, &source)?;
    ensure_member_node(state, &target)?;
    let weight = submitted.weight_for(state.graph.weighted)?;

    let edge = match submitted.existing_id() {
        Some(edge_id) => {
            let mut edge = lookup_member_edge(tx, state, edge_id).await?;
            edge.source_id = source.id;
            edge.target_id = target.id;
            edge.weight = weight;
            tx.update_edge(&edge).await?;
            tracing::debug!(graph_id = %state.id(), edge_id = %edge.id, "updated edge");
            edge
        }
        None => {
            let edge = tx
                .insert_edge(NewEdge {
                    graph_id: state.id(),
                    source_id: source.id,
                    target_id: target.id,
                    weight,
                })
                .await?;
            tracing::debug!(graph_id = %state.id(), edge_id = %edge.id, "created edge");
            edge
        }
    };

    state.remember_edge(edge.clone());
    Ok(edge)
}

async fn lookup_node<T: StoreTransaction>(
    tx: &mut T,
    state: &GraphState,
    node_id: NodeId,
) -> Result<Node> {
    if let Some(node) = state.node(node_id) {
        return Ok(node.clone());
    }

    tx.find_node(node_id)
        .await?
        .ok_or_else(|| LibError::not_found(EntityKind::Node, node_id.0))
}

fn ensure_member_node(state: &GraphState, node: &Node) -> Result<()> {
    if node.graph_id == state.id() {
        Ok(())
    } else {
        Err(LibError::foreign_node(state.id(), node.id, node.graph_id))
    }
}

/// Resolves an edge that must belong to `state`'s graph.
async fn lookup_member_edge<T: StoreTransaction>(
    tx: &mut T,
    state: &GraphState,
    edge_id: EdgeId,
) -> Result<Edge> {
    if let Some(edge) = state.edge(edge_id) {
        return Ok(edge.clone());
    }

    match tx.find_edge(edge_id).await? {
        Some(edge) if edge.graph_id == state.id() => Ok(edge),
        Some(edge) => Err(LibError::foreign_edge(state.id(), edge.id, edge.graph_id)),
        None => Err(LibError::not_found(EntityKind::Edge, edge_id.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorDetails, ErrorKind};
    use crate::memory::{MemoryStore, MemoryTransaction};
    use crate::models::{GraphMetadata, NewUser, Role};
    use crate::store::EntityStore;

    async fn graph_fixture(weighted: bool) -> (MemoryTransaction, GraphState, GraphState) {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.expect("begin");
        let owner = tx
            .insert_user(NewUser {
                name: "u1".to_string(),
                password_hash: "hash".to_string(),
                email: None,
                role: Role::User,
            })
            .await
            .expect("user");
        let metadata = GraphMetadata {
            name: "g".to_string(),
            directed: true,
            weighted,
        };
        let first = tx.insert_graph(owner.id, &metadata).await.expect("g1");
        let second = tx.insert_graph(owner.id, &metadata).await.expect("g2");
        let first = GraphState::hydrate(&mut tx, first).await.expect("state 1");
        let second = GraphState::hydrate(&mut tx, second).await.expect("state 2");
        (tx, first, second)
    }

    fn new_node(label: &str) -> NodeSubmission {
        NodeSubmission {
            id: None,
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_label_in_same_graph() {
        let (mut tx, mut state, mut other) = graph_fixture(false).await;
        let x = upsert_node(&mut tx, &mut state, &new_node("X"))
            .await
            .expect("create X");

        let err = upsert_node(&mut tx, &mut state, &new_node("X"))
            .await
            .expect_err("duplicate label");
        assert_eq!(err.kind, ErrorKind::DuplicateLabel);
        assert!(matches!(
            err.details,
            Some(ErrorDetails::DuplicateLabel { existing_node_id, .. }) if existing_node_id == x.id
        ));
        assert_eq!(state.nodes().count(), 1);

        upsert_node(&mut tx, &mut state, &new_node("x"))
            .await
            .expect("labels are case-sensitive");
        upsert_node(&mut tx, &mut other, &new_node("X"))
            .await
            .expect("labels are scoped per graph");
    }

    #[tokio::test]
    async fn zero_id_is_treated_as_creation() {
        let (mut tx, mut state, _) = graph_fixture(false).await;
        let node = upsert_node(
            &mut tx,
            &mut state,
            &NodeSubmission {
                id: Some(NodeId(0)),
                label: "A".to_string(),
            },
        )
        .await
        .expect("create");
        assert!(node.id.is_assigned());
        assert!(state.graph.node_ids.contains(&node.id));
    }

    #[tokio::test]
    async fn update_only_touches_the_label() {
        let (mut tx, mut state, _) = graph_fixture(false).await;
        let node = upsert_node(&mut tx, &mut state, &new_node("A"))
            .await
            .expect("create");

        let renamed = upsert_node(
            &mut tx,
            &mut state,
            &NodeSubmission {
                id: Some(node.id),
                label: "B".to_string(),
            },
        )
        .await
        .expect("rename");
        assert_eq!(renamed.id, node.id);
        assert_eq!(renamed.graph_id, state.id());
        assert_eq!(
            tx.find_node(node.id).await.expect("find").expect("node").label,
            "B"
        );
    }

    #[tokio::test]
    async fn updating_unknown_or_foreign_nodes_fails() {
        let (mut tx, mut state, mut other) = graph_fixture(false).await;
        let foreign = upsert_node(&mut tx, &mut other, &new_node("F"))
            .await
            .expect("create");

        let err = upsert_node(
            &mut tx,
            &mut state,
            &NodeSubmission {
                id: Some(NodeId(999)),
                label: "Z".to_string(),
            },
        )
        .await
        .expect_err("missing node");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.code, "node_not_found");

        let err = upsert_node(
            &mut tx,
            &mut state,
            &NodeSubmission {
                id: Some(foreign.id),
                label: "Z".to_string(),
            },
        )
        .await
        .expect_err("foreign node");
        assert_eq!(err.kind, ErrorKind::CrossGraphReference);
        assert_eq!(
            tx.find_node(foreign.id).await.expect("find").expect("node").label,
            "F"
        );
    }

    #[tokio::test]
    async fn edges_require_endpoints_from_the_same_graph() {
        let (mut tx, mut state, mut other) = graph_fixture(true).await;
        let a = upsert_node(&mut tx, &mut state, &new_node("A"))
            .await
            .expect("a");
        let foreign = upsert_node(&mut tx, &mut other, &new_node("F"))
            .await
            .expect("foreign");

        let err = upsert_edge(
            &mut tx,
            &mut state,
            &EdgeSubmission {
                id: None,
                source_id: a.id,
                target_id: foreign.id,
                weight: Some(1.0),
            },
        )
        .await
        .expect_err("cross graph");
        assert_eq!(err.kind, ErrorKind::CrossGraphReference);
        assert_eq!(state.edges().count(), 0);

        let err = upsert_edge(
            &mut tx,
            &mut state,
            &EdgeSubmission {
                id: None,
                source_id: a.id,
                target_id: NodeId(404),
                weight: Some(1.0),
            },
        )
        .await
        .expect_err("missing endpoint");
        assert_eq!(err.code, "node_not_found");
        assert!(tx.graph_edges(state.id()).await.expect("edges").is_empty());
    }

    #[tokio::test]
    async fn edge_update_rewrites_endpoints_and_weight() {
        let (mut tx, mut state, _) = graph_fixture(true).await;
        let a = upsert_node(&mut tx, &mut state, &new_node("A"))
            .await
            .expect("a");
        let b = upsert_node(&mut tx, &mut state, &new_node("B"))
            .await
            .expect("b");
        let edge = upsert_edge(
            &mut tx,
            &mut state,
            &EdgeSubmission {
                id: None,
                source_id: a.id,
                target_id: b.id,
                weight: Some(2.5),
            },
        )
        .await
        .expect("create");

        let updated = upsert_edge(
            &mut tx,
            &mut state,
            &EdgeSubmission {
                id: Some(edge.id),
                source_id: b.id,
                target_id: a.id,
                weight: Some(9.0),
            },
        )
        .await
        .expect("update");
        assert_eq!(updated.id, edge.id);
        assert_eq!((updated.source_id, updated.target_id), (b.id, a.id));
        assert_eq!(updated.weight, Some(9.0));
        assert_eq!(state.edges().count(), 1);
    }

    #[tokio::test]
    async fn edge_update_to_a_foreign_endpoint_keeps_the_stored_edge() {
        let (mut tx, mut state, mut other) = graph_fixture(true).await;
        let a = upsert_node(&mut tx, &mut state, &new_node("A"))
            .await
            .expect("a");
        let b = upsert_node(&mut tx, &mut state, &new_node("B"))
            .await
            .expect("b");
        let f = upsert_node(&mut tx, &mut other, &new_node("F"))
            .await
            .expect("f");
        let edge = upsert_edge(
            &mut tx,
            &mut state,
            &EdgeSubmission {
                id: None,
                source_id: a.id,
                target_id: b.id,
                weight: Some(1.0),
            },
        )
        .await
        .expect("create");

        let err = upsert_edge(
            &mut tx,
            &mut state,
            &EdgeSubmission {
                id: Some(edge.id),
                source_id: a.id,
                target_id: f.id,
                weight: Some(4.0),
            },
        )
        .await
        .expect_err("target belongs to the other graph");
        assert_eq!(err.kind, ErrorKind::CrossGraphReference);
        assert!(matches!(
            err.details,
            Some(ErrorDetails::ForeignNode { node_id, .. }) if node_id == f.id
        ));

        assert_eq!(state.edge(edge.id), Some(&edge));
        assert_eq!(tx.find_edge(edge.id).await.expect("find"), Some(edge));
    }

    #[tokio::test]
    async fn edge_ids_from_other_graphs_are_rejected() {
        let (mut tx, mut state, mut other) = graph_fixture(false).await;
        let a = upsert_node(&mut tx, &mut state, &new_node("A"))
            .await
            .expect("a");
        let f = upsert_node(&mut tx, &mut other, &new_node("F"))
            .await
            .expect("f");
        let foreign_edge = upsert_edge(
            &mut tx,
            &mut other,
            &EdgeSubmission {
                id: None,
                source_id: f.id,
                target_id: f.id,
                weight: None,
            },
        )
        .await
        .expect("foreign edge");

        let err = upsert_edge(
            &mut tx,
            &mut state,
            &EdgeSubmission {
                id: Some(foreign_edge.id),
                source_id: a.id,
                target_id: a.id,
                weight: None,
            },
        )
        .await
        .expect_err("foreign edge id");
        assert_eq!(err.kind, ErrorKind::CrossGraphReference);
        assert_eq!(
            tx.find_edge(foreign_edge.id)
                .await
                .expect("find")
                .expect("edge")
                .source_id,
            f.id
        );
    }
}
