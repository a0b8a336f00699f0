use serde::{Deserialize, Serialize};

use crate::diff;
use crate::error::{EntityKind, LibError, Result};
use crate::invariants;
use crate::models::{
    Edge, EdgeId, EdgeSubmission, Graph, GraphId, GraphMetadata, GraphSubmission, GraphView,
    ListGraphsQuery, Node, NodeSubmission, Paged, UserId,
};
use crate::permissions;
use crate::reconcile::{self, GraphState};
use crate::store::{EntityStore, StoreTransaction};

/// Dispatchable graph actions for RPC and tool callers.
///
/// Callers must provide a trusted `actor` sourced from validated auth/session state,
/// not from request arguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum GraphOperation {
    List {
        #[serde(default)]
        query: ListGraphsQuery,
    },
    Get {
        graph_id: GraphId,
    },
    Save {
        graph: GraphSubmission,
    },
    Update {
        graph_id: GraphId,
        metadata: GraphMetadata,
    },
    SyncNodes {
        graph_id: GraphId,
        nodes: Vec<NodeSubmission>,
    },
    SyncEdges {
        graph_id: GraphId,
        edges: Vec<EdgeSubmission>,
    },
    AddEdge {
        graph_id: GraphId,
        edge: EdgeSubmission,
    },
    DeleteEdge {
        graph_id: GraphId,
        edge_id: EdgeId,
    },
    Delete {
        graph_id: GraphId,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum GraphOperationResult {
    Graph {
        graph: Graph,
    },
    GraphDetail {
        graph: GraphView,
    },
    GraphsPage {
        page: u32,
        limit: Option<u32>,
        items: Vec<Graph>,
    },
    Nodes {
        nodes: Vec<Node>,
    },
    Edges {
        edges: Vec<Edge>,
    },
    Edge {
        edge: Edge,
    },
    Deleted,
}

/// Graph reconciliation service. Each public method runs in a single store
/// transaction that commits only when every step succeeded.
#[derive(Clone)]
pub struct GraphOperations<S> {
    store: S,
}

impl<S: EntityStore> GraphOperations<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn execute(
        &self,
        actor: UserId,
        operation: GraphOperation,
    ) -> Result<GraphOperationResult> {
        match operation {
            GraphOperation::List { query } => {
                let page = self.list_graphs(actor, query).await?;
                Ok(GraphOperationResult::GraphsPage {
                    page: page.page,
                    limit: page.limit,
                    items: page.items,
                })
            }
            GraphOperation::Get { graph_id } => {
                let graph = self.get_graph(graph_id).await?;
                Ok(GraphOperationResult::GraphDetail { graph })
            }
            GraphOperation::Save { graph } => {
                let graph = self.create_or_update_graph(actor, graph).await?;
                Ok(GraphOperationResult::Graph { graph })
            }
            GraphOperation::Update { graph_id, metadata } => {
                let graph = self.update_graph(actor, graph_id, metadata).await?;
                Ok(GraphOperationResult::Graph { graph })
            }
            GraphOperation::SyncNodes { graph_id, nodes } => {
                let nodes = self.sync_nodes(actor, graph_id, nodes).await?;
                Ok(GraphOperationResult::Nodes { nodes })
            }
            GraphOperation::SyncEdges { graph_id, edges } => {
                let edges = self.sync_edges(actor, graph_id, edges).await?;
                Ok(GraphOperationResult::Edges { edges })
            }
            GraphOperation::AddEdge { graph_id, edge } => {
                let edge = self.add_edge(actor, graph_id, edge).await?;
                Ok(GraphOperationResult::Edge { edge })
            }
            GraphOperation::DeleteEdge { graph_id, edge_id } => {
                self.delete_edge(actor, graph_id, edge_id).await?;
                Ok(GraphOperationResult::Deleted)
            }
            GraphOperation::Delete { graph_id } => {
                self.delete_graph(actor, graph_id).await?;
                Ok(GraphOperationResult::Deleted)
            }
        }
    }

    pub async fn list_graphs(&self, actor: UserId, query: ListGraphsQuery) -> Result<Paged<Graph>> {
        let (page, limit) = query.pagination();
        let offset = limit.map_or(0, |limit| u64::from(page - 1) * u64::from(limit));

        let mut tx = self.store.begin().await?;
        let items = tx
            .find_graphs_by_owner(actor, offset, limit.map(u64::from))
            .await?;
        Ok(Paged { page, limit, items })
    }

    pub async fn get_graph(&self, graph_id: GraphId) -> Result<GraphView> {
        let mut tx = self.store.begin().await?;
        let state = GraphState::load(&mut tx, graph_id).await?;
        Ok(state.into_view())
    }

    /// Creates a graph owned by `actor`, or updates the metadata of the graph
    /// named by the submission's id.
    pub async fn create_or_update_graph(
        &self,
        actor: UserId,
        submission: GraphSubmission,
    ) -> Result<Graph> {
        match submission.split() {
            (Some(graph_id), metadata) => self.update_graph(actor, graph_id, metadata).await,
            (None, metadata) => self.create_graph(actor, metadata).await,
        }
    }

    pub async fn create_graph(&self, actor: UserId, metadata: GraphMetadata) -> Result<Graph> {
        let metadata = metadata.normalize()?;

        let mut tx = self.store.begin().await?;
        if tx.find_user(actor).await?.is_none() {
            return Err(LibError::not_found(EntityKind::User, actor.0));
        }
        let graph = tx.insert_graph(actor, &metadata).await?;
        tx.commit().await?;

        tracing::info!(graph_id = %graph.id, owner_id = %actor, "created graph");
        Ok(graph)
    }

    /// Overwrites name and flags only; nodes and edges are left alone. The
    /// weighting can only change while the graph has no edges.
    pub async fn update_graph(
        &self,
        actor: UserId,
        graph_id: GraphId,
        metadata: GraphMetadata,
    ) -> Result<Graph> {
        let metadata = metadata.normalize()?;

        let mut tx = self.store.begin().await?;
        let graph = reconcile::find_graph(&mut tx, graph_id).await?;
        permissions::authorize(&graph, actor)?;
        if graph.weighted != metadata.weighted && !graph.edge_ids.is_empty() {
            return Err(LibError::invalid(
                "Cannot change the weighting of a graph that has edges",
                anyhow::anyhow!(
                    "graph {} has {} edges; weighted stays {}",
                    graph_id,
                    graph.edge_ids.len(),
                    graph.weighted
                ),
            ));
        }
        let graph = tx.update_graph_metadata(graph_id, &metadata).await?;
        tx.commit().await?;

        tracing::info!(graph_id = %graph_id, "updated graph metadata");
        Ok(graph)
    }

    /// Creates or renames each submitted node in order. The first failure
    /// aborts the whole batch.
    pub async fn sync_nodes(
        &self,
        actor: UserId,
        graph_id: GraphId,
        nodes: Vec<NodeSubmission>,
    ) -> Result<Vec<Node>> {
        let mut tx = self.store.begin().await?;
        let mut state = authorized_state(&mut tx, actor, graph_id).await?;

        let mut synced = Vec::with_capacity(nodes.len());
        for node in &nodes {
            synced.push(reconcile::upsert_node(&mut tx, &mut state, node).await?);
        }

        invariants::ensure_graph_invariants(&state)?;
        tx.commit().await?;

        tracing::info!(graph_id = %graph_id, nodes = synced.len(), "synced graph nodes");
        Ok(synced)
    }

    /// Makes the graph's edges match `edges`: removes nodes and edges the
    /// batch no longer mentions, then creates or updates each submitted edge
    /// in order. The first failure aborts the whole batch.
    pub async fn sync_edges(
        &self,
        actor: UserId,
        graph_id: GraphId,
        edges: Vec<EdgeSubmission>,
    ) -> Result<Vec<Edge>> {
        let mut tx = self.store.begin().await?;
        let mut state = authorized_state(&mut tx, actor, graph_id).await?;

        let plan = diff::plan_edge_sync(&state, &edges);
        tracing::debug!(graph_id = %graph_id, plan = ?plan, "planned edge sync");
        diff::apply_edge_sync_plan(&mut tx, &mut state, &plan).await?;

        let mut synced = Vec::with_capacity(edges.len());
        for edge in &edges {
            synced.push(reconcile::upsert_edge(&mut tx, &mut state, edge).await?);
        }

        invariants::ensure_graph_invariants(&state)?;
        tx.commit().await?;

        tracing::info!(
            graph_id = %graph_id,
            edges = synced.len(),
            removed_nodes = plan.cascades.len(),
            removed_edges = plan.removed_edge_ids().count(),
            "synced graph edges"
        );
        Ok(synced)
    }

    /// Creates or updates one edge without touching the rest of the graph.
    pub async fn add_edge(
        &self,
        actor: UserId,
        graph_id: GraphId,
        edge: EdgeSubmission,
    ) -> Result<Edge> {
        let mut tx = self.store.begin().await?;
        let mut state = authorized_state(&mut tx, actor, graph_id).await?;
        let edge = reconcile::upsert_edge(&mut tx, &mut state, &edge).await?;
        invariants::ensure_graph_invariants(&state)?;
        tx.commit().await?;
        Ok(edge)
    }

    pub async fn delete_edge(&self, actor: UserId, graph_id: GraphId, edge_id: EdgeId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let mut state = authorized_state(&mut tx, actor, graph_id).await?;
        let edge = state
            .edge(edge_id)
            .cloned()
            .ok_or_else(|| LibError::not_found(EntityKind::Edge, edge_id.0))?;
        tx.delete_edge(edge.id).await?;
        state.forget_edge(edge.id);
        tx.commit().await?;

        tracing::info!(graph_id = %graph_id, edge_id = %edge_id, "deleted edge");
        Ok(())
    }

    pub async fn delete_graph(&self, actor: UserId, graph_id: GraphId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let graph = reconcile::find_graph(&mut tx, graph_id).await?;
        permissions::authorize(&graph, actor)?;
        tx.delete_graph(graph_id).await?;
        tx.commit().await?;

        tracing::info!(graph_id = %graph_id, "deleted graph");
        Ok(())
    }
}

/// Loads the graph record, checks ownership, then loads its members.
async fn authorized_state<T: StoreTransaction>(
    tx: &mut T,
    actor: UserId,
    graph_id: GraphId,
) -> Result<GraphState> {
    let graph = reconcile::find_graph(tx, graph_id).await?;
    permissions::authorize(&graph, actor)?;
    GraphState::hydrate(tx, graph).await
}
