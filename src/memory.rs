use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{EntityKind, LibError, Result};
use crate::models::{
    Edge, EdgeId, Graph, GraphId, GraphMetadata, NewEdge, NewUser, Node, NodeId, User, UserId,
};
use crate::store::{EntityStore, StoreTransaction};

#[derive(Debug, Clone, Copy, Default)]
struct Sequences {
    user: i64,
    graph: i64,
    node: i64,
    edge: i64,
}

#[derive(Debug, Clone, Default)]
struct Arena {
    users: BTreeMap<UserId, User>,
    graphs: BTreeMap<GraphId, Graph>,
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    sequences: Sequences,
}

/// In-process store. A transaction holds the arena lock for its whole
/// lifetime and works on a private copy that replaces the arena on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    arena: Arc<Mutex<Arena>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for MemoryStore {
    type Tx = MemoryTransaction;

    /// Every transaction, read-only ones included, holds the store lock and
    /// works on a full copy of the arena. Sized for development and tests.
    async fn begin(&self) -> Result<MemoryTransaction> {
        let guard = Arc::clone(&self.arena).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTransaction { guard, working })
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Arena>,
    working: Arena,
}

fn store_err(public: &'static str, source: anyhow::Error) -> LibError {
    LibError::store(public, source)
}

impl MemoryTransaction {
    fn graph_mut(&mut self, id: GraphId) -> Result<&mut Graph> {
        self.working
            .graphs
            .get_mut(&id)
            .ok_or_else(|| LibError::not_found(EntityKind::Graph, id.0))
    }

    fn ensure_node_exists(&self, id: NodeId) -> Result<()> {
        if self.working.nodes.contains_key(&id) {
            Ok(())
        } else {
            Err(store_err(
                "Edge endpoint does not exist",
                anyhow!("edge endpoint node {} is missing", id),
            ))
        }
    }
}

impl StoreTransaction for MemoryTransaction {
    async fn find_user(&mut self, id: UserId) -> Result<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User> {
        if self
            .working
            .users
            .values()
            .any(|existing| existing.name == user.name)
        {
            return Err(LibError::invalid(
                "User name is already taken",
                anyhow!("duplicate user name {:?}", user.name),
            ));
        }

        self.working.sequences.user += 1;
        let user = User {
            id: UserId(self.working.sequences.user),
            name: user.name,
            password_hash: user.password_hash,
            email: user.email,
            role: user.role,
        };
        self.working.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn seed_user(&mut self, user: User) -> Result<User> {
        if let Some(existing) = self.working.users.get(&user.id) {
            return Ok(existing.clone());
        }
        if self
            .working
            .users
            .values()
            .any(|existing| existing.name == user.name)
        {
            return Err(LibError::invalid(
                "User name is already taken",
                anyhow!("duplicate user name {:?}", user.name),
            ));
        }

        let sequence = &mut self.working.sequences.user;
        *sequence = (*sequence).max(user.id.0);
        self.working.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_graph(&mut self, id: GraphId) -> Result<Option<Graph>> {
        Ok(self.working.graphs.get(&id).cloned())
    }

    async fn find_graphs_by_owner(
        &mut self,
        owner: UserId,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Graph>> {
        Ok(self
            .working
            .graphs
            .values()
            .rev()
            .filter(|graph| graph.owner_id == owner)
            .skip(offset as usize)
            .take(limit.map_or(usize::MAX, |limit| limit as usize))
            .cloned()
            .collect())
    }

    async fn insert_graph(&mut self, owner: UserId, metadata: &GraphMetadata) -> Result<Graph> {
        if !self.working.users.contains_key(&owner) {
            return Err(store_err(
                "Graph owner does not exist",
                anyhow!("owner {} is missing", owner),
            ));
        }

        self.working.sequences.graph += 1;
        let now = Utc::now().naive_utc();
        let graph = Graph {
            id: GraphId(self.working.sequences.graph),
            owner_id: owner,
            name: metadata.name.clone(),
            directed: metadata.directed,
            weighted: metadata.weighted,
            node_ids: Default::default(),
            edge_ids: Default::default(),
            created_at: now,
            updated_at: now,
        };
        self.working.graphs.insert(graph.id, graph.clone());
        Ok(graph)
    }

    async fn update_graph_metadata(
        &mut self,
        id: GraphId,
        metadata: &GraphMetadata,
    ) -> Result<Graph> {
        let graph = self.graph_mut(id)?;
        graph.name = metadata.name.clone();
        graph.directed = metadata.directed;
        graph.weighted = metadata.weighted;
        graph.updated_at = Utc::now().naive_utc();
        Ok(graph.clone())
    }

    async fn delete_graph(&mut self, id: GraphId) -> Result<()> {
        let graph = self
            .working
            .graphs
            .remove(&id)
            .ok_or_else(|| LibError::not_found(EntityKind::Graph, id.0))?;
        self.working.edges.retain(|_, edge| edge.graph_id != graph.id);
        self.working.nodes.retain(|_, node| node.graph_id != graph.id);
        Ok(())
    }

    async fn find_node(&mut self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.working.nodes.get(&id).cloned())
    }

    async fn graph_nodes(&mut self, graph_id: GraphId) -> Result<Vec<Node>> {
        Ok(self
            .working
            .nodes
            .values()
            .filter(|node| node.graph_id == graph_id)
            .cloned()
            .collect())
    }

    async fn insert_node(&mut self, graph_id: GraphId, label: &str) -> Result<Node> {
        self.working.sequences.node += 1;
        let node = Node {
            id: NodeId(self.working.sequences.node),
            label: label.to_string(),
            graph_id,
        };
        self.graph_mut(graph_id)?.node_ids.insert(node.id);
        self.working.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    async fn update_node(&mut self, node: &Node) -> Result<()> {
        let stored = self
            .working
            .nodes
            .get_mut(&node.id)
            .ok_or_else(|| LibError::not_found(EntityKind::Node, node.id.0))?;
        stored.label = node.label.clone();
        Ok(())
    }

    async fn delete_node(&mut self, id: NodeId) -> Result<()> {
        if let Some(edge) = self.working.edges.values().find(|edge| edge.touches(id)) {
            return Err(store_err(
                "Node is still referenced by an edge",
                anyhow!("node {} is referenced by edge {}", id, edge.id),
            ));
        }

        let node = self
            .working
            .nodes
            .remove(&id)
            .ok_or_else(|| LibError::not_found(EntityKind::Node, id.0))?;
        if let Some(graph) = self.working.graphs.get_mut(&node.graph_id) {
            graph.node_ids.remove(&id);
        }
        Ok(())
    }

    async fn find_edge(&mut self, id: EdgeId) -> Result<Option<Edge>> {
        Ok(self.working.edges.get(&id).cloned())
    }

    async fn graph_edges(&mut self, graph_id: GraphId) -> Result<Vec<Edge>> {
        Ok(self
            .working
            .edges
            .values()
            .filter(|edge| edge.graph_id == graph_id)
            .cloned()
            .collect())
    }

    async fn insert_edge(&mut self, edge: NewEdge) -> Result<Edge> {
        self.ensure_node_exists(edge.source_id)?;
        self.ensure_node_exists(edge.target_id)?;

        self.working.sequences.edge += 1;
        let edge = Edge {
            id: EdgeId(self.working.sequences.edge),
            source_id: edge.source_id,
            target_id: edge.target_id,
            weight: edge.weight,
            graph_id: edge.graph_id,
        };
        self.graph_mut(edge.graph_id)?.edge_ids.insert(edge.id);
        self.working.edges.insert(edge.id, edge.clone());
        Ok(edge)
    }

    async fn update_edge(&mut self, edge: &Edge) -> Result<()> {
        self.ensure_node_exists(edge.source_id)?;
        self.ensure_node_exists(edge.target_id)?;

        let stored = self
            .working
            .edges
            .get_mut(&edge.id)
            .ok_or_else(|| LibError::not_found(EntityKind::Edge, edge.id.0))?;
        stored.source_id = edge.source_id;
        stored.target_id = edge.target_id;
        stored.weight = edge.weight;
        Ok(())
    }

    async fn delete_edge(&mut self, id: EdgeId) -> Result<()> {
        let edge = self
            .working
            .edges
            .remove(&id)
            .ok_or_else(|| LibError::not_found(EntityKind::Edge, id.0))?;
        if let Some(graph) = self.working.graphs.get_mut(&edge.graph_id) {
            graph.edge_ids.remove(&id);
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let MemoryTransaction { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}
