//! Persistence seam for graph records.
//!
//! Every service call opens one [`StoreTransaction`], performs all reads and
//! writes through it and commits at the end. Dropping a transaction without
//! committing discards its writes.

use std::future::Future;

use crate::error::Result;
use crate::models::{
    Edge, EdgeId, Graph, GraphId, GraphMetadata, NewEdge, NewUser, Node, NodeId, User, UserId,
};

pub trait EntityStore: Clone + Send + Sync + 'static {
    type Tx: StoreTransaction;

    fn begin(&self) -> impl Future<Output = Result<Self::Tx>> + Send;
}

pub trait StoreTransaction: Send {
    fn find_user(&mut self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;

    fn insert_user(&mut self, user: NewUser) -> impl Future<Output = Result<User>> + Send;

    /// Inserts a user under a fixed id unless that id is already taken, and
    /// returns the stored record. Later [`insert_user`](Self::insert_user)
    /// calls allocate ids above it.
    fn seed_user(&mut self, user: User) -> impl Future<Output = Result<User>> + Send;

    fn find_graph(&mut self, id: GraphId) -> impl Future<Output = Result<Option<Graph>>> + Send;

    /// Graphs owned by `owner`, newest id first. `None` lists all of them.
    fn find_graphs_by_owner(
        &mut self,
        owner: UserId,
        offset: u64,
        limit: Option<u64>,
    ) -> impl Future<Output = Result<Vec<Graph>>> + Send;

    /// Creates a graph with empty node and edge sets.
    fn insert_graph(
        &mut self,
        owner: UserId,
        metadata: &GraphMetadata,
    ) -> impl Future<Output = Result<Graph>> + Send;

    /// Overwrites `name`, `directed` and `weighted`; membership is untouched.
    fn update_graph_metadata(
        &mut self,
        id: GraphId,
        metadata: &GraphMetadata,
    ) -> impl Future<Output = Result<Graph>> + Send;

    /// Deletes the graph together with all of its nodes and edges.
    fn delete_graph(&mut self, id: GraphId) -> impl Future<Output = Result<()>> + Send;

    fn find_node(&mut self, id: NodeId) -> impl Future<Output = Result<Option<Node>>> + Send;

    fn graph_nodes(&mut self, graph_id: GraphId)
    -> impl Future<Output = Result<Vec<Node>>> + Send;

    /// Persists a node and registers it in the graph's node set.
    fn insert_node(
        &mut self,
        graph_id: GraphId,
        label: &str,
    ) -> impl Future<Output = Result<Node>> + Send;

    fn update_node(&mut self, node: &Node) -> impl Future<Output = Result<()>> + Send;

    /// Fails if any edge still references the node.
    fn delete_node(&mut self, id: NodeId) -> impl Future<Output = Result<()>> + Send;

    fn find_edge(&mut self, id: EdgeId) -> impl Future<Output = Result<Option<Edge>>> + Send;

    fn graph_edges(&mut self, graph_id: GraphId)
    -> impl Future<Output = Result<Vec<Edge>>> + Send;

    /// Persists an edge and registers it in the graph's edge set.
    fn insert_edge(&mut self, edge: NewEdge) -> impl Future<Output = Result<Edge>> + Send;

    fn update_edge(&mut self, edge: &Edge) -> impl Future<Output = Result<()>> + Send;

    fn delete_edge(&mut self, id: EdgeId) -> impl Future<Output = Result<()>> + Send;

    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}
