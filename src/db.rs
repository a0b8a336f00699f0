use std::sync::Arc;

use anyhow::anyhow;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::error::{EntityKind, LibError, Result};
use crate::models::{
    Edge, EdgeId, Graph, GraphId, GraphMetadata, NewEdge, NewUser, Node, NodeId, Role, User,
    UserId,
};
use crate::store::{EntityStore, StoreTransaction};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_graph_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|err| db_err("Failed to connect to database", err))
}

const GRAPH_COLUMNS: &str = r#"
    g.id,
    g.owner_id,
    g.name,
    g.directed,
    g.weighted,
    g.created_at,
    g.updated_at,
    ARRAY(SELECT n.id FROM graph.nodes n WHERE n.graph_id = g.id ORDER BY n.id) AS node_ids,
    ARRAY(SELECT e.id FROM graph.edges e WHERE e.graph_id = g.id ORDER BY e.id) AS edge_ids
"#;

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    password_hash: String,
    email: Option<String>,
    role: String,
}

#[derive(Debug, Clone, FromRow)]
struct GraphRow {
    id: i64,
    owner_id: i64,
    name: String,
    directed: bool,
    weighted: bool,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
    node_ids: Vec<i64>,
    edge_ids: Vec<i64>,
}

#[derive(Debug, Clone, FromRow)]
struct NodeRow {
    id: i64,
    graph_id: i64,
    label: String,
}

#[derive(Debug, Clone, FromRow)]
struct EdgeRow {
    id: i64,
    graph_id: i64,
    source_id: i64,
    target_id: i64,
    weight: Option<f64>,
}

impl TryFrom<UserRow> for User {
    type Error = LibError;

    fn try_from(value: UserRow) -> Result<Self> {
        let role = Role::from_db_value(&value.role).ok_or_else(|| {
            LibError::store(
                "Stored user has an unknown role",
                anyhow!("user {} has role {:?}", value.id, value.role),
            )
        })?;
        Ok(Self {
            id: UserId(value.id),
            name: value.name,
            password_hash: value.password_hash,
            email: value.email,
            role,
        })
    }
}

impl From<GraphRow> for Graph {
    fn from(value: GraphRow) -> Self {
        Self {
            id: GraphId(value.id),
            owner_id: UserId(value.owner_id),
            name: value.name,
            directed: value.directed,
            weighted: value.weighted,
            node_ids: value.node_ids.into_iter().map(NodeId).collect(),
            edge_ids: value.edge_ids.into_iter().map(EdgeId).collect(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<NodeRow> for Node {
    fn from(value: NodeRow) -> Self {
        Self {
            id: NodeId(value.id),
            label: value.label,
            graph_id: GraphId(value.graph_id),
        }
    }
}

impl From<EdgeRow> for Edge {
    fn from(value: EdgeRow) -> Self {
        Self {
            id: EdgeId(value.id),
            source_id: NodeId(value.source_id),
            target_id: NodeId(value.target_id),
            weight: value.weight,
            graph_id: GraphId(value.graph_id),
        }
    }
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::store(public, anyhow!(err))
}

fn expect_row(rows_affected: u64, entity: EntityKind, id: i64) -> Result<()> {
    if rows_affected == 0 {
        Err(LibError::not_found(entity, id))
    } else {
        Ok(())
    }
}

/// PostgreSQL-backed store. Each transaction is a database transaction that
/// rolls back when dropped uncommitted.
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

impl EntityStore for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;
        Ok(PgTransaction { tx })
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl StoreTransaction for PgTransaction {
    async fn find_user(&mut self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, password_hash, email, role
            FROM graph.users
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query user", err))?;

        row.map(User::try_from).transpose()
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO graph.users (name, password_hash, email, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, password_hash, email, role
            "#,
        )
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(user.role.as_db_value())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => LibError::invalid(
                "User name is already taken",
                anyhow!("duplicate user name {:?}", user.name),
            ),
            err => db_err("Failed to create user", err),
        })?;

        User::try_from(row)
    }

    async fn seed_user(&mut self, user: User) -> Result<User> {
        sqlx::query(
            r#"
            INSERT INTO graph.users (id, name, password_hash, email, role)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(user.id.0)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(user.role.as_db_value())
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to seed user", err))?;

        sqlx::query(
            r#"
            SELECT setval(
                pg_get_serial_sequence('graph.users', 'id'),
                GREATEST((SELECT MAX(id) FROM graph.users), 1)
            )
            "#,
        )
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to advance user id sequence", err))?;

        self.find_user(user.id)
            .await?
            .ok_or_else(|| LibError::not_found(EntityKind::User, user.id.0))
    }

    async fn find_graph(&mut self, id: GraphId) -> Result<Option<Graph>> {
        let query = format!("SELECT {GRAPH_COLUMNS} FROM graph.graphs g WHERE g.id = $1");
        let row = sqlx::query_as::<_, GraphRow>(&query)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|err| db_err("Failed to query graph", err))?;

        Ok(row.map(Graph::from))
    }

    async fn find_graphs_by_owner(
        &mut self,
        owner: UserId,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Graph>> {
        let query = format!(
            "SELECT {GRAPH_COLUMNS} FROM graph.graphs g WHERE g.owner_id = $1 \
             ORDER BY g.id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, GraphRow>(&query)
            .bind(owner.0)
            .bind(limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX)))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| db_err("Failed to list graphs", err))?;

        Ok(rows.into_iter().map(Graph::from).collect())
    }

    async fn insert_graph(&mut self, owner: UserId, metadata: &GraphMetadata) -> Result<Graph> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO graph.graphs (owner_id, name, directed, weighted)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(owner.0)
        .bind(&metadata.name)
        .bind(metadata.directed)
        .bind(metadata.weighted)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to create graph", err))?;

        self.find_graph(GraphId(id))
            .await?
            .ok_or_else(|| LibError::not_found(EntityKind::Graph, id))
    }

    async fn update_graph_metadata(
        &mut self,
        id: GraphId,
        metadata: &GraphMetadata,
    ) -> Result<Graph> {
        let result = sqlx::query(
            r#"
            UPDATE graph.graphs
            SET name = $1,
                directed = $2,
                weighted = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $4
            "#,
        )
        .bind(&metadata.name)
        .bind(metadata.directed)
        .bind(metadata.weighted)
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to update graph", err))?;
        expect_row(result.rows_affected(), EntityKind::Graph, id.0)?;

        self.find_graph(id)
            .await?
            .ok_or_else(|| LibError::not_found(EntityKind::Graph, id.0))
    }

    async fn delete_graph(&mut self, id: GraphId) -> Result<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM graph.graphs
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to delete graph", err))?;

        expect_row(result.rows_affected(), EntityKind::Graph, id.0)
    }

    async fn find_node(&mut self, id: NodeId) -> Result<Option<Node>> {
        let row = sqlx::query_as::<_, NodeRow>(
            r#"
            SELECT id, graph_id, label
            FROM graph.nodes
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query node", err))?;

        Ok(row.map(Node::from))
    }

    async fn graph_nodes(&mut self, graph_id: GraphId) -> Result<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            r#"
            SELECT id, graph_id, label
            FROM graph.nodes
            WHERE graph_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(graph_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query graph nodes", err))?;

        Ok(rows.into_iter().map(Node::from).collect())
    }

    async fn insert_node(&mut self, graph_id: GraphId, label: &str) -> Result<Node> {
        let row = sqlx::query_as::<_, NodeRow>(
            r#"
            INSERT INTO graph.nodes (graph_id, label)
            VALUES ($1, $2)
            RETURNING id, graph_id, label
            "#,
        )
        .bind(graph_id.0)
        .bind(label)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to create node", err))?;

        Ok(Node::from(row))
    }

    async fn update_node(&mut self, node: &Node) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE graph.nodes
            SET label = $1
            WHERE id = $2
            "#,
        )
        .bind(&node.label)
        .bind(node.id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to update node", err))?;

        expect_row(result.rows_affected(), EntityKind::Node, node.id.0)
    }

    async fn delete_node(&mut self, id: NodeId) -> Result<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM graph.nodes
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => LibError::store(
                "Node is still referenced by an edge",
                anyhow!("node {} is referenced by an edge", id),
            ),
            err => db_err("Failed to delete node", err),
        })?;

        expect_row(result.rows_affected(), EntityKind::Node, id.0)
    }

    async fn find_edge(&mut self, id: EdgeId) -> Result<Option<Edge>> {
        let row = sqlx::query_as::<_, EdgeRow>(
            r#"
            SELECT id, graph_id, source_id, target_id, weight
            FROM graph.edges
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query edge", err))?;

        Ok(row.map(Edge::from))
    }

    async fn graph_edges(&mut self, graph_id: GraphId) -> Result<Vec<Edge>> {
        let rows = sqlx::query_as::<_, EdgeRow>(
            r#"
            SELECT id, graph_id, source_id, target_id, weight
            FROM graph.edges
            WHERE graph_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(graph_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query graph edges", err))?;

        Ok(rows.into_iter().map(Edge::from).collect())
    }

    async fn insert_edge(&mut self, edge: NewEdge) -> Result<Edge> {
        let row = sqlx::query_as::<_, EdgeRow>(
            r#"
            INSERT INTO graph.edges (graph_id, source_id, target_id, weight)
            VALUES ($1, $2, $3, $4)
            RETURNING id, graph_id, source_id, target_id, weight
            "#,
        )
        .bind(edge.graph_id.0)
        .bind(edge.source_id.0)
        .bind(edge.target_id.0)
        .bind(edge.weight)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to create edge", err))?;

        Ok(Edge::from(row))
    }

    async fn update_edge(&mut self, edge: &Edge) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE graph.edges
            SET source_id = $1,
                target_id = $2,
                weight = $3
            WHERE id = $4
            "#,
        )
        .bind(edge.source_id.0)
        .bind(edge.target_id.0)
        .bind(edge.weight)
        .bind(edge.id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to update edge", err))?;

        expect_row(result.rows_affected(), EntityKind::Edge, edge.id.0)
    }

    async fn delete_edge(&mut self, id: EdgeId) -> Result<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM graph.edges
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to delete edge", err))?;

        expect_row(result.rows_affected(), EntityKind::Edge, id.0)
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|err| db_err("Failed to commit transaction", err))
    }
}
