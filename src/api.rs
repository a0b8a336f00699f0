use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde_json::json;

use crate::auth::{AuthenticatedCaller, ResolvesCaller};
use crate::error::{ErrorKind, LibError};
use crate::models::{
    EdgeId, EdgeSubmission, GraphId, GraphMetadata, GraphSubmission, ListGraphsQuery,
    NodeSubmission,
};
use crate::operations::GraphOperations;
use crate::store::EntityStore;

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::AccessDenied => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::DuplicateLabel => StatusCode::CONFLICT,
            ErrorKind::CrossGraphReference => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(kind = ?self.0.kind, code = self.0.code, error = %self.0.source, "graph api request failed");
        let body = json!({
            "error": {
                "code": self.0.code,
                "message": self.0.public,
                "details": self.0.details,
            }
        });
        (status, Json(body)).into_response()
    }
}

pub trait HasStore {
    type Store: EntityStore;

    fn store(&self) -> Self::Store;
}

pub trait GraphApp: HasStore + ResolvesCaller {
    fn operations(&self) -> GraphOperations<Self::Store> {
        GraphOperations::new(self.store())
    }
}

async fn list_graphs_handler<S>(
    State(app): State<S>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Query(query): Query<ListGraphsQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let page = app.operations().list_graphs(caller.id, query).await?;
    Ok(Json(page))
}

async fn save_graph_handler<S>(
    State(app): State<S>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(payload): Json<GraphSubmission>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let status = match payload.id {
        Some(id) if id.is_assigned() => StatusCode::OK,
        _ => StatusCode::CREATED,
    };
    let graph = app
        .operations()
        .create_or_update_graph(caller.id, payload)
        .await?;
    Ok((status, Json(graph)))
}

async fn get_graph_handler<S>(
    State(app): State<S>,
    AuthenticatedCaller(_caller): AuthenticatedCaller,
    Path(graph_id): Path<GraphId>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let graph = app.operations().get_graph(graph_id).await?;
    Ok(Json(graph))
}

async fn update_graph_handler<S>(
    State(app): State<S>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(graph_id): Path<GraphId>,
    Json(payload): Json<GraphMetadata>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let graph = app
        .operations()
        .update_graph(caller.id, graph_id, payload)
        .await?;
    Ok(Json(graph))
}

async fn delete_graph_handler<S>(
    State(app): State<S>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(graph_id): Path<GraphId>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    app.operations().delete_graph(caller.id, graph_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sync_nodes_handler<S>(
    State(app): State<S>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(graph_id): Path<GraphId>,
    Json(payload): Json<Vec<NodeSubmission>>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let nodes = app
        .operations()
        .sync_nodes(caller.id, graph_id, payload)
        .await?;
    Ok(Json(nodes))
}

async fn sync_edges_handler<S>(
    State(app): State<S>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(graph_id): Path<GraphId>,
    Json(payload): Json<Vec<EdgeSubmission>>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let edges = app
        .operations()
        .sync_edges(caller.id, graph_id, payload)
        .await?;
    Ok(Json(edges))
}

async fn put_edge_handler<S>(
    State(app): State<S>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(graph_id): Path<GraphId>,
    Json(payload): Json<EdgeSubmission>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    let edge = app
        .operations()
        .add_edge(caller.id, graph_id, payload)
        .await?;
    Ok(Json(edge))
}

async fn delete_edge_handler<S>(
    State(app): State<S>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path((graph_id, edge_id)): Path<(GraphId, EdgeId)>,
) -> Result<impl IntoResponse, AppError>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    app.operations()
        .delete_edge(caller.id, graph_id, edge_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes<S>() -> Router<S>
where
    S: GraphApp + Clone + Send + Sync + 'static,
{
    tracing::info!("Registering route /graphs [GET,POST]");
    tracing::info!("Registering route /graphs/{{graph_id}} [GET,PUT,DELETE]");
    tracing::info!("Registering route /graphs/{{graph_id}}/nodes [POST]");
    tracing::info!("Registering route /graphs/{{graph_id}}/edges [POST]");
    tracing::info!("Registering route /graphs/{{graph_id}}/edge [PUT]");
    tracing::info!("Registering route /graphs/{{graph_id}}/edges/{{edge_id}} [DELETE]");

    Router::new()
        .route(
            "/graphs",
            get(list_graphs_handler::<S>).post(save_graph_handler::<S>),
        )
        .route(
            "/graphs/{graph_id}",
            get(get_graph_handler::<S>)
                .put(update_graph_handler::<S>)
                .delete(delete_graph_handler::<S>),
        )
        .route("/graphs/{graph_id}/nodes", post(sync_nodes_handler::<S>))
        .route("/graphs/{graph_id}/edges", post(sync_edges_handler::<S>))
        .route("/graphs/{graph_id}/edge", put(put_edge_handler::<S>))
        .route(
            "/graphs/{graph_id}/edges/{edge_id}",
            delete(delete_edge_handler::<S>),
        )
}
