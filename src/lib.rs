#[cfg(feature = "api")]
pub mod api;
pub mod auth;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod diff;
pub mod error;
pub mod invariants;
pub mod memory;
pub mod models;
pub mod operations;
pub mod permissions;
pub mod reconcile;
pub mod store;

pub mod prelude {
    #[cfg(feature = "api")]
    pub use crate::api::{AppError, GraphApp, HasStore};
    #[cfg(feature = "api")]
    pub use crate::auth::AuthenticatedCaller;
    pub use crate::auth::{Caller, ResolvesCaller, TokenTable};
    pub use crate::config::{DevUser, ServerConfig};
    #[cfg(feature = "sqlx")]
    pub use crate::db::{PgStore, create_graph_tables};
    pub use crate::diff::{EdgeSyncPlan, plan_edge_sync};
    pub use crate::error::{EntityKind, ErrorDetails, ErrorKind, LibError, Result};
    pub use crate::memory::MemoryStore;
    pub use crate::models::{
        Edge, EdgeId, EdgeSubmission, Graph, GraphId, GraphMetadata, GraphSubmission, GraphView,
        ListGraphsQuery, NewUser, Node, NodeId, NodeSubmission, Paged, Role, User, UserId,
    };
    pub use crate::operations::{GraphOperation, GraphOperationResult, GraphOperations};
    pub use crate::store::{EntityStore, StoreTransaction};
}
