#[cfg(feature = "sqlx")]
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use graph_reconcile::api::{GraphApp, HasStore};
use graph_reconcile::auth::{Caller, ResolvesCaller, TokenTable};
use graph_reconcile::config::ServerConfig;
use graph_reconcile::error::Result;
use graph_reconcile::memory::MemoryStore;
use graph_reconcile::models::User;
use graph_reconcile::store::{EntityStore, StoreTransaction};

#[derive(Clone)]
struct DemoApp<S> {
    store: S,
    tokens: TokenTable,
}

impl<S: EntityStore> HasStore for DemoApp<S> {
    type Store = S;

    fn store(&self) -> S {
        self.store.clone()
    }
}

impl<S> ResolvesCaller for DemoApp<S> {
    fn resolve_caller(&self, token: &str) -> Result<Caller> {
        self.tokens.resolve_caller(token)
    }
}

impl<S: EntityStore> GraphApp for DemoApp<S> {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("graph_reconcile=info")),
        )
        .init();

    let config = ServerConfig::from_env().context("failed to read server configuration")?;
    run(&config).await
}

#[cfg(feature = "sqlx")]
async fn run(config: &ServerConfig) -> anyhow::Result<()> {
    let Some(database_url) = config.database_url.as_deref() else {
        return serve(config, MemoryStore::new()).await;
    };

    let pool = graph_reconcile::db::connect(database_url, config.max_connections)
        .await
        .context("failed to connect to postgres")?;
    graph_reconcile::db::create_graph_tables(&pool)
        .await
        .context("failed to run graph migrations")?;
    serve(config, graph_reconcile::db::PgStore::new(Arc::new(pool))).await
}

#[cfg(not(feature = "sqlx"))]
async fn run(config: &ServerConfig) -> anyhow::Result<()> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but the sqlx feature is disabled; using memory store");
    }
    serve(config, MemoryStore::new()).await
}

async fn serve<S: EntityStore>(config: &ServerConfig, store: S) -> anyhow::Result<()> {
    seed_dev_users(config, &store)
        .await
        .context("failed to seed dev users")?;

    let app_state = DemoApp {
        store,
        tokens: config.token_table(),
    };

    let api_v1 = Router::new()
        .route("/healthz", get(health_handler))
        .merge(graph_reconcile::api::routes::<DemoApp<S>>());
    let app = Router::new().nest("/api/v1", api_v1).with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.bind))?;

    tracing::info!(bind = %config.bind, "graph api server listening; base path /api/v1");
    for user in &config.dev_users {
        tracing::info!(user = %user.name, token = %user.token(), "dev user available");
    }

    axum::serve(listener, app)
        .await
        .context("graph api server failed")
}

async fn seed_dev_users<S: EntityStore>(config: &ServerConfig, store: &S) -> Result<()> {
    let mut tx = store.begin().await?;
    for user in &config.dev_users {
        tx.seed_user(User {
            id: user.id,
            name: user.name.clone(),
            password_hash: String::new(),
            email: None,
            role: user.role,
        })
        .await?;
    }
    tx.commit().await
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true
    }))
}
