mod auth;
mod config;
mod mutations;
mod pagination;
mod routes;
mod state;
mod store;
mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use palaver_bus::NotificationBus;

use crate::auth::{hash_password, TokenSigner};
use crate::config::{Cli, ServerConfig};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{MemoryStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::try_from(Cli::parse())?;

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    if config.seed {
        seed(store.as_ref()).await?;
    }

    let state = AppState::new(
        store,
        Arc::new(TokenSigner::new(config.token_secret.clone().into_bytes())),
        Arc::new(NotificationBus::new()),
    );

    let app = build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "palaver-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// Deterministic development fixtures; roughly what a fresh install of the
/// original app bootstrapped, minus the randomness.
async fn seed(store: &dyn Store) -> Result<()> {
    let ana = store
        .create_user("ana", "ana@example.com", &hash_password("password"))
        .await?;
    let bob = store
        .create_user("bob", "bob@example.com", &hash_password("password"))
        .await?;
    let carol = store
        .create_user("carol", "carol@example.com", &hash_password("password"))
        .await?;

    let group = store
        .create_group("the commons", ana.id, &[bob.id, carol.id])
        .await?;
    for (author, text) in [
        (ana.id, "welcome to the commons"),
        (bob.id, "glad to be here"),
        (carol.id, "hello everyone"),
    ] {
        store.create_message(group.id, author, text).await?;
    }

    info!(group = %group.id, "seeded development fixtures");
    Ok(())
}
