//! WebSocket server binary: loads configuration, brings up the shared
//! table registry and idempotency cache, and serves client connections.
//!
//! The teacher ships an on-chain program with no server binary of its own;
//! this is the off-chain entrypoint the session layer needs to actually
//! accept a socket, grounded on the same `tracing`/`anyhow` startup idiom
//! the teacher's off-chain indexer crate uses.

mod admin;
mod config;
mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use holdem_session::registry::TableRegistry;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::ws::{AppState, DevTokenVerifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = Config::from_env()?;
    let addr = config.socket_addr()?;

    let registry = Arc::new(TableRegistry::new());
    let verifier = Arc::new(DevTokenVerifier);
    let state = AppState::new(&config, registry, verifier);

    let app = Router::new()
        .route("/ws", get(ws::upgrade))
        .route("/admin/tables", post(admin::create_table))
        .with_state(state);

    info!(%addr, "holdem-server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
