//! HTTP gate in front of the job runner
//!
//! `POST /?n=<1..25>` runs one batch, `GET /health` reports queue depth.

pub mod handlers;

use crate::config::StatusPolicy;
use crate::worker::JobRunner;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<JobRunner>,
    pub agent_token: Arc<str>,
    pub status_policy: StatusPolicy,
}

impl AppState {
    pub fn new(runner: Arc<JobRunner>, agent_token: &str, status_policy: StatusPolicy) -> Self {
        Self {
            runner,
            agent_token: Arc::from(agent_token),
            status_policy,
        }
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            post(handlers::run_batch).fallback(handlers::method_not_allowed),
        )
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Media worker listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down HTTP server...");
            }
        })
        .await
}
