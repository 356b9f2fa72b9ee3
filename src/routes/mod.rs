// src/routes/mod.rs
pub mod health;

use std::net::SocketAddr;

use axum::{Router, routing::get};
use health::health_handler;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::AppError;

pub fn create_router() -> Router {
    Router::new()
        .route("/", get(health_handler))
        .layer(TraceLayer::new_for_http())
}

pub async fn bind(port: u16) -> Result<TcpListener, AppError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Liveness(format!("failed to bind {addr}: {e}")))
}

/// Serves the liveness router until the listener fails.
pub async fn serve(listener: TcpListener) -> Result<(), AppError> {
    if let Ok(addr) = listener.local_addr() {
        info!("liveness endpoint listening on http://{addr}/");
    }
    axum::serve(listener, create_router())
        .await
        .map_err(|e| AppError::Liveness(format!("server error: {e}")))
}
