//! Status HTTP server for loopcast
//!
//! Exposes the supervisor's published status read-only over HTTP.

use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use thiserror::Error;
use tracing::info;

use crate::status::{SharedStatus, StatusReport};

/// Body of `GET /`
pub const ROOT_MESSAGE: &str = "Live Streaming Running - Single Video with Random Audio";

/// Errors that can occur when running the status server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Handler for GET /
async fn get_root() -> &'static str {
    ROOT_MESSAGE
}

/// Handler for GET /health and GET /status
/// Returns the current StatusReport as JSON
async fn get_status(State(status): State<SharedStatus>) -> Json<StatusReport> {
    let report = status.read().await.clone();
    Json(report)
}

/// Creates the axum Router with the root and status endpoints
pub fn create_status_router(status: SharedStatus) -> Router {
    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_status))
        .route("/status", get(get_status))
        .with_state(status)
}

/// Parse `bind_address:port` into a socket address
pub fn parse_bind_address(bind_address: &str, port: u16) -> Result<SocketAddr, ServerError> {
    let ip = bind_address
        .parse()
        .map_err(|_| ServerError::InvalidAddress(bind_address.to_string()))?;
    Ok(SocketAddr::new(ip, port))
}

/// Runs the status HTTP server
///
/// # Arguments
/// * `status` - Shared status state to serve
/// * `addr` - Address to listen on
///
/// # Returns
/// * `Ok(())` if server shuts down gracefully
/// * `Err(ServerError)` if server fails to start
pub async fn run_status_server(status: SharedStatus, addr: SocketAddr) -> Result<(), ServerError> {
    let app = create_status_router(status);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Status server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
