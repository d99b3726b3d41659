//! Streamable-HTTP style transport: one JSON-RPC message per `POST /mcp`.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::protocol::ServerResult;
use crate::server::HdxMcpServer;

pub fn router(server: Arc<HdxMcpServer>) -> Router {
    Router::new()
        .route("/mcp", post(handle_message))
        .route("/health", get(health))
        .with_state(server)
}

async fn handle_message(State(server): State<Arc<HdxMcpServer>>, body: String) -> Response {
    match server.handle_message(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Listen on `host:port` until Ctrl-C.
pub async fn serve(server: Arc<HdxMcpServer>, host: &str, port: u16) -> ServerResult<()> {
    let listener = TcpListener::bind((host, port)).await?;
    tracing::info!(
        "Starting HDX MCP server with HTTP transport on http://{}/mcp",
        listener.local_addr()?
    );

    axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP transport stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received interrupt signal, shutting down");
}
