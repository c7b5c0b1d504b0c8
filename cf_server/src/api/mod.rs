//! HTTP/WebSocket API for the coin flip server.
//!
//! - `GET /ws`: upgrade to the game's WebSocket protocol. Everything after
//!   the upgrade is envelope traffic handled by [`websocket`].
//! - `GET /rooms`: list live rooms for discovery.
//! - `GET /health`: liveness probe with connection and room counts.

use axum::{Json, Router, extract::State, routing::get};
use coinflip::SessionRegistry;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::config::ServerConfig;

/// Connection gateway: read/write loops and keepalive per connection.
pub mod websocket;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<ServerConfig>,
}

/// Build the router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket::websocket_handler))
        .route("/rooms", get(list_rooms))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn list_rooms(State(state): State<AppState>) -> Json<Value> {
    let rooms = state.registry.room_summaries().await;
    Json(json!({
        "rooms": rooms,
        "total": rooms.len(),
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "active_rooms": state.registry.room_count().await,
        "active_clients": state.registry.connection_count().await,
    }))
}
