//! HTTP and WebSocket server surface for the relay.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use crate::registry::DeviceGroups;
use crate::router::{handle_agent_socket, handle_browser_socket};
use crate::storage::RelayDatabase;


/// Shared state handed to every connection handler.
#[derive(Clone)]
pub struct AppState {
    pub db: RelayDatabase,
    pub groups: DeviceGroups,
}

/// Build the relay's route table.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/ws/agent", get(agent_ws))
        .route("/ws/browser/:device_id", get(browser_ws))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn agent_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    info!("Agent connection upgrading");
    ws.on_upgrade(move |socket| handle_agent_socket(socket, state))
}

async fn browser_ws(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    info!(device_id = %device_id, "Browser connection upgrading");
    ws.on_upgrade(move |socket| handle_browser_socket(socket, state, device_id))
}

/// Liveness probe with a couple of fleet gauges.
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let connected_agents = state.groups.connected_agents().await;
    let devices = state.db.device_count().await.unwrap_or(0);

    Json(json!({
        "status": "ok",
        "connected_agents": connected_agents,
        "devices": devices,
    }))
}
