// src/api/http/status.rs
// `GET /status` (§6): reports the liveness of the extension-side bridge
// and a coarse view of the Session Registry, for the UI's connection
// indicator.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

pub async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "bridgeConnected": state.is_bridge_connected(),
        "activeConversations": state.sessions.count().await,
    }))
}
