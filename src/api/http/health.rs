// src/api/http/health.rs
// `GET /health` (§6): liveness probe. Feeds whatever external watchdog is
// polling the process; intentionally cheap (no downstream checks).

use axum::Json;

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
