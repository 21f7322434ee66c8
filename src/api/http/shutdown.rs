// src/api/http/shutdown.rs
// `POST /shutdown` (§6, §9 process lifecycle): raises the process-wide
// cancellation token `main` awaits to start the graceful-shutdown
// sequence. Idempotent — cancelling an already-cancelled token is a no-op.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use tracing::info;

use crate::state::AppState;

pub async fn shutdown(State(state): State<Arc<AppState>>) -> StatusCode {
    info!("shutdown requested via POST /shutdown");
    state.shutdown.cancel();
    StatusCode::OK
}
