// src/api/http/session.rs
// `DELETE /chat/:conversationId` (§6): disposes a Conversation via the
// Session Registry (C7). 200 if it existed, 404 otherwise.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::state::AppState;

pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> StatusCode {
    if state.sessions.delete(&conversation_id).await {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}
