// src/api/http/mod.rs
// HTTP route wiring (§6 External Interfaces). Route handlers are thin:
// each extracts/validates its body and calls into the Session Registry /
// Reasoning Loop / Rate Limiter. Grounded in the teacher's
// `web::create_router` (CORS, trace layer, `/mcp` service nesting).

pub mod chat;
pub mod health;
pub mod mcp;
pub mod session;
pub mod shutdown;
pub mod status;
pub mod test_provider;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let mcp_service = mcp::mcp_service(state.browser_states.clone());
    let mcp_guard_state = state.clone();
    let loopback_guard = move |req: Request<Body>, next: Next| {
        let mcp_guard_state = mcp_guard_state.clone();
        async move { mcp::enforce_loopback(mcp_guard_state, req, next).await }
    };

    Router::new()
        .route("/health", get(health::health_check))
        .route("/status", get(status::status))
        .route("/shutdown", post(shutdown::shutdown))
        .route("/test-provider", post(test_provider::test_provider))
        .route("/chat", post(chat::chat))
        .route("/chat/{conversationId}", delete(session::delete_conversation))
        .nest_service(
            "/mcp",
            mcp_service
                .layer(middleware::from_fn(mcp::inject_scope_header))
                .layer(middleware::from_fn(loopback_guard)),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
