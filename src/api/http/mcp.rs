// src/api/http/mcp.rs
// `ALL /mcp` (§6, §4.9): the Local MCP Server mounted over the Streamable
// HTTP transport, grounded in the teacher's `web/mcp_http.rs`. Loopback-
// only by default (enforced here by `enforce_loopback`, gated by
// `ServerConfig::mcp_allow_remote`); a direct third-party caller identifies
// its browser scope via the `x-scope` header, lifted into a `ScopeHeader`
// request extension before the service sees it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::mcp::local_server::{BrowserStateRegistry, LocalMcpServer, ScopeHeader};
use crate::state::AppState;

pub fn mcp_service(
    registry: Arc<BrowserStateRegistry>,
) -> StreamableHttpService<LocalMcpServer, LocalSessionManager> {
    let service_factory = move || Ok(LocalMcpServer::new(registry.clone()));
    let session_manager = Arc::new(LocalSessionManager::default());
    let config = StreamableHttpServerConfig {
        sse_keep_alive: Some(std::time::Duration::from_secs(15)),
        stateful_mode: true,
        cancellation_token: CancellationToken::new(),
    };
    StreamableHttpService::new(service_factory, session_manager, config)
}

pub async fn inject_scope_header(mut request: Request<Body>, next: Next) -> Response {
    if let Some(value) = request.headers().get("x-scope").and_then(|v| v.to_str().ok()) {
        request.extensions_mut().insert(ScopeHeader(value.to_string()));
    }
    next.run(request).await
}

/// Rejects non-loopback connections to `/mcp` unless
/// `ServerConfig::mcp_allow_remote` is set (§4.9 "refuses non-loopback
/// requests unless explicitly configured otherwise"; §6 "localhost-only by
/// default"). Reads `ConnectInfo` off the request extensions rather than
/// as a hard `FromRequestParts` extraction so a request that somehow
/// arrives with no peer address recorded fails closed (403) instead of
/// 500ing out of the extractor.
pub async fn enforce_loopback(state: Arc<AppState>, request: Request<Body>, next: Next) -> Response {
    if !state.config.server.mcp_allow_remote {
        let is_loopback = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().is_loopback())
            .unwrap_or(false);
        if !is_loopback {
            warn!("rejected non-loopback /mcp request");
            return (StatusCode::FORBIDDEN, "the /mcp endpoint is loopback-only").into_response();
        }
    }
    next.run(request).await
}
