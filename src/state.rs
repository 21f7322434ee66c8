// src/state.rs
// Process-wide application state (§9 "Global state": Session Registry, MCP
// transport probe cache, and the metrics/analytics client are the only
// truly process-wide pieces; everything else is request- or
// Conversation-scoped). Assembled once at boot and handed to the axum
// router as `State<Arc<AppState>>`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::compactor::Compactor;
use crate::config::AppConfig;
use crate::dispatcher::ToolDispatcher;
use crate::mcp::local_server::BrowserStateRegistry;
use crate::mcp::{HealthMonitor, ProbeCache};
use crate::rate_limit::RateLimiter;
use crate::reasoning::ReasoningLoop;
use crate::session::SessionRegistry;

pub struct AppState {
    pub config: &'static AppConfig,
    pub sessions: Arc<SessionRegistry>,
    pub probe_cache: Arc<ProbeCache>,
    pub mcp_health: Arc<HealthMonitor>,
    /// Per-scope browser state backing the Local MCP Server (C9, §4.9).
    /// One process-wide registry; scopes are namespaced by conversation id.
    pub browser_states: Arc<BrowserStateRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub reasoning: Arc<ReasoningLoop>,
    /// Liveness of the extension-side WebSocket bridge (§6 `GET /status`).
    /// The bridge itself is an external collaborator (§1); this flag is
    /// only ever flipped by that bridge's connect/disconnect notifications,
    /// which arrive through a named interface outside the core.
    pub bridge_connected: Arc<AtomicBool>,
    /// Raised by `POST /shutdown` or a SIGTERM; `main` awaits it to start
    /// the graceful-shutdown sequence (§9 "Process lifecycle").
    pub shutdown: CancellationToken,
}

impl AppState {
    pub async fn new(config: &'static AppConfig) -> anyhow::Result<Self> {
        let rate_limiter = RateLimiter::connect(
            &config.database.url,
            config.database.max_connections,
            config.rate_limit.clone(),
        )
        .await?;

        let reasoning = ReasoningLoop::new(
            Compactor::new(config.compactor.clone()),
            ToolDispatcher::new(Duration::from_secs(config.mcp.default_tool_timeout_secs)),
            config.reasoning.max_turns,
        );

        Ok(Self {
            config,
            sessions: Arc::new(SessionRegistry::new()),
            probe_cache: Arc::new(ProbeCache::new(Duration::from_secs(config.mcp.probe_cache_ttl_secs))),
            mcp_health: Arc::new(HealthMonitor::new(config.mcp.relist_interval_secs * 1000)),
            browser_states: Arc::new(BrowserStateRegistry::new(Duration::from_secs(
                config.mcp.browser_state_ttl_secs,
            ))),
            rate_limiter: Arc::new(rate_limiter),
            reasoning: Arc::new(reasoning),
            bridge_connected: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        })
    }

    /// The local MCP server's own loopback URL, always the first spec
    /// built for a new Conversation (§4.2 source 1).
    pub fn local_mcp_url(&self) -> String {
        format!("http://{}:{}/mcp", "127.0.0.1", self.config.server.port)
    }

    pub fn is_bridge_connected(&self) -> bool {
        self.bridge_connected.load(Ordering::Relaxed)
    }
}
