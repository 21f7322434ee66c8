// src/mcp/pool.rs
// MCP Client Pool (C2, §4.2). Opens, multiplexes, and refreshes connections
// to one or more MCP servers for a single Conversation, and publishes their
// merged tool catalog to the Tool Dispatcher.
//
// Built on the teacher's JSON-RPC/transport plumbing (`protocol`,
// `transport`) generalized from a process-wide, config-file-driven
// `McpManager` into a per-Conversation pool assembled from three spec
// sources: the local in-process server, the external-integrations
// aggregator, and user-supplied custom URLs (§4.2).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::protocol::McpTool;
use super::transport::{HttpTransport, McpTransport, SseTransport};

/// One of the three sources a Conversation's MCP spec list is built from
/// (§4.2).
#[derive(Debug, Clone)]
pub enum McpServerSpec {
    /// Always included; hosts the server's own browser tools (C9).
    Local { url: String },
    /// Zero or more third-party services, negotiated once per Conversation
    /// via an external brokerage call. Out of scope here beyond its URL —
    /// the brokerage call itself lives with the caller (§1 "external
    /// collaborators").
    ExternalAggregator { url: String },
    /// User-supplied custom MCP URL.
    Custom { url: String },
}

impl McpServerSpec {
    pub fn url(&self) -> &str {
        match self {
            McpServerSpec::Local { url } => url,
            McpServerSpec::ExternalAggregator { url } => url,
            McpServerSpec::Custom { url } => url,
        }
    }

    /// The external aggregator's integration set can change mid-conversation
    /// (§4.2 "re-lists every few minutes and disconnects/reconnects if the
    /// authenticated-integration set changes"); other sources don't need
    /// periodic re-listing.
    pub(crate) fn relists(&self) -> bool {
        matches!(self, McpServerSpec::ExternalAggregator { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectedTransport {
    StreamableHttp,
    Sse,
}

struct CachedProbe {
    transport: DetectedTransport,
    cached_at: Instant,
}

/// Transport-detection cache, one per process, keyed by URL. A transient
/// 5xx probe result is never cached (§4.2).
#[derive(Default)]
pub struct ProbeCache {
    entries: RwLock<HashMap<String, CachedProbe>>,
    ttl: Duration,
}

impl ProbeCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl }
    }

    async fn get(&self, url: &str) -> Option<DetectedTransport> {
        let entries = self.entries.read().await;
        entries.get(url).and_then(|e| {
            if e.cached_at.elapsed() < self.ttl {
                Some(e.transport)
            } else {
                None
            }
        })
    }

    async fn put(&self, url: &str, transport: DetectedTransport) {
        let mut entries = self.entries.write().await;
        entries.insert(url.to_string(), CachedProbe { transport, cached_at: Instant::now() });
    }
}

/// A connected, bidirectional stream to one MCP endpoint (§3 MCPClient).
/// Owns its transport and a rolling tool catalog. Shared by exactly one
/// Conversation.
pub struct McpClient {
    pub url: String,
    pub tools: Vec<McpTool>,
    transport: Box<dyn McpTransport + Send + Sync>,
}

impl McpClient {
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
        let request = super::protocol::JsonRpcRequest::new(1, "tools/call", Some(params));
        let body = serde_json::to_string(&request)?;
        let response = self.transport.send(&body).await?;
        let parsed: super::protocol::JsonRpcResponse = serde_json::from_str(&response)?;
        if let Some(error) = parsed.error {
            anyhow::bail!("MCP error {}: {}", error.code, error.message);
        }
        parsed.result.context("empty MCP tools/call result")
    }
}

/// A tool available to the reasoning loop, with its owning client
/// referenced by URL (§3 ToolDefinition).
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub owner_url: String,
}

/// Per-Conversation pool of MCP clients plus their merged tool catalog
/// (§4.2). One pool per Conversation; never shared across conversations.
pub struct McpClientPool {
    clients: RwLock<HashMap<String, Arc<McpClient>>>,
    catalog: RwLock<HashMap<String, ToolDefinition>>,
    probe_cache: Arc<ProbeCache>,
    health: Option<Arc<super::health::HealthMonitor>>,
}

impl McpClientPool {
    pub fn new(probe_cache: Arc<ProbeCache>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            catalog: RwLock::new(HashMap::new()),
            probe_cache,
            health: None,
        }
    }

    /// Attaches a process-wide `HealthMonitor` (§9 "Global state"); connect
    /// failures on any spec become an observability event instead of just
    /// a log line (§4.3 "transport/exception -> ... plus an observability
    /// event").
    pub fn with_health(mut self, health: Arc<super::health::HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    /// Probes, connects, and merges tools for every spec. Duplicate tool
    /// names are resolved first-registered-wins, with a warning (§4.2).
    pub async fn connect(&self, specs: &[McpServerSpec]) -> Result<()> {
        for spec in specs {
            if let Some(health) = &self.health {
                health.register_server(spec.url()).await;
            }
            match self.connect_one(spec).await {
                Ok(()) => {
                    if let Some(health) = &self.health {
                        health.record_success(spec.url()).await;
                    }
                }
                Err(e) => {
                    warn!(url = spec.url(), error = %e, "failed to connect MCP server spec");
                    if let Some(health) = &self.health {
                        health.record_failure(spec.url(), &e.to_string()).await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn connect_one(&self, spec: &McpServerSpec) -> Result<()> {
        let transport_kind = self.detect_transport(spec.url()).await?;
        let transport: Box<dyn McpTransport + Send + Sync> = match transport_kind {
            DetectedTransport::StreamableHttp => Box::new(HttpTransport::new(spec.url())),
            DetectedTransport::Sse => Box::new(SseTransport::new(spec.url())),
        };

        let tools = list_tools(transport.as_ref()).await?;
        info!(url = spec.url(), count = tools.len(), "MCP server tool discovery complete");

        let client = Arc::new(McpClient { url: spec.url().to_string(), tools: tools.clone(), transport });

        {
            let mut clients = self.clients.write().await;
            clients.insert(spec.url().to_string(), client);
        }

        // The catalog is a view derived from connected clients and is
        // invalidated whenever a client reconnects (§3): drop this spec's
        // prior entries before merging its freshly-listed tools back in,
        // so a tool the server stops serving doesn't linger pointing at a
        // stale owner.
        let mut catalog = self.catalog.write().await;
        catalog.retain(|_, t| t.owner_url != spec.url());
        for tool in tools {
            if catalog.contains_key(&tool.name) {
                warn!(tool = %tool.name, url = spec.url(), "duplicate tool name; first-registered-wins");
                continue;
            }
            catalog.insert(
                tool.name.clone(),
                ToolDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone().unwrap_or_default(),
                    input_schema: tool.input_schema.clone().unwrap_or_else(|| serde_json::json!({"type": "object"})),
                    owner_url: spec.url().to_string(),
                },
            );
        }

        Ok(())
    }

    /// Probes the endpoint to detect streamable-HTTP vs. SSE, caching the
    /// result for one hour per URL (§4.2). A transient 5xx is never cached.
    async fn detect_transport(&self, url: &str) -> Result<DetectedTransport> {
        if let Some(cached) = self.probe_cache.get(url).await {
            return Ok(cached);
        }

        let probe = HttpTransport::new(url).probe().await;
        let detected = match probe {
            Ok(true) => DetectedTransport::StreamableHttp,
            Ok(false) => DetectedTransport::Sse,
            Err(e) => {
                warn!(url, error = %e, "transient MCP probe failure; not caching");
                return Err(e);
            }
        };

        self.probe_cache.put(url, detected).await;
        Ok(detected)
    }

    /// Re-lists tools from servers whose integration set may change
    /// (§4.2). Disconnects and reconnects a spec if its tool set differs.
    pub async fn relist(&self, specs: &[McpServerSpec]) -> Result<()> {
        for spec in specs.iter().filter(|s| s.relists()) {
            let before: Vec<String> = {
                let clients = self.clients.read().await;
                clients.get(spec.url()).map(|c| c.tools.iter().map(|t| t.name.clone()).collect()).unwrap_or_default()
            };
            self.connect_one(spec).await?;
            let after: Vec<String> = {
                let clients = self.clients.read().await;
                clients.get(spec.url()).map(|c| c.tools.iter().map(|t| t.name.clone()).collect()).unwrap_or_default()
            };
            if before != after {
                info!(url = spec.url(), "integration set changed; reconnected");
            }
        }
        Ok(())
    }

    /// Spawns the periodic re-list ticker for specs whose integration set
    /// may change (§4.2 "the external aggregator re-lists every few
    /// minutes ... and disconnects/reconnects if the authenticated-
    /// integration set changes"). One ticker per Conversation; the caller
    /// holds the handle and aborts it on Session disposal.
    pub fn spawn_relist_ticker(self: &Arc<Self>, specs: Vec<McpServerSpec>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = pool.relist(&specs).await {
                    warn!(error = %e, "periodic MCP relist failed");
                }
            }
        })
    }

    /// The merged tool catalog, invalidated whenever any client reconnects
    /// (§3 "Tool Catalog is a view derived from MCPClients").
    pub async fn catalog(&self) -> Vec<ToolDefinition> {
        self.catalog.read().await.values().cloned().collect()
    }

    pub async fn client_for(&self, tool_name: &str) -> Option<Arc<McpClient>> {
        let catalog = self.catalog.read().await;
        let owner_url = catalog.get(tool_name)?.owner_url.clone();
        drop(catalog);
        self.clients.read().await.get(&owner_url).cloned()
    }

    /// Closes every client; errors are swallowed (§4.2 "best-effort
    /// release").
    pub async fn close_all(&self) {
        let mut clients = self.clients.write().await;
        clients.clear();
        self.catalog.write().await.clear();
    }
}

async fn list_tools(transport: &(dyn McpTransport + Send + Sync)) -> Result<Vec<McpTool>> {
    let request = super::protocol::JsonRpcRequest::new(1, "tools/list", None);
    let body = serde_json::to_string(&request)?;
    let response = transport.send(&body).await?;
    let parsed: super::protocol::JsonRpcResponse = serde_json::from_str(&response)?;
    if let Some(error) = parsed.error {
        anyhow::bail!("MCP error {}: {}", error.code, error.message);
    }
    let result = parsed.result.context("empty tools/list result")?;
    let tools = result
        .get("tools")
        .and_then(|t| t.as_array())
        .cloned()
        .unwrap_or_default();
    Ok(tools
        .into_iter()
        .filter_map(|v| serde_json::from_value::<McpTool>(v).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_cache_roundtrip() {
        let cache = ProbeCache::new(Duration::from_secs(3600));
        assert!(cache.get("http://x").await.is_none());
        cache.put("http://x", DetectedTransport::Sse).await;
        assert_eq!(cache.get("http://x").await, Some(DetectedTransport::Sse));
    }

    #[tokio::test]
    async fn probe_cache_expires() {
        let cache = ProbeCache::new(Duration::from_millis(1));
        cache.put("http://x", DetectedTransport::StreamableHttp).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get("http://x").await.is_none());
    }

    #[tokio::test]
    async fn empty_pool_has_empty_catalog() {
        let pool = McpClientPool::new(Arc::new(ProbeCache::new(Duration::from_secs(3600))));
        assert!(pool.catalog().await.is_empty());
    }
}
