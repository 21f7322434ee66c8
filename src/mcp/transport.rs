// src/mcp/transport.rs
// Transport layer for MCP communication (streamable-HTTP and SSE, §3
// MCPClient "either streaming HTTP or SSE" — no stdio transport in this
// spec; the local server and every remote MCP endpoint are reached over
// HTTP).

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Transport trait for MCP communication
#[async_trait]
pub trait McpTransport {
    /// Send a message and receive a response
    async fn send(&self, message: &str) -> Result<String>;

    /// Check if transport is connected
    fn is_connected(&self) -> bool;
}

/// HTTP transport for remote MCP servers
/// Supports MCP's HTTP+SSE transport specification
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    session_id: tokio::sync::RwLock<Option<String>>,
    timeout_ms: u64,
}

impl HttpTransport {
    /// Create a new HTTP transport with default timeout
    pub fn new(url: &str) -> Self {
        Self::with_timeout(url, 30_000)
    }

    /// Create with custom timeout in milliseconds
    pub fn with_timeout(url: &str, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            url: url.to_string(),
            client,
            session_id: tokio::sync::RwLock::new(None),
            timeout_ms,
        }
    }

    /// Get the current session ID
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    /// Set the session ID (extracted from server response)
    pub async fn set_session_id(&self, id: String) {
        *self.session_id.write().await = Some(id);
    }

    /// Clear the session ID (for reconnection)
    pub async fn clear_session(&self) {
        *self.session_id.write().await = None;
    }

    /// Send a ping to check connection
    pub async fn ping(&self) -> bool {
        let ping = r#"{"jsonrpc":"2.0","id":0,"method":"ping"}"#;
        self.send(ping).await.is_ok()
    }

    /// Probes the endpoint to detect streamable-HTTP vs. SSE (§4.2).
    /// `Ok(true)` means streamable-HTTP, `Ok(false)` means the endpoint
    /// rejected a unary POST and should be tried as SSE instead. A 5xx is
    /// returned as `Err` so the caller never caches it.
    pub async fn probe(&self) -> Result<bool> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .body(r#"{"jsonrpc":"2.0","id":0,"method":"ping"}"#)
            .send()
            .await
            .context("MCP transport probe failed")?;

        if response.status().is_server_error() {
            anyhow::bail!("transient probe failure: {}", response.status());
        }

        let is_streamable_http = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(true);
        Ok(is_streamable_http)
    }
}

/// SSE transport: the endpoint answers a JSON-RPC request with a
/// `text/event-stream` response whose `data:` lines carry the JSON-RPC
/// response, rather than answering the POST body directly (§4.2, §3
/// MCPClient "either streaming HTTP or SSE").
pub struct SseTransport {
    url: String,
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new(url: &str) -> Self {
        Self { url: url.to_string(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send(&self, message: &str) -> Result<String> {
        use futures::StreamExt;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .body(message.to_string())
            .send()
            .await
            .context("SSE MCP request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("SSE MCP error {}: {}", status, body);
        }

        let mut stream = response.bytes_stream();
        let mut buf = String::new();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.context("SSE stream read error")?;
            buf.push_str(&String::from_utf8_lossy(&bytes));
            for line in buf.clone().lines() {
                if let Some(data) = line.strip_prefix("data:") {
                    return Ok(data.trim().to_string());
                }
            }
        }
        anyhow::bail!("SSE MCP stream ended with no data frame")
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send(&self, message: &str) -> Result<String> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");

        // Add session ID if we have one
        if let Some(session) = self.session_id.read().await.as_ref() {
            request = request.header("X-MCP-Session-Id", session);
        }

        let response = request
            .body(message.to_string())
            .send()
            .await
            .context("HTTP request failed")?;

        // Extract session ID from response headers if present
        if let Some(session) = response.headers().get("X-MCP-Session-Id") {
            if let Ok(session_str) = session.to_str() {
                *self.session_id.write().await = Some(session_str.to_string());
            }
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP error {}: {}", status, body);
        }

        response.text().await.context("Failed to read response body")
    }

    fn is_connected(&self) -> bool {
        // HTTP is connectionless, always "connected"
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_creation() {
        let transport = HttpTransport::new("http://localhost:3000/mcp");
        assert!(transport.is_connected());
    }
}
