// src/dispatcher.rs
// Tool Dispatcher (C3, §4.3). Given a model-requested tool call, routes to
// the right MCPClient, applies a per-call timeout, and normalizes the
// result into the model's tool-result form. Tool-layer failures are
// *always* recovered into a structured `ToolResult` (§7 "never propagated
// as turn failure") — this is the one component in the runtime that must
// never let an `Err` escape to the caller.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::mcp::McpClientPool;
use crate::protocol::ToolOutput;
use crate::session::Mode;

/// One requested tool invocation, as buffered off the model stream (§4.5
/// step 3).
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub input: Value,
}

pub struct ToolDispatcher {
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// §4.3 contract: `call(toolCall, signal) -> ToolResult`. Never
    /// returns `Err`; every failure mode is normalized into a
    /// `ToolOutput::ErrorText`/`ErrorJson` variant that the model sees as
    /// an ordinary tool result (§7 propagation policy).
    pub async fn call(
        &self,
        pool: &McpClientPool,
        mode: Mode,
        scope: &str,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> ToolOutput {
        if mode == Mode::Chat && !is_read_only_tool(&call.tool_name) {
            warn!(tool = %call.tool_name, "write tool rejected: conversation is in chat mode");
            return ToolOutput::ErrorText {
                value: format!(
                    "Tool '{}' is not available in chat mode (read-only tool surface).",
                    call.tool_name
                ),
            };
        }

        let Some(client) = pool.client_for(&call.tool_name).await else {
            return ToolOutput::ErrorText {
                value: format!("Tool '{}' is not registered with any connected MCP server.", call.tool_name),
            };
        };

        let arguments = inject_scope_header(call.input.clone(), scope);

        info!(tool = %call.tool_name, call_id = %call.call_id, "dispatching tool call");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return ToolOutput::ErrorText {
                    value: format!("Tool {} aborted: conversation cancelled", call.tool_name),
                };
            }
            result = tokio::time::timeout(self.timeout, client.call_tool(&call.tool_name, arguments)) => result,
        };

        match result {
            Err(_elapsed) => ToolOutput::ErrorText {
                value: format!("Tool {} timed out after {}s", call.tool_name, self.timeout.as_secs()),
            },
            Ok(Err(e)) => ToolOutput::ErrorText { value: e.to_string() },
            Ok(Ok(value)) => normalize_success(value),
        }
    }

    /// Sequentially dispatches an entire turn's buffered tool calls
    /// (§4.3 "Ordering": sequential, in model-emitted order; cancellation
    /// checked between calls). Returns one `ToolResult` per call, paired
    /// 1:1 by index with `calls`.
    pub async fn call_all(
        &self,
        pool: &McpClientPool,
        mode: Mode,
        scope: &str,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Vec<ToolOutput> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            if cancel.is_cancelled() {
                outputs.push(ToolOutput::ErrorText {
                    value: format!("Tool {} not dispatched: conversation cancelled", call.tool_name),
                });
                continue;
            }
            outputs.push(self.call(pool, mode, scope, call, cancel).await);
        }
        outputs
    }
}

fn normalize_success(value: Value) -> ToolOutput {
    // MCP `tools/call` results carry either a `content` array (text/error)
    // or arbitrary structured content (§4.3 normalization rules).
    if let Some(is_error) = value.get("isError").and_then(|v| v.as_bool()) {
        if is_error {
            let text = extract_text_content(&value).unwrap_or_else(|| value.to_string());
            return ToolOutput::ErrorText { value: text };
        }
    }

    if let Some(text) = extract_text_content(&value) {
        return ToolOutput::Text { value: text };
    }

    if let Some(structured) = value.get("structuredContent") {
        return ToolOutput::Json { value: structured.clone() };
    }

    ToolOutput::Json { value }
}

fn extract_text_content(value: &Value) -> Option<String> {
    let content = value.get("content")?.as_array()?;
    let mut out = String::new();
    for item in content {
        if item.get("type").and_then(|t| t.as_str()) == Some("text") {
            if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
                out.push_str(text);
            }
        }
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Injects conversation-scoped headers into the tool call arguments. For
/// the local MCP this carries the active window identifier from browser
/// context (§4.3b); represented as an `_scope` argument since the
/// in-process transport used here has no header concept once past the
/// HTTP boundary (see `mcp::local_server::ScopeHeader` for the HTTP-level
/// carrier used when the local server is reached over `/mcp` directly).
fn inject_scope_header(mut input: Value, scope: &str) -> Value {
    if let Value::Object(map) = &mut input {
        map.insert("_scope".to_string(), Value::String(scope.to_string()));
    }
    input
}

/// Read-only tools permitted in `Mode::Chat` (§3 `[ADD]` mode enforcement).
/// Everything else (navigate, click, type, and any non-browser/custom
/// tool) requires `Mode::Agent`.
fn is_read_only_tool(name: &str) -> bool {
    matches!(
        name,
        "browser_snapshot" | "browser_extract_content" | "browser_screenshot" | "browser_list_tabs"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::ProbeCache;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    fn empty_pool() -> McpClientPool {
        McpClientPool::new(Arc::new(ProbeCache::new(StdDuration::from_secs(3600))))
    }

    #[tokio::test]
    async fn missing_tool_returns_error_text_not_panic() {
        let dispatcher = ToolDispatcher::new(Duration::from_secs(1));
        let pool = empty_pool();
        let call = ToolCall { call_id: "c1".into(), tool_name: "nope".into(), input: serde_json::json!({}) };
        let out = dispatcher.call(&pool, Mode::Agent, "scope", &call, &CancellationToken::new()).await;
        assert!(out.is_error());
    }

    #[tokio::test]
    async fn chat_mode_rejects_write_tool_without_dispatch() {
        let dispatcher = ToolDispatcher::new(Duration::from_secs(1));
        let pool = empty_pool();
        let call = ToolCall { call_id: "c1".into(), tool_name: "browser_navigate".into(), input: serde_json::json!({}) };
        let out = dispatcher.call(&pool, Mode::Chat, "scope", &call, &CancellationToken::new()).await;
        match out {
            ToolOutput::ErrorText { value } => assert!(value.contains("chat mode")),
            _ => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn chat_mode_allows_read_only_tool_lookup() {
        let dispatcher = ToolDispatcher::new(Duration::from_secs(1));
        let pool = empty_pool();
        let call = ToolCall { call_id: "c1".into(), tool_name: "browser_snapshot".into(), input: serde_json::json!({}) };
        // Not registered, so this still errors, but via "not registered", not "chat mode".
        let out = dispatcher.call(&pool, Mode::Chat, "scope", &call, &CancellationToken::new()).await;
        match out {
            ToolOutput::ErrorText { value } => assert!(value.contains("not registered")),
            _ => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn cancellation_short_circuits_remaining_calls() {
        let dispatcher = ToolDispatcher::new(Duration::from_secs(1));
        let pool = empty_pool();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = vec![
            ToolCall { call_id: "c1".into(), tool_name: "a".into(), input: serde_json::json!({}) },
            ToolCall { call_id: "c2".into(), tool_name: "b".into(), input: serde_json::json!({}) },
        ];
        let outputs = dispatcher.call_all(&pool, Mode::Agent, "scope", &calls, &cancel).await;
        assert_eq!(outputs.len(), 2);
        for output in outputs {
            assert!(output.is_error());
        }
    }
}
