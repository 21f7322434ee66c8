// src/mcp/mod.rs
// Model Context Protocol plumbing: JSON-RPC wire types and transports
// (§3 MCPClient) plus the per-Conversation Client Pool (C2, §4.2) built on
// top of them. The in-process browser-tool server (C9, §4.9) lives in
// `local_server` and is consumed through this same pool like any remote
// integration.

pub mod health;
pub mod local_server;
pub mod pool;
pub mod protocol;
pub mod transport;

pub use health::{HealthMonitor, ServerHealth};
pub use pool::{McpClient, McpClientPool, McpServerSpec, ProbeCache, ToolDefinition};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, McpTool};
