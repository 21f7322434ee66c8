// src/config/server.rs
// Process-level server configuration: bind address, execution directory,
// logging, and the MCP localhost guard.

use serde::{Deserialize, Serialize};

use super::helpers::{env_or, env_usize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root directory used to materialize per-session working directories
    /// for tools that need them.
    pub execution_dir: String,
    /// Relaxes the `/mcp` localhost-only guard (§6 "ALL /mcp"). Off by
    /// default; only meant for containerized deployments behind their own
    /// network boundary.
    pub mcp_allow_remote: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("AGENT_HOST", "127.0.0.1"),
            port: env_usize("AGENT_PORT", 8787) as u16,
            execution_dir: env_or("AGENT_EXECUTION_DIR", "./sessions"),
            mcp_allow_remote: env_or("AGENT_MCP_ALLOW_REMOTE", "false") == "true",
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            level: env_or("AGENT_LOG_LEVEL", "info"),
        }
    }
}

/// Database configuration, backing the rate-limiter table (§6 persisted
/// state) and nothing else — the core never persists conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_or("DATABASE_URL", "sqlite://agent.db"),
            max_connections: env_usize("AGENT_SQLITE_MAX_CONNECTIONS", 5) as u32,
        }
    }
}

/// Daily per-tenant cap on managed-provider usage (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Fetched from the catalog service at startup; falls back to this
    /// default when the service is unreachable or `CATALOG_SERVICE_URL`
    /// is unset.
    pub daily_limit_default: u32,
    /// Development/test environments bypass with a hard-coded generous
    /// limit instead of calling the catalog service at all.
    pub bypass: bool,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let env_name = env_or("AGENT_ENV", "production");
        let bypass = matches!(env_name.as_str(), "development" | "test");
        Self {
            daily_limit_default: env_usize("AGENT_RATE_LIMIT_DEFAULT", 50) as u32,
            bypass,
        }
    }
}

/// Optional capability config: absence disables the capability rather
/// than failing boot (§6 Configuration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub catalog_service_url: Option<String>,
    pub analytics_key: Option<String>,
    pub error_reporting_dsn: Option<String>,
}

impl CapabilityConfig {
    pub fn from_env() -> Self {
        Self {
            catalog_service_url: std::env::var("CATALOG_SERVICE_URL").ok(),
            analytics_key: std::env::var("AGENT_ANALYTICS_KEY").ok(),
            error_reporting_dsn: std::env::var("AGENT_ERROR_REPORTING_DSN").ok(),
        }
    }
}
