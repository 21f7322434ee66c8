// src/config/mod.rs
// Central configuration for the agent runtime. Every field has a sane
// default (via `helpers::env_or`/`env_usize`); optional capability config
// disables the capability rather than failing (§6 Configuration).

pub mod helpers;
pub mod mcp;
pub mod server;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub use mcp::{CompactorConfig, McpConfig, ReasoningConfig};
pub use server::{CapabilityConfig, DatabaseConfig, LoggingConfig, RateLimitConfig, ServerConfig};

pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

/// Process-wide, env-derived configuration. Per-conversation `Config`
/// snapshots (provider, model, credentials, window size) are request-scoped
/// and live in `session::conversation::ConversationConfig`, not here — they
/// are immutable per spec.md §3 but vary per request, so they cannot be a
/// process-wide static.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub rate_limit: RateLimitConfig,
    pub mcp: McpConfig,
    pub compactor: CompactorConfig,
    pub reasoning: ReasoningConfig,
    pub capabilities: CapabilityConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            logging: LoggingConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            mcp: McpConfig::from_env(),
            compactor: CompactorConfig::default(),
            reasoning: ReasoningConfig::default(),
            capabilities: CapabilityConfig::from_env(),
        }
    }
}
