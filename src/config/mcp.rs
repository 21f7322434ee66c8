// src/config/mcp.rs
// MCP Client Pool and Local MCP Server configuration (C2, C9).

use serde::{Deserialize, Serialize};

use super::helpers::{env_or, env_usize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// How long a transport probe result is cached, per URL (§4.2).
    pub probe_cache_ttl_secs: u64,
    /// Default per-call tool timeout (§4.3), overridable per call.
    pub default_tool_timeout_secs: u64,
    /// Browser-state TTL for the local MCP server's scope map (§4.9).
    pub browser_state_ttl_secs: u64,
    /// Sweep interval for expired browser state (§4.9).
    pub browser_state_sweep_interval_secs: u64,
    /// Re-list interval for servers whose integration set may change
    /// (the external aggregator, §4.2).
    pub relist_interval_secs: u64,
}

impl McpConfig {
    pub fn from_env() -> Self {
        Self {
            probe_cache_ttl_secs: env_usize("AGENT_MCP_PROBE_TTL_SECS", 3600) as u64,
            default_tool_timeout_secs: env_usize("AGENT_TOOL_TIMEOUT_SECS", 60) as u64,
            browser_state_ttl_secs: env_usize("AGENT_BROWSER_STATE_TTL_SECS", 1800) as u64,
            browser_state_sweep_interval_secs: env_usize("AGENT_BROWSER_STATE_SWEEP_SECS", 300)
                as u64,
            relist_interval_secs: env_usize("AGENT_MCP_RELIST_SECS", 300) as u64,
        }
    }
}

/// Compactor configuration (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactorConfig {
    /// `K` — tool-output truncation length, in characters.
    pub truncate_chars: usize,
    /// Fraction of `contextWindow` that triggers the sliding window.
    pub compaction_threshold: f64,
    /// Heuristic characters-per-token used for the budget estimate.
    pub chars_per_token: usize,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            truncate_chars: env_usize("AGENT_COMPACTOR_TRUNCATE_CHARS", 15_000),
            compaction_threshold: env_or("AGENT_COMPACTOR_THRESHOLD", "0.6")
                .parse()
                .unwrap_or(0.6),
            chars_per_token: env_usize("AGENT_COMPACTOR_CHARS_PER_TOKEN", 4),
        }
    }
}

/// Reasoning loop configuration (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub max_turns: u32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_turns: env_usize("AGENT_MAX_TURNS", 48) as u32,
        }
    }
}
