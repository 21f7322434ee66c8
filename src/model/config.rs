// src/model/config.rs
// Conversation.Config snapshot (§3): immutable for the life of a
// Conversation. Construction-from-this is how `ModelAdapter` picks and
// builds a provider.

use serde::{Deserialize, Serialize};

/// Ten provider families (§9 "Dynamic provider dispatch"). Credential
/// requirements are encoded per variant rather than left to a shared
/// "api key" bag, so a missing field is a compile-time shape rather than
/// a runtime lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "kebab-case")]
pub enum Provider {
    Anthropic { api_key: String },
    OpenAI { api_key: String },
    Google { api_key: String },
    OpenRouter { api_key: String },
    Azure { api_key: String, resource: String, deployment: String },
    Ollama { base_url: String },
    LMStudio { base_url: String },
    Bedrock { api_key: String, region: String },
    /// A managed gateway that proxies to `upstream` on the caller's
    /// behalf; the gateway speaks an OpenAI-compatible wire format and
    /// is the only variant the adapter applies its retry policy to.
    Managed { api_key: String, gateway_url: String, upstream: String },
    OpenAICompatible { api_key: String, base_url: String },
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Anthropic { .. } => "anthropic",
            Provider::OpenAI { .. } => "openai",
            Provider::Google { .. } => "google",
            Provider::OpenRouter { .. } => "openrouter",
            Provider::Azure { .. } => "azure",
            Provider::Ollama { .. } => "ollama",
            Provider::LMStudio { .. } => "lmstudio",
            Provider::Bedrock { .. } => "bedrock",
            Provider::Managed { .. } => "managed",
            Provider::OpenAICompatible { .. } => "openai-compatible",
        }
    }

    /// Whether this variant targets the managed gateway (§4.1 retry note).
    pub fn is_managed(&self) -> bool {
        matches!(self, Provider::Managed { .. })
    }
}

/// Reasoning effort, where the provider exposes the concept (grounded in
/// the teacher's `ReasoningEffort` on its GPT-5 provider).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl Default for ReasoningEffort {
    fn default() -> Self {
        ReasoningEffort::Medium
    }
}

impl ReasoningEffort {
    /// Wire value accepted by the OpenAI-compatible `reasoning_effort`
    /// request field.
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }

    /// Anthropic extended-thinking token budget this effort level maps to.
    /// `Low` disables thinking entirely (fastest, matches a provider's
    /// non-reasoning default).
    pub fn anthropic_thinking_budget(self) -> Option<u32> {
        match self {
            ReasoningEffort::Low => None,
            ReasoningEffort::Medium => Some(4096),
            ReasoningEffort::High => Some(16_000),
        }
    }

    /// Gemini `thinkingConfig.thinkingBudget` this effort level maps to.
    pub fn gemini_thinking_budget(self) -> u32 {
        match self {
            ReasoningEffort::Low => 0,
            ReasoningEffort::Medium => 8192,
            ReasoningEffort::High => 24_576,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Flattened so the wire body is one flat object (§6 `POST /chat`:
    /// `provider`, `model`, credentials as sibling fields) rather than a
    /// nested `{"provider": {"provider": ..., "api_key": ...}}` shape.
    #[serde(flatten)]
    pub provider: Provider,
    pub model: String,
    pub context_window: usize,
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
    pub system_prompt: String,
}
