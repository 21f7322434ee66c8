// src/model/mod.rs
// Model Adapter (C1, §4.1). The `ModelAdapter` facade owns provider
// construction from a `ProviderConfig` snapshot and forwards `stream`;
// callers never touch a concrete provider struct directly.

mod anthropic;
mod bedrock;
pub mod config;
mod google;
mod managed;
mod openai_compatible;
mod provider;
mod sse;

pub use config::{Provider, ProviderConfig, ReasoningEffort};
pub use provider::{EventStream, LlmProvider, ToolSpec};

use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::protocol::Message;

use anthropic::AnthropicProvider;
use bedrock::BedrockProvider;
use google::GoogleProvider;
use managed::ManagedProvider;
use openai_compatible::OpenAiCompatibleProvider;

pub struct ModelAdapter;

impl ModelAdapter {
    /// Builds the provider named by `config.provider` and validates that
    /// its credential fields are non-empty (§7 ProviderConfigError: "missing/
    /// invalid credentials or unknown provider").
    pub fn build(config: &ProviderConfig) -> Result<Box<dyn LlmProvider>, AgentError> {
        let provider: Box<dyn LlmProvider> = match &config.provider {
            Provider::Anthropic { api_key } => {
                require_nonempty("api_key", api_key)?;
                Box::new(AnthropicProvider::new(
                    api_key.clone(),
                    config.model.clone(),
                    config.system_prompt.clone(),
                    config.reasoning_effort,
                ))
            }
            Provider::OpenAI { api_key } => {
                require_nonempty("api_key", api_key)?;
                Box::new(OpenAiCompatibleProvider::openai(
                    api_key.clone(),
                    config.model.clone(),
                    config.system_prompt.clone(),
                    config.reasoning_effort,
                ))
            }
            Provider::Google { api_key } => {
                require_nonempty("api_key", api_key)?;
                Box::new(GoogleProvider::new(
                    api_key.clone(),
                    config.model.clone(),
                    config.system_prompt.clone(),
                    config.reasoning_effort,
                ))
            }
            Provider::OpenRouter { api_key } => {
                require_nonempty("api_key", api_key)?;
                Box::new(OpenAiCompatibleProvider::openrouter(
                    api_key.clone(),
                    config.model.clone(),
                    config.system_prompt.clone(),
                    config.reasoning_effort,
                ))
            }
            Provider::Azure { api_key, resource, deployment } => {
                require_nonempty("api_key", api_key)?;
                require_nonempty("resource", resource)?;
                require_nonempty("deployment", deployment)?;
                Box::new(OpenAiCompatibleProvider::azure(
                    api_key.clone(),
                    resource.clone(),
                    deployment.clone(),
                    config.system_prompt.clone(),
                    config.reasoning_effort,
                ))
            }
            Provider::Ollama { base_url } => {
                require_nonempty("base_url", base_url)?;
                Box::new(OpenAiCompatibleProvider::ollama(
                    base_url.clone(),
                    config.model.clone(),
                    config.system_prompt.clone(),
                    config.reasoning_effort,
                ))
            }
            Provider::LMStudio { base_url } => {
                require_nonempty("base_url", base_url)?;
                Box::new(OpenAiCompatibleProvider::lmstudio(
                    base_url.clone(),
                    config.model.clone(),
                    config.system_prompt.clone(),
                    config.reasoning_effort,
                ))
            }
            Provider::Bedrock { api_key, region } => {
                require_nonempty("api_key", api_key)?;
                require_nonempty("region", region)?;
                Box::new(BedrockProvider::new(
                    api_key.clone(),
                    region.clone(),
                    config.model.clone(),
                    config.system_prompt.clone(),
                    config.reasoning_effort,
                ))
            }
            Provider::Managed { api_key, gateway_url, upstream } => {
                require_nonempty("api_key", api_key)?;
                require_nonempty("gateway_url", gateway_url)?;
                require_nonempty("upstream", upstream)?;
                Box::new(ManagedProvider::new(
                    api_key.clone(),
                    gateway_url.clone(),
                    upstream.clone(),
                    config.model.clone(),
                    config.system_prompt.clone(),
                    config.reasoning_effort,
                ))
            }
            Provider::OpenAICompatible { api_key, base_url } => {
                require_nonempty("api_key", api_key)?;
                require_nonempty("base_url", base_url)?;
                Box::new(OpenAiCompatibleProvider::openai_compatible(
                    api_key.clone(),
                    base_url.clone(),
                    config.model.clone(),
                    config.system_prompt.clone(),
                    config.reasoning_effort,
                ))
            }
        };

        Ok(provider)
    }

    /// Builds the provider and immediately starts a turn. Connection-time
    /// failures become `ProviderConfigError`/`ModelStreamError` at the
    /// caller; once a stream starts, failures surface as an `error` event
    /// inside it instead (§7).
    pub async fn stream(
        config: &ProviderConfig,
        messages: &[Message],
        tools: &[ToolSpec],
        cancel: CancellationToken,
    ) -> Result<EventStream, AgentError> {
        let provider = Self::build(config)?;
        provider
            .stream(messages, tools, cancel)
            .await
            .map_err(AgentError::Internal)
    }
}

fn require_nonempty(field: &str, value: &str) -> Result<(), AgentError> {
    if value.trim().is_empty() {
        return Err(AgentError::ProviderConfig(format!("missing required field: {field}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_api_key() {
        let config = ProviderConfig {
            provider: Provider::OpenAI { api_key: String::new() },
            model: "gpt-5".into(),
            context_window: 128_000,
            reasoning_effort: ReasoningEffort::Medium,
            system_prompt: "you are helpful".into(),
        };
        let result = ModelAdapter::build(&config);
        assert!(matches!(result, Err(AgentError::ProviderConfig(_))));
    }

    #[test]
    fn builds_each_provider_variant_with_valid_credentials() {
        let variants = vec![
            Provider::Anthropic { api_key: "k".into() },
            Provider::OpenAI { api_key: "k".into() },
            Provider::Google { api_key: "k".into() },
            Provider::OpenRouter { api_key: "k".into() },
            Provider::Azure { api_key: "k".into(), resource: "r".into(), deployment: "d".into() },
            Provider::Ollama { base_url: "http://localhost:11434".into() },
            Provider::LMStudio { base_url: "http://localhost:1234".into() },
            Provider::Bedrock { api_key: "k".into(), region: "us-east-1".into() },
            Provider::Managed { api_key: "k".into(), gateway_url: "https://gw".into(), upstream: "anthropic".into() },
            Provider::OpenAICompatible { api_key: "k".into(), base_url: "https://host".into() },
        ];
        for provider in variants {
            let config = ProviderConfig {
                provider,
                model: "m".into(),
                context_window: 128_000,
                reasoning_effort: ReasoningEffort::Medium,
                system_prompt: "sys".into(),
            };
            assert!(ModelAdapter::build(&config).is_ok());
        }
    }
}
