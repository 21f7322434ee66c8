// src/model/bedrock.rs
// Bedrock provider, modeled as an Anthropic-compatible endpoint reached
// with a bearer API key (AWS's newer "Bedrock API keys" auth mode) rather
// than full SigV4 request signing. Bedrock's hosted Claude models accept
// the same message/content-block shape as the direct Anthropic API, so
// this wraps `AnthropicProvider` with a region-scoped host instead of
// reimplementing the streaming parser.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::protocol::Message;

use super::anthropic::AnthropicProvider;
use super::config::ReasoningEffort;
use super::provider::{EventStream, LlmProvider, ToolSpec};

pub struct BedrockProvider {
    inner: AnthropicProvider,
}

impl BedrockProvider {
    pub fn new(
        api_key: String,
        region: String,
        model: String,
        system_prompt: String,
        reasoning_effort: ReasoningEffort,
    ) -> Self {
        let base_url = format!("https://bedrock-runtime.{region}.amazonaws.com/model/{model}/invoke-with-response-stream-anthropic-compat");
        let inner = AnthropicProvider::new(api_key, model, system_prompt, reasoning_effort).with_base_url(base_url);
        Self { inner }
    }
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    fn name(&self) -> &'static str {
        "bedrock"
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        cancel: CancellationToken,
    ) -> anyhow::Result<EventStream> {
        self.inner.stream(messages, tools, cancel).await
    }
}
