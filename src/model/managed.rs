// src/model/managed.rs
// Managed-gateway provider (§4.1 "[ADD] Retry policy"). The gateway
// proxies to `upstream` on the caller's behalf and speaks an
// OpenAI-compatible wire format, so request construction and stream
// parsing are shared with `openai_compatible`; what's unique here is the
// retry policy around the initial connect.

use async_trait::async_trait;
use governor::Jitter;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::protocol::Message;

use super::config::ReasoningEffort;
use super::openai_compatible::{parse_stream, OpenAiCompatibleProvider};
use super::provider::{EventStream, LlmProvider, ToolSpec};

const RETRYABLE: [u16; 7] = [408, 409, 429, 500, 502, 503, 504];
const MAX_ATTEMPTS: u32 = 3;

pub struct ManagedProvider {
    client: Client,
    gateway_url: String,
    api_key: String,
    upstream: String,
    inner: OpenAiCompatibleProvider,
}

impl ManagedProvider {
    pub fn new(
        api_key: String,
        gateway_url: String,
        upstream: String,
        model: String,
        system_prompt: String,
        reasoning_effort: ReasoningEffort,
    ) -> Self {
        let inner = OpenAiCompatibleProvider::openai_compatible(
            api_key.clone(),
            gateway_url.clone(),
            model,
            system_prompt,
            reasoning_effort,
        );
        Self {
            client: Client::new(),
            gateway_url,
            api_key,
            upstream,
            inner,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.gateway_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for ManagedProvider {
    fn name(&self) -> &'static str {
        "managed"
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        cancel: CancellationToken,
    ) -> anyhow::Result<EventStream> {
        let body = self.inner.build_body(messages, tools);

        // Exponential backoff with jitter (grounded in the teacher's
        // governor-based rate limiter's `Jitter` use), 3 attempts max.
        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(self.endpoint())
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("X-Upstream-Provider", &self.upstream)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(parse_stream(response, cancel));
            }

            let retryable = RETRYABLE.contains(&status.as_u16());
            if !retryable || attempt >= MAX_ATTEMPTS {
                let text = response.text().await.unwrap_or_default();
                anyhow::bail!("managed gateway returned {}: {}", status, text);
            }

            backoff_with_jitter(attempt, status).await;
        }
    }
}

async fn backoff_with_jitter(attempt: u32, status: StatusCode) {
    let base = std::time::Duration::from_millis(250 * 2u64.pow(attempt - 1));
    let jitter = Jitter::new(std::time::Duration::from_millis(0), std::time::Duration::from_millis(200));
    tracing::debug!(attempt, %status, "retrying managed-gateway request after backoff");
    tokio::time::sleep(base + jitter).await;
}
