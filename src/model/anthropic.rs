// src/model/anthropic.rs
// Anthropic Messages API provider: distinct wire format from the OpenAI
// family (top-level `system`, `content` as a block array, tool use/result
// blocks instead of a separate `tool` role) but the same hand-rolled SSE
// loop grounded in the teacher's `Gpt5Provider::stream`.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::protocol::{Message, ModelStreamEvent, Part, Role, Usage};

use super::config::ReasoningEffort;
use super::provider::{EventStream, LlmProvider, ToolSpec};
use super::sse::data_lines;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    max_tokens: u32,
    reasoning_effort: ReasoningEffort,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, system_prompt: String, reasoning_effort: ReasoningEffort) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.anthropic.com/v1".into(),
            api_key,
            model,
            system_prompt,
            max_tokens: 8192,
            reasoning_effort,
        }
    }

    /// Used by `BedrockProvider`, whose Claude models accept the same
    /// message/content-block shape over a different host and auth header.
    pub(super) fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

fn to_anthropic_message(msg: &Message) -> Value {
    let content: Vec<Value> = msg
        .parts
        .iter()
        .map(|p| match p {
            Part::Text { text } => json!({"type": "text", "text": text}),
            Part::Image { bytes, media_type } => json!({
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": bytes},
            }),
            Part::ToolCall { call_id, tool_name, input } => json!({
                "type": "tool_use",
                "id": call_id,
                "name": tool_name,
                "input": input,
            }),
            Part::ToolResult { call_id, output, .. } => json!({
                "type": "tool_result",
                "tool_use_id": call_id,
                "content": output.as_display_string(),
                "is_error": output.is_error(),
            }),
        })
        .collect();

    json!({
        "role": if msg.role == Role::Tool { "user" } else if msg.role == Role::Assistant { "assistant" } else { "user" },
        "content": content,
    })
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        cancel: CancellationToken,
    ) -> anyhow::Result<EventStream> {
        let wire_messages: Vec<Value> = messages.iter().map(to_anthropic_message).collect();

        let mut body = json!({
            "model": self.model,
            "system": self.system_prompt,
            "messages": wire_messages,
            "max_tokens": self.max_tokens,
            "stream": true,
        });

        // Extended thinking, gated by the configured reasoning effort (§3
        // `[ADD]`/§9); `Low` leaves the request as a plain, non-thinking
        // call. `max_tokens` must exceed the thinking budget, so it is
        // widened to make room for it.
        if let Some(budget) = self.reasoning_effort.anthropic_thinking_budget() {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
            body["max_tokens"] = json!(self.max_tokens.max(budget + 1024));
        }

        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = json!(wire_tools);
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("anthropic returned {}: {}", status, text);
        }

        let lines = data_lines(response);
        let stream = async_stream::stream! {
            futures::pin_mut!(lines);
            // Block index -> (callId, toolName, accumulated JSON text).
            let mut tool_blocks: std::collections::HashMap<u64, (String, String, String)> = std::collections::HashMap::new();
            let mut input_tokens: u64 = 0;

            while let Some(data) = lines.next().await {
                if cancel.is_cancelled() {
                    break;
                }
                let event: Value = match serde_json::from_str(&data) {
                    Ok(v) => v,
                    Err(_) => continue,
                };

                match event["type"].as_str() {
                    Some("message_start") => {
                        input_tokens = event["message"]["usage"]["input_tokens"].as_u64().unwrap_or(0);
                    }
                    Some("content_block_start") => {
                        let index = event["index"].as_u64().unwrap_or(0);
                        let block = &event["content_block"];
                        if block["type"].as_str() == Some("tool_use") {
                            tool_blocks.insert(
                                index,
                                (
                                    block["id"].as_str().unwrap_or_default().to_string(),
                                    block["name"].as_str().unwrap_or_default().to_string(),
                                    String::new(),
                                ),
                            );
                        }
                    }
                    Some("content_block_delta") => {
                        let index = event["index"].as_u64().unwrap_or(0);
                        let delta = &event["delta"];
                        match delta["type"].as_str() {
                            Some("text_delta") => {
                                if let Some(text) = delta["text"].as_str() {
                                    yield ModelStreamEvent::TextDelta { delta: text.to_string() };
                                }
                            }
                            Some("thinking_delta") => {
                                if let Some(text) = delta["thinking"].as_str() {
                                    yield ModelStreamEvent::ReasoningDelta { delta: text.to_string() };
                                }
                            }
                            Some("input_json_delta") => {
                                if let Some(entry) = tool_blocks.get_mut(&index) {
                                    if let Some(partial) = delta["partial_json"].as_str() {
                                        entry.2.push_str(partial);
                                        yield ModelStreamEvent::ToolInputDelta {
                                            call_id: entry.0.clone(),
                                            delta: partial.to_string(),
                                        };
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    Some("content_block_stop") => {
                        let index = event["index"].as_u64().unwrap_or(0);
                        if let Some((call_id, tool_name, json_text)) = tool_blocks.remove(&index) {
                            let parsed = if json_text.is_empty() {
                                Ok(json!({}))
                            } else {
                                serde_json::from_str::<Value>(&json_text)
                            };
                            match parsed {
                                Ok(input) => yield ModelStreamEvent::ToolInputAvailable { call_id, tool_name, input },
                                Err(e) => yield ModelStreamEvent::ToolInputError {
                                    call_id,
                                    error_text: format!("malformed tool arguments: {e}"),
                                },
                            }
                        }
                    }
                    Some("message_delta") => {
                        if let Some(usage) = event.get("usage") {
                            let output_tokens = usage["output_tokens"].as_u64().unwrap_or(0);
                            if event["delta"]["stop_reason"].is_string() {
                                yield ModelStreamEvent::Finish {
                                    usage: Usage { input_tokens, output_tokens, reasoning_tokens: None },
                                };
                            }
                        }
                    }
                    Some("error") => {
                        yield ModelStreamEvent::Error {
                            error_text: event["error"]["message"].as_str().unwrap_or("unknown anthropic error").to_string(),
                        };
                        break;
                    }
                    _ => {}
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
