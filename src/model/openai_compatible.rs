// src/model/openai_compatible.rs
// Shared implementation for the six provider variants that all speak the
// OpenAI chat-completions wire format: OpenAI, Azure, OpenRouter, Ollama,
// LMStudio, OpenAICompatible (§4.1 "share a single implementation
// parameterized by base URL and streaming-protocol quirks"). Grounded in
// the teacher's `Gpt5Provider` (same request/response shape, same
// hand-rolled SSE loop) generalized so brand differences are just
// different `base_url`/header construction.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::protocol::{Message, ModelStreamEvent, Part, Role, Usage};

use super::config::ReasoningEffort;
use super::provider::{EventStream, LlmProvider, ToolSpec};
use super::sse::data_lines;

pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    model: String,
    system_prompt: String,
    /// Applied to every request (`Authorization: Bearer ...`, Azure's
    /// `api-key`, etc.) — brands differ only in header shape, not in the
    /// wire body.
    headers: Vec<(String, String)>,
    display_name: &'static str,
    reasoning_effort: ReasoningEffort,
}

impl OpenAiCompatibleProvider {
    pub fn openai(api_key: String, model: String, system_prompt: String, reasoning_effort: ReasoningEffort) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.openai.com/v1".into(),
            model,
            system_prompt,
            headers: vec![("Authorization".into(), format!("Bearer {api_key}"))],
            display_name: "openai",
            reasoning_effort,
        }
    }

    pub fn openrouter(api_key: String, model: String, system_prompt: String, reasoning_effort: ReasoningEffort) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://openrouter.ai/api/v1".into(),
            model,
            system_prompt,
            headers: vec![("Authorization".into(), format!("Bearer {api_key}"))],
            display_name: "openrouter",
            reasoning_effort,
        }
    }

    pub fn azure(
        api_key: String,
        resource: String,
        deployment: String,
        system_prompt: String,
        reasoning_effort: ReasoningEffort,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: format!(
                "https://{resource}.openai.azure.com/openai/deployments/{deployment}"
            ),
            model: deployment,
            system_prompt,
            headers: vec![("api-key".into(), api_key)],
            display_name: "azure",
            reasoning_effort,
        }
    }

    pub fn ollama(base_url: String, model: String, system_prompt: String, reasoning_effort: ReasoningEffort) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model,
            system_prompt,
            headers: Vec::new(),
            display_name: "ollama",
            reasoning_effort,
        }
    }

    pub fn lmstudio(base_url: String, model: String, system_prompt: String, reasoning_effort: ReasoningEffort) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model,
            system_prompt,
            headers: Vec::new(),
            display_name: "lmstudio",
            reasoning_effort,
        }
    }

    pub fn openai_compatible(
        api_key: String,
        base_url: String,
        model: String,
        system_prompt: String,
        reasoning_effort: ReasoningEffort,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model,
            system_prompt,
            headers: vec![("Authorization".into(), format!("Bearer {api_key}"))],
            display_name: "openai-compatible",
            reasoning_effort,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Builds the request skeleton (model, tool schema, streaming flags).
    /// Callers fill in `messages` themselves, since tool messages need
    /// flattening first (see `stream`).
    fn request_skeleton(&self, tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": self.model,
            "stream": true,
            "stream_options": {"include_usage": true},
            "reasoning_effort": self.reasoning_effort.as_str(),
        });

        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(wire_tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }
}

/// Translates one of our `Message`s into zero or more OpenAI wire messages.
/// A tool message with N results becomes N `{role: "tool"}` entries, since
/// OpenAI ties each tool result to exactly one `tool_call_id`.
fn to_openai_message(msg: &Message) -> Value {
    match msg.role {
        Role::User => json!({"role": "user", "content": text_of(msg)}),
        Role::Assistant => {
            let tool_calls: Vec<Value> = msg
                .parts
                .iter()
                .filter_map(|p| match p {
                    Part::ToolCall { call_id, tool_name, input } => Some(json!({
                        "id": call_id,
                        "type": "function",
                        "function": {
                            "name": tool_name,
                            "arguments": serde_json::to_string(input).unwrap_or_default(),
                        }
                    })),
                    _ => None,
                })
                .collect();

            let mut out = json!({"role": "assistant", "content": text_of(msg)});
            if !tool_calls.is_empty() {
                out["tool_calls"] = json!(tool_calls);
            }
            out
        }
        // Tool messages are flattened into per-result entries by the
        // caller before this function ever sees them (see `stream`).
        Role::Tool => unreachable!("tool messages are flattened before this call"),
    }
}

fn text_of(msg: &Message) -> String {
    msg.parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

fn tool_result_messages(msg: &Message) -> Vec<Value> {
    msg.parts
        .iter()
        .filter_map(|p| match p {
            Part::ToolResult { call_id, output, .. } => Some(json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": output.as_display_string(),
            })),
            _ => None,
        })
        .collect()
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl OpenAiCompatibleProvider {
    /// Builds the full wire body: system prompt, flattened messages
    /// (one `{role: tool}` entry per tool result, §4.1), tools, streaming
    /// flags. Shared with `ManagedProvider`, which speaks the same format
    /// against a gateway host.
    pub(super) fn build_body(&self, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let mut flat = Vec::with_capacity(messages.len());
        for msg in messages {
            if msg.is_tool_message() {
                flat.extend(tool_result_messages(msg));
            } else {
                flat.push(to_openai_message(msg));
            }
        }
        let mut body = self.request_skeleton(tools);
        let mut wire_messages = vec![json!({"role": "system", "content": self.system_prompt})];
        wire_messages.extend(flat);
        body["messages"] = json!(wire_messages);
        body
    }
}

/// Turns a successful streaming response into `ModelStreamEvent`s. Shared
/// by every OpenAI-wire-format provider (§4.1 "share a single
/// implementation"), including `ManagedProvider`.
pub(super) fn parse_stream(response: reqwest::Response, cancel: CancellationToken) -> EventStream {
    let lines = data_lines(response);
    let stream = async_stream::stream! {
            futures::pin_mut!(lines);
            let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();
            let mut order: Vec<u32> = Vec::new();

            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let Some(data) = lines.next().await else { break };
                if data == "[DONE]" {
                    break;
                }
                let chunk: Value = match serde_json::from_str(&data) {
                    Ok(v) => v,
                    Err(_) => continue,
                };

                if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
                    yield ModelStreamEvent::Finish {
                        usage: Usage {
                            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
                            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
                            reasoning_tokens: usage["completion_tokens_details"]["reasoning_tokens"].as_u64(),
                        },
                    };
                    break;
                }

                let delta = &chunk["choices"][0]["delta"];

                if let Some(text) = delta["content"].as_str() {
                    if !text.is_empty() {
                        yield ModelStreamEvent::TextDelta { delta: text.to_string() };
                    }
                }

                if let Some(calls) = delta["tool_calls"].as_array() {
                    for call in calls {
                        let Some(index) = call["index"].as_u64().map(|i| i as u32) else { continue };
                        let entry = pending.entry(index).or_insert_with(|| {
                            order.push(index);
                            PendingToolCall::default()
                        });
                        if let Some(id) = call["id"].as_str() {
                            entry.id = id.to_string();
                        }
                        if let Some(name) = call["function"]["name"].as_str() {
                            entry.name = name.to_string();
                        }
                        if let Some(args_delta) = call["function"]["arguments"].as_str() {
                            entry.arguments.push_str(args_delta);
                            yield ModelStreamEvent::ToolInputDelta {
                                call_id: entry.id.clone(),
                                delta: args_delta.to_string(),
                            };
                        }
                    }
                }

                let finish_reason = chunk["choices"][0]["finish_reason"].as_str();
                if finish_reason == Some("tool_calls") || finish_reason == Some("stop") {
                    for index in &order {
                        if let Some(call) = pending.remove(index) {
                            match serde_json::from_str::<Value>(&call.arguments) {
                                Ok(input) => yield ModelStreamEvent::ToolInputAvailable {
                                    call_id: call.id,
                                    tool_name: call.name,
                                    input,
                                },
                                Err(e) => yield ModelStreamEvent::ToolInputError {
                                    call_id: call.id,
                                    error_text: format!("malformed tool arguments: {e}"),
                                },
                            }
                        }
                    }
                    order.clear();
                }
            }
        };

    Box::pin(stream)
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        self.display_name
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        cancel: CancellationToken,
    ) -> anyhow::Result<EventStream> {
        let body = self.build_body(messages, tools);

        let mut req = self.client.post(self.endpoint()).json(&body);
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {}: {}", self.display_name, status, text);
        }

        Ok(parse_stream(response, cancel))
    }
}
