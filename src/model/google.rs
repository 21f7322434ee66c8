// src/model/google.rs
// Google (Gemini) provider. Distinct wire shape from both OpenAI and
// Anthropic: `contents[].role` is `user`/`model` (no `assistant`/`tool`),
// function calls/results live as `functionCall`/`functionResponse` parts on
// those roles, and the system prompt is a separate `systemInstruction`
// field rather than a message. Grounded in the teacher's
// `Gemini3Provider::stream` (`streamGenerateContent?alt=sse` endpoint,
// `candidates[0].content.parts[0].text` extraction).

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::protocol::{Message, ModelStreamEvent, Part, Role, Usage};

use super::config::ReasoningEffort;
use super::provider::{EventStream, LlmProvider, ToolSpec};
use super::sse::data_lines;

pub struct GoogleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    reasoning_effort: ReasoningEffort,
}

impl GoogleProvider {
    pub fn new(api_key: String, model: String, system_prompt: String, reasoning_effort: ReasoningEffort) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key,
            model,
            system_prompt,
            reasoning_effort,
        }
    }
}

fn to_gemini_content(msg: &Message) -> Value {
    let role = match msg.role {
        Role::User | Role::Tool => "user",
        Role::Assistant => "model",
    };

    let parts: Vec<Value> = msg
        .parts
        .iter()
        .map(|p| match p {
            Part::Text { text } => json!({"text": text}),
            Part::Image { bytes, media_type } => json!({
                "inlineData": {"mimeType": media_type, "data": bytes},
            }),
            Part::ToolCall { tool_name, input, .. } => json!({
                "functionCall": {"name": tool_name, "args": input},
            }),
            Part::ToolResult { tool_name, output, .. } => json!({
                "functionResponse": {
                    "name": tool_name,
                    "response": {"result": output.as_display_string(), "isError": output.is_error()},
                },
            }),
        })
        .collect();

    json!({"role": role, "parts": parts})
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        cancel: CancellationToken,
    ) -> anyhow::Result<EventStream> {
        let contents: Vec<Value> = messages.iter().map(to_gemini_content).collect();

        let mut body = json!({
            "contents": contents,
            "systemInstruction": {"parts": [{"text": self.system_prompt}]},
            "generationConfig": {
                "temperature": 1.0,
                "thinkingConfig": {"thinkingBudget": self.reasoning_effort.gemini_thinking_budget()},
            },
        });

        if !tools.is_empty() {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = json!([{"functionDeclarations": declarations}]);
        }

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("google returned {}: {}", status, text);
        }

        let lines = data_lines(response);
        let stream = async_stream::stream! {
            futures::pin_mut!(lines);
            let mut call_seq: u32 = 0;

            while let Some(data) = lines.next().await {
                if cancel.is_cancelled() {
                    break;
                }
                let chunk: Value = match serde_json::from_str(&data) {
                    Ok(v) => v,
                    Err(_) => continue,
                };

                if let Some(error) = chunk.get("error") {
                    yield ModelStreamEvent::Error {
                        error_text: error["message"].as_str().unwrap_or("unknown google error").to_string(),
                    };
                    break;
                }

                let candidate = &chunk["candidates"][0];
                if let Some(parts) = candidate["content"]["parts"].as_array() {
                    for part in parts {
                        if let Some(text) = part["text"].as_str() {
                            yield ModelStreamEvent::TextDelta { delta: text.to_string() };
                        }
                        if let Some(fc) = part.get("functionCall") {
                            call_seq += 1;
                            let call_id = format!("gemini-call-{call_seq}");
                            yield ModelStreamEvent::ToolInputAvailable {
                                call_id,
                                tool_name: fc["name"].as_str().unwrap_or_default().to_string(),
                                input: fc["args"].clone(),
                            };
                        }
                    }
                }

                if let Some(usage) = chunk.get("usageMetadata") {
                    if candidate["finishReason"].is_string() {
                        yield ModelStreamEvent::Finish {
                            usage: Usage {
                                input_tokens: usage["promptTokenCount"].as_u64().unwrap_or(0),
                                output_tokens: usage["candidatesTokenCount"].as_u64().unwrap_or(0),
                                reasoning_tokens: usage["thoughtsTokenCount"].as_u64(),
                            },
                        };
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
