// src/protocol/message.rs
// Conversation data model (§3): Message, Part, and the invariant-enforcing
// passes the Model Adapter runs before handing a transcript to a provider
// (§4.1 "Message translation rules", §9 "Id synchronization").

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Sum type for message content. Serialized with an explicit `type` tag
/// (§9 "avoid stringly-typed discriminators in-memory ... serialize with
/// an explicit type tag").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text {
        text: String,
    },
    Image {
        bytes: String, // base64
        #[serde(rename = "mediaType")]
        media_type: String,
    },
    /// Assistant-only.
    ToolCall {
        #[serde(rename = "callId")]
        call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },
    /// Tool-message-only.
    ToolResult {
        #[serde(rename = "callId")]
        call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        output: ToolOutput,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ToolOutput {
    Text { value: String },
    Json { value: Value },
    ErrorText { value: String },
    ErrorJson { value: Value },
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::ErrorText { .. } | ToolOutput::ErrorJson { .. })
    }

    /// Serialized textual form, used by the Compactor's truncation step.
    pub fn as_display_string(&self) -> String {
        match self {
            ToolOutput::Text { value } | ToolOutput::ErrorText { value } => value.clone(),
            ToolOutput::Json { value } | ToolOutput::ErrorJson { value } => {
                serde_json::to_string(value).unwrap_or_default()
            }
        }
    }
}

impl Message {
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn assistant_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolCall { call_id, tool_name, .. } => Some((call_id.as_str(), tool_name.as_str())),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolResult { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
    }

    pub fn is_tool_message(&self) -> bool {
        self.role == Role::Tool
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ToolCall { .. }))
    }
}

/// Run the full message-translation pass required before submitting a
/// transcript to a provider (§4.1, §8 "Pairing"/"Adjacency" invariants):
///
/// 1. Merge consecutive tool messages into one.
/// 2. Drop any assistant `ToolCall` with no matching `ToolResult` in the
///    immediately following tool message (orphaned calls).
/// 3. Drop any `ToolResult` with no matching call.
/// 4. Two-pass id synchronization (exact-id, then by-tool-name-and-order)
///    so providers that invent their own tool-call ids still see matching
///    ids on both sides.
pub fn translate_for_provider(messages: &[Message]) -> Vec<Message> {
    let merged = merge_consecutive_tool_messages(messages);
    pair_tool_calls_and_results(&merged)
}

fn merge_consecutive_tool_messages(messages: &[Message]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    for msg in messages {
        if msg.is_tool_message() {
            if let Some(last) = out.last_mut() {
                if last.is_tool_message() {
                    last.parts.extend(msg.parts.clone());
                    continue;
                }
            }
        }
        out.push(msg.clone());
    }
    out
}

/// Drops orphaned tool calls/results. A call is "paired" only if the
/// assistant message's `ToolCall` has a matching `ToolResult` with the same
/// `callId` in the immediately following tool message.
fn pair_tool_calls_and_results(messages: &[Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    let mut i = 0;
    while i < messages.len() {
        let msg = &messages[i];

        if msg.role == Role::Assistant && msg.has_tool_calls() {
            let call_ids: Vec<&str> = msg.tool_calls().map(|(id, _)| id).collect();
            let next_tool_results: std::collections::HashSet<&str> = messages
                .get(i + 1)
                .filter(|m| m.is_tool_message())
                .map(|m| m.tool_results().collect())
                .unwrap_or_default();

            let kept_parts: Vec<Part> = msg
                .parts
                .iter()
                .filter(|p| match p {
                    Part::ToolCall { call_id, .. } => next_tool_results.contains(call_id.as_str()),
                    _ => true,
                })
                .cloned()
                .collect();

            let mut assistant_msg = msg.clone();
            assistant_msg.parts = kept_parts;
            out.push(assistant_msg);

            if let Some(tool_msg) = messages.get(i + 1).filter(|m| m.is_tool_message()) {
                let kept_call_ids: std::collections::HashSet<&str> = call_ids
                    .iter()
                    .filter(|id| next_tool_results.contains(**id))
                    .copied()
                    .collect();
                let mut pruned = tool_msg.clone();
                pruned.parts = pruned
                    .parts
                    .into_iter()
                    .filter(|p| match p {
                        Part::ToolResult { call_id, .. } => kept_call_ids.contains(call_id.as_str()),
                        _ => true,
                    })
                    .collect();
                out.push(pruned);
                i += 2;
                continue;
            }
            i += 1;
            continue;
        }

        if msg.is_tool_message() {
            // A tool message with no preceding assistant tool-call message
            // (can happen after a sliding-window drop) is dropped entirely.
            i += 1;
            continue;
        }

        out.push(msg.clone());
        i += 1;
    }
    out
}

/// Two-pass id synchronization (§9): some providers invent their own
/// tool-call ids on the way back; this rewrites the assistant/tool pair's
/// ids to a shared synthetic id when the source ids don't already match,
/// falling back to matching by `(toolName, occurrence-index)` when a
/// provider supplied no id at all (`__empty_*` placeholder keys).
pub fn synchronize_tool_call_ids(messages: &mut [Message]) {
    for i in 0..messages.len() {
        if messages[i].role != Role::Assistant || !messages[i].has_tool_calls() {
            continue;
        }
        let assigned: Vec<(String, String, String)> = messages[i]
            .tool_calls()
            .enumerate()
            .map(|(idx, (id, name))| {
                let key = if id.is_empty() {
                    format!("__empty_{name}_{idx}")
                } else {
                    id.to_string()
                };
                (id.to_string(), name.to_string(), key)
            })
            .collect();

        if let Some(tool_msg) = messages.get_mut(i + 1).filter(|m| m.is_tool_message()) {
            for part in &mut tool_msg.parts {
                if let Part::ToolResult { call_id, tool_name, .. } = part {
                    if let Some((_orig, _name, key)) = assigned
                        .iter()
                        .find(|(orig_id, _, _)| orig_id == call_id)
                        .or_else(|| assigned.iter().find(|(_, name, _)| name == tool_name))
                    {
                        *call_id = key.clone();
                    }
                }
            }
        }

        for part in &mut messages[i].parts {
            if let Part::ToolCall { call_id, .. } = part {
                if let Some((orig, _, key)) = assigned.iter().find(|(o, _, _)| o == call_id) {
                    if orig.is_empty() {
                        *call_id = key.clone();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_call_msg(id: &str, call_id: &str) -> Message {
        Message {
            id: id.to_string(),
            role: Role::Assistant,
            parts: vec![Part::ToolCall {
                call_id: call_id.to_string(),
                tool_name: "nav".into(),
                input: json!({}),
            }],
        }
    }

    fn tool_result_msg(id: &str, call_id: &str) -> Message {
        Message {
            id: id.to_string(),
            role: Role::Tool,
            parts: vec![Part::ToolResult {
                call_id: call_id.to_string(),
                tool_name: "nav".into(),
                output: ToolOutput::Text { value: "ok".into() },
            }],
        }
    }

    #[test]
    fn drops_orphaned_tool_call() {
        let messages = vec![
            Message::user("u1", "hi"),
            tool_call_msg("a1", "c1"),
            Message::assistant_text("a2", "done"),
        ];
        let out = translate_for_provider(&messages);
        assert!(!out[1].has_tool_calls());
    }

    #[test]
    fn keeps_paired_call_and_result() {
        let messages = vec![
            Message::user("u1", "hi"),
            tool_call_msg("a1", "c1"),
            tool_result_msg("t1", "c1"),
            Message::assistant_text("a2", "done"),
        ];
        let out = translate_for_provider(&messages);
        assert!(out[1].has_tool_calls());
        assert_eq!(out[2].tool_results().count(), 1);
    }

    #[test]
    fn merges_consecutive_tool_messages() {
        let messages = vec![
            tool_call_msg("a1", "c1"),
            tool_result_msg("t1", "c1"),
            tool_result_msg("t2", "c2"),
        ];
        let out = merge_consecutive_tool_messages(&messages);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn drops_result_with_no_matching_call() {
        let messages = vec![
            Message::user("u1", "hi"),
            tool_result_msg("t1", "c1"),
            Message::assistant_text("a2", "done"),
        ];
        let out = translate_for_provider(&messages);
        assert!(out.iter().all(|m| m.role != Role::Tool));
    }
}
