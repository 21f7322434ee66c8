// src/protocol/events.rs
// C1 model-stream events and C6 UI wire events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::ToolOutput;

/// Events yielded by `ModelAdapter::stream` (§4.1). A finite sequence
/// terminated by `Finish` or `Error`.
#[derive(Debug, Clone)]
pub enum ModelStreamEvent {
    TextDelta { delta: String },
    ReasoningDelta { delta: String },
    ToolInputDelta { call_id: String, delta: String },
    ToolInputAvailable { call_id: String, tool_name: String, input: Value },
    ToolInputError { call_id: String, error_text: String },
    Finish { usage: Usage },
    Error { error_text: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

/// The SSE wire schema (§4.6). Tagged sum, one JSON object per `data: ...`
/// line. `[DONE]` is a literal terminator, not a variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiEvent {
    Start,
    StartStep,
    FinishStep,
    Finish,
    Abort,
    TextDelta { delta: String },
    ReasoningDelta { delta: String },
    ToolInputStart {
        #[serde(rename = "callId")]
        call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    ToolInputDelta {
        #[serde(rename = "callId")]
        call_id: String,
        #[serde(rename = "inputTextDelta")]
        input_text_delta: String,
    },
    ToolInputAvailable {
        #[serde(rename = "callId")]
        call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },
    ToolOutputAvailable {
        #[serde(rename = "callId")]
        call_id: String,
        output: ToolOutput,
    },
    ToolInputError {
        #[serde(rename = "callId")]
        call_id: String,
        #[serde(rename = "errorText")]
        error_text: String,
    },
    ToolOutputError {
        #[serde(rename = "callId")]
        call_id: String,
        #[serde(rename = "errorText")]
        error_text: String,
    },
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
}

impl UiEvent {
    /// Render as the SSE wire frame: `data: <json>\n\n`.
    pub fn to_frame(&self) -> String {
        format!("data: {}\n\n", serde_json::to_string(self).unwrap_or_default())
    }

    pub const DONE_FRAME: &'static str = "data: [DONE]\n\n";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_serialization_roundtrip() {
        let ev = UiEvent::TextDelta { delta: "hi".into() };
        let frame = ev.to_frame();
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains("\"type\":\"text-delta\""));
    }

    #[test]
    fn done_frame_is_literal() {
        assert_eq!(UiEvent::DONE_FRAME, "data: [DONE]\n\n");
    }
}
