// src/model/provider.rs
// Universal LLM provider interface (§4.1), generalized from the teacher's
// per-provider `LlmProvider` trait (one `chat`/`chat_with_tools`/`stream`
// trio per provider struct) into a single streaming operation: the target
// spec has no non-streaming chat path, only `stream`.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::protocol::{Message, ModelStreamEvent};

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

pub type EventStream = std::pin::Pin<Box<dyn futures::Stream<Item = ModelStreamEvent> + Send>>;

/// One operation: `stream`. Implementations own client construction,
/// message translation to native form, and native-stream-to-`ModelStreamEvent`
/// translation (§4.1).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begin a turn. `messages` has already passed through
    /// `translate_for_provider` and the Compactor. Connection-time failures
    /// (bad credentials, unreachable host) are returned as `Err`; once the
    /// stream has started, every failure becomes a terminal
    /// `ModelStreamEvent::Error` instead, per §4.1's "finite sequence
    /// terminated by finish or error."
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        cancel: CancellationToken,
    ) -> anyhow::Result<EventStream>;
}
