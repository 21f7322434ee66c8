// src/reasoning.rs
// Reasoning Loop (C5, §4.5). The heart of the runtime: drives one
// Model Adapter stream per turn, buffers tool calls, dispatches them
// through C3, and appends history — bounded by `MAX_TURNS`, cancellable
// at every suspension point.

use futures::StreamExt;
use tracing::warn;
use uuid::Uuid;

use crate::compactor::Compactor;
use crate::dispatcher::{ToolCall, ToolDispatcher};
use crate::events_writer::UiEventWriter;
use crate::model::{ModelAdapter, ToolSpec};
use crate::protocol::{
    synchronize_tool_call_ids, translate_for_provider, Message, ModelStreamEvent, Part, Role,
    ToolOutput, UiEvent,
};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Done,
    Aborted,
    Error,
}

pub struct ReasoningLoop {
    compactor: Compactor,
    dispatcher: ToolDispatcher,
    max_turns: u32,
}

impl ReasoningLoop {
    pub fn new(compactor: Compactor, dispatcher: ToolDispatcher, max_turns: u32) -> Self {
        Self { compactor, dispatcher, max_turns }
    }

    /// Runs `execute` for one user message against `session`, writing UI
    /// events to `writer` as it goes. `scope` namespaces the local MCP
    /// server's per-conversation browser state (§4.9). `session_is_new`
    /// gates the `<previous_conversation>` envelope (§4.5 turn-0 context
    /// injection).
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        session: &Session,
        user_message: Message,
        writer: UiEventWriter,
        scope: &str,
        browser_context: Option<&str>,
        previous_conversation: Option<&str>,
        session_is_new: bool,
    ) -> TurnOutcome {
        let cancel = session.begin_turn().await;
        let _turn_guard = session.turn_lock.lock().await;

        let augmented = inject_turn_zero_context(
            user_message,
            browser_context,
            previous_conversation,
            session_is_new,
        );
        session.append(augmented).await;

        writer.send(UiEvent::Start);

        let mut turns = 0u32;
        let outcome = loop {
            if cancel.is_cancelled() {
                break TurnOutcome::Aborted;
            }
            if turns >= self.max_turns {
                warn!(conversation_id = %session.id, max_turns = self.max_turns, "reasoning loop hit turn bound");
                break TurnOutcome::Done;
            }
            turns += 1;

            writer.send(UiEvent::StartStep);

            let history = session.history().await;
            let compacted = self.compactor.compact(&history, session.config.context_window);
            let translated = translate_for_provider(&compacted);

            let tool_specs: Vec<ToolSpec> = session
                .mcp_pool
                .catalog()
                .await
                .into_iter()
                .map(|t| ToolSpec { name: t.name, description: t.description, input_schema: t.input_schema })
                .collect();

            let stream = match ModelAdapter::stream(&session.config, &translated, &tool_specs, cancel.clone()).await {
                Ok(stream) => stream,
                Err(e) => {
                    writer.send(UiEvent::Error { error_text: e.to_string() });
                    break TurnOutcome::Error;
                }
            };
            futures::pin_mut!(stream);

            let mut text = String::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();
            let mut assistant_parts: Vec<Part> = Vec::new();
            let mut errored = false;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = stream.next() => {
                        let Some(event) = event else { break };
                        match event {
                            ModelStreamEvent::TextDelta { delta } => {
                                text.push_str(&delta);
                                writer.send(UiEvent::TextDelta { delta });
                            }
                            ModelStreamEvent::ReasoningDelta { delta } => {
                                writer.send(UiEvent::ReasoningDelta { delta });
                            }
                            ModelStreamEvent::ToolInputDelta { call_id, delta } => {
                                writer.send(UiEvent::ToolInputDelta { call_id, input_text_delta: delta });
                            }
                            ModelStreamEvent::ToolInputAvailable { call_id, tool_name, input } => {
                                writer.send(UiEvent::ToolInputStart { call_id: call_id.clone(), tool_name: tool_name.clone() });
                                writer.send(UiEvent::ToolInputAvailable {
                                    call_id: call_id.clone(),
                                    tool_name: tool_name.clone(),
                                    input: input.clone(),
                                });
                                assistant_parts.push(Part::ToolCall { call_id: call_id.clone(), tool_name: tool_name.clone(), input: input.clone() });
                                tool_calls.push(ToolCall { call_id, tool_name, input });
                            }
                            ModelStreamEvent::ToolInputError { call_id, error_text } => {
                                writer.send(UiEvent::ToolInputError { call_id, error_text });
                            }
                            ModelStreamEvent::Finish { .. } => break,
                            ModelStreamEvent::Error { error_text } => {
                                writer.send(UiEvent::Error { error_text });
                                errored = true;
                                break;
                            }
                        }
                    }
                }
            }

            if !text.is_empty() {
                assistant_parts.insert(0, Part::Text { text });
            }

            let mut assistant_msg = Message {
                id: format!("asst-{}", Uuid::new_v4()),
                role: Role::Assistant,
                parts: assistant_parts,
            };

            if errored || cancel.is_cancelled() || tool_calls.is_empty() {
                // No tool message will follow this assistant message this
                // turn, so synchronizing against a one-element slice is
                // enough (it only rewrites the assistant's own empty ids).
                synchronize_tool_call_ids(std::slice::from_mut(&mut assistant_msg));
                session.append(assistant_msg).await;

                if errored {
                    break TurnOutcome::Error;
                }
                if cancel.is_cancelled() {
                    break TurnOutcome::Aborted;
                }
                writer.send(UiEvent::FinishStep);
                break TurnOutcome::Done;
            }

            let outputs = self
                .dispatcher
                .call_all(&session.mcp_pool, session.mode, scope, &tool_calls, &cancel)
                .await;

            let mut tool_parts = Vec::with_capacity(tool_calls.len());
            for (call, output) in tool_calls.iter().zip(outputs.into_iter()) {
                if output.is_error() {
                    writer.send(UiEvent::ToolOutputError {
                        call_id: call.call_id.clone(),
                        error_text: output.as_display_string(),
                    });
                } else {
                    writer.send(UiEvent::ToolOutputAvailable { call_id: call.call_id.clone(), output: output.clone() });
                }
                tool_parts.push(Part::ToolResult { call_id: call.call_id.clone(), tool_name: call.tool_name.clone(), output });
            }
            let tool_msg = Message { id: format!("tool-{}", Uuid::new_v4()), role: Role::Tool, parts: tool_parts };

            // Sync ids over the assistant/tool pair together, *before*
            // either is appended: providers that stream tool calls with no
            // id until finalized (the `openai_compatible` family) can still
            // hand back an empty `callId` here, and only syncing the two
            // messages together lets the tool message's `ToolResult.callId`
            // get rewritten to match the assistant's synthesized key.
            let mut pair = [assistant_msg, tool_msg];
            synchronize_tool_call_ids(&mut pair);
            let [assistant_msg, tool_msg] = pair;

            session.append(assistant_msg).await;
            session.append(tool_msg).await;

            writer.send(UiEvent::FinishStep);
        };

        match outcome {
            TurnOutcome::Done => writer.send(UiEvent::Finish),
            TurnOutcome::Aborted => writer.send(UiEvent::Abort),
            TurnOutcome::Error => {}
        }

        outcome
    }
}

/// §4.5 turn-0 context injection: a human-readable browser-context prelude
/// is always prepended to the first user message of a call; the
/// `<previous_conversation>` envelope is only added when the client sent
/// one *and* this is a brand-new session (so an existing session's own
/// history is already the record of what happened before).
fn inject_turn_zero_context(
    mut message: Message,
    browser_context: Option<&str>,
    previous_conversation: Option<&str>,
    session_is_new: bool,
) -> Message {
    let mut prelude = String::new();

    if let Some(ctx) = browser_context.filter(|c| !c.is_empty()) {
        prelude.push_str(ctx);
        prelude.push_str("\n\n");
    }

    if session_is_new {
        if let Some(prev) = previous_conversation.filter(|p| !p.is_empty()) {
            prelude.push_str("<previous_conversation>\n");
            prelude.push_str(prev);
            prelude.push_str("\n</previous_conversation>\n\n");
        }
    }

    if prelude.is_empty() {
        return message;
    }

    for part in &mut message.parts {
        if let Part::Text { text } = part {
            *text = format!("{prelude}{text}");
            break;
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_zero_injection_noop_without_context_or_history() {
        let msg = Message::user("u1", "hello");
        let out = inject_turn_zero_context(msg, None, None, true);
        match &out.parts[0] {
            Part::Text { text } => assert_eq!(text, "hello"),
            _ => panic!("expected text part"),
        }
    }

    #[test]
    fn turn_zero_injection_prepends_browser_context_regardless_of_session_age() {
        let msg = Message::user("u1", "what's on screen?");
        let out = inject_turn_zero_context(msg, Some("active tab: example.com"), None, false);
        match &out.parts[0] {
            Part::Text { text } => {
                assert!(text.starts_with("active tab: example.com"));
                assert!(text.ends_with("what's on screen?"));
            }
            _ => panic!("expected text part"),
        }
    }

    #[test]
    fn previous_conversation_only_injected_for_new_sessions() {
        let msg = Message::user("u1", "continue");
        let existing = inject_turn_zero_context(msg.clone(), None, Some("blob"), false);
        match &existing.parts[0] {
            Part::Text { text } => assert!(!text.contains("previous_conversation")),
            _ => panic!("expected text part"),
        }

        let fresh = inject_turn_zero_context(msg, None, Some("blob"), true);
        match &fresh.parts[0] {
            Part::Text { text } => {
                assert!(text.contains("<previous_conversation>"));
                assert!(text.contains("blob"));
            }
            _ => panic!("expected text part"),
        }
    }
}
