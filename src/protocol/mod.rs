// src/protocol/mod.rs
// Shared wire and in-memory data model (§3, §4.1, §4.6): the vocabulary
// every other component (model adapter, compactor, reasoning loop, UI
// event writer) speaks.

pub mod events;
pub mod message;

pub use events::{ModelStreamEvent, UiEvent, Usage};
pub use message::{synchronize_tool_call_ids, translate_for_provider, Message, Part, Role, ToolOutput};
