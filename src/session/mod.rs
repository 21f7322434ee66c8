// src/session/mod.rs
// Session Registry (C7, §4.7) and the Conversation/Session it owns (§3,
// §9 "Cyclic Conversation <-> Agent graph" — the Agent lives directly
// inside `Session` rather than holding a back-reference; anything that
// needs the registry again does so by conversation id).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::mcp::{HealthMonitor, McpClientPool, McpServerSpec, ProbeCache};
use crate::model::ProviderConfig;
use crate::protocol::Message;

/// `Conversation.mode` (§3 `[ADD]`): `Chat` permits only the read-only
/// tool surface; `Agent` permits the full tool surface (enforced by the
/// Tool Dispatcher, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Chat,
    Agent,
}

/// A live Conversation (§3): message history, immutable config snapshot,
/// its MCP client pool, and the single in-flight abort channel for
/// whichever turn is currently executing.
pub struct Session {
    pub id: String,
    pub config: ProviderConfig,
    pub mode: Mode,
    pub tenant_id: Option<String>,
    pub is_scheduled_task: bool,
    pub mcp_pool: Arc<McpClientPool>,
    pub messages: RwLock<Vec<Message>>,
    /// Replaced at the start of every turn (§5 "single cancellation token
    /// threads through the whole turn").
    pub cancel: Mutex<CancellationToken>,
    /// Held by the reasoning loop for the duration of `execute()`; `delete`
    /// acquires it after cancelling to know the turn has actually settled
    /// (§4.7 "defer actual disposal until the turn's cancellation has
    /// settled").
    pub turn_lock: Mutex<()>,
    /// The periodic re-list ticker for this Conversation's specs (§4.2),
    /// aborted on disposal. `None` when no spec in this Conversation
    /// re-lists (e.g. no external aggregator was negotiated).
    relist_handle: Option<JoinHandle<()>>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        id: String,
        config: ProviderConfig,
        mode: Mode,
        tenant_id: Option<String>,
        is_scheduled_task: bool,
        probe_cache: Arc<ProbeCache>,
        health: Arc<HealthMonitor>,
        specs: &[McpServerSpec],
        relist_interval: Duration,
    ) -> Arc<Self> {
        let mcp_pool = Arc::new(McpClientPool::new(probe_cache).with_health(health));
        if let Err(e) = mcp_pool.connect(specs).await {
            tracing::warn!(conversation_id = %id, error = %e, "MCP pool connect encountered errors");
        }

        // Only specs whose integration set may change need periodic
        // re-listing (§4.2); skip spawning a ticker with nothing to do.
        let relist_handle = specs
            .iter()
            .any(|s| s.relists())
            .then(|| mcp_pool.spawn_relist_ticker(specs.to_vec(), relist_interval));

        Arc::new(Self {
            id,
            config,
            mode,
            tenant_id,
            is_scheduled_task,
            mcp_pool,
            messages: RwLock::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
            turn_lock: Mutex::new(()),
            relist_handle,
        })
    }

    /// Starts a fresh cancellation token for a new turn, returning it.
    pub async fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().await = token.clone();
        token
    }

    pub async fn history(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    pub async fn append(&self, message: Message) {
        self.messages.write().await.push(message);
    }

    pub async fn append_all(&self, messages: impl IntoIterator<Item = Message>) {
        self.messages.write().await.extend(messages);
    }
}

/// In-memory, process-local map from conversation id to its live Session
/// (C7, §4.7). Concurrent `get_or_create` with the same id yields the
/// *same* session (single-winner semantics via `OnceCell` per slot);
/// concurrent `delete` cancels the in-flight turn and waits for it to
/// settle before disposal.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<OnceCell<Arc<Session>>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()) }
    }

    /// `getOrCreate(config, mcpSpecs) -> (session, isNew)` (§4.7). `init`
    /// runs at most once per id even under concurrent callers.
    pub async fn get_or_create<F, Fut>(&self, id: &str, init: F) -> (Arc<Session>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Arc<Session>>,
    {
        let (cell, is_new) = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(id) {
                Some(cell) => (cell.clone(), false),
                None => {
                    let cell = Arc::new(OnceCell::new());
                    sessions.insert(id.to_string(), cell.clone());
                    (cell, true)
                }
            }
        };
        let session = cell.get_or_init(init).await.clone();
        (session, is_new)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        let cell = self.sessions.lock().await.get(id).cloned()?;
        cell.get().cloned()
    }

    pub async fn has(&self, id: &str) -> bool {
        self.sessions.lock().await.contains_key(id)
    }

    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// `delete(id) -> bool` (§4.7): cancels any in-flight turn, waits for
    /// it to observe cancellation and release `turn_lock`, then closes all
    /// MCP clients. Returns whether the id was found.
    pub async fn delete(&self, id: &str) -> bool {
        let cell = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(id)
        };
        let Some(cell) = cell else { return false };

        if let Some(session) = cell.get() {
            session.cancel.lock().await.cancel();
            let _settle = session.turn_lock.lock().await;
            if let Some(handle) = &session.relist_handle {
                handle.abort();
            }
            session.mcp_pool.close_all().await;
            info!(conversation_id = %id, "session disposed");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Provider, ReasoningEffort};

    fn test_config() -> ProviderConfig {
        ProviderConfig {
            provider: Provider::OpenAI { api_key: "k".into() },
            model: "gpt-5".into(),
            context_window: 128_000,
            reasoning_effort: ReasoningEffort::Medium,
            system_prompt: "sys".into(),
        }
    }

    async fn make_session(id: &str) -> Arc<Session> {
        Session::new(
            id.to_string(),
            test_config(),
            Mode::Agent,
            None,
            false,
            Arc::new(ProbeCache::new(Duration::from_secs(3600))),
            Arc::new(HealthMonitor::new(30_000)),
            &[],
            Duration::from_secs(300),
        )
        .await
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_for_unknown_id() {
        let registry = SessionRegistry::new();
        let (s1, new1) = registry.get_or_create("c1", || make_session("c1")).await;
        let (s2, new2) = registry.get_or_create("c1", || make_session("c1")).await;
        assert!(new1);
        assert!(!new2);
        assert!(Arc::ptr_eq(&s1, &s2));
    }

    #[tokio::test]
    async fn concurrent_get_or_create_single_winner() {
        let registry = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.get_or_create("shared", || make_session("shared")).await.0
            }));
        }
        let mut sessions = Vec::new();
        for h in handles {
            sessions.push(h.await.unwrap());
        }
        for s in &sessions[1..] {
            assert!(Arc::ptr_eq(&sessions[0], s));
        }
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn delete_unknown_id_returns_false() {
        let registry = SessionRegistry::new();
        assert!(!registry.delete("missing").await);
    }

    #[tokio::test]
    async fn delete_cancels_and_removes() {
        let registry = SessionRegistry::new();
        let (session, _) = registry.get_or_create("c1", || make_session("c1")).await;
        let token = session.begin_turn().await;
        assert!(registry.delete("c1").await);
        assert!(token.is_cancelled());
        assert!(!registry.has("c1").await);
    }
}
