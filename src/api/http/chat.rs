// src/api/http/chat.rs
// `POST /chat` (§6): opens or continues a Conversation and streams UI
// events over SSE for the duration of one turn. The turn itself runs on a
// spawned task; this handler only wires the UiEventWriter channel through
// to the SSE response body (grounded in the teacher's
// `web/chat/stream.rs` channel-to-`Sse` pattern).

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::events_writer::UiEventWriter;
use crate::mcp::McpServerSpec;
use crate::model::ProviderConfig;
use crate::protocol::Message;
use crate::session::{Mode, Session};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub message: String,
    pub config: ProviderConfig,
    pub mode: Mode,
    #[serde(rename = "isScheduledTask", default)]
    pub is_scheduled_task: bool,
    #[serde(rename = "browserContext")]
    pub browser_context: Option<String>,
    #[serde(rename = "previousConversation")]
    pub previous_conversation: Option<String>,
    #[serde(rename = "tenantId")]
    pub tenant_id: Option<String>,
    #[serde(rename = "customMcpUrls", default)]
    pub custom_mcp_urls: Vec<String>,
    #[serde(rename = "externalAggregatorUrl")]
    pub external_aggregator_url: Option<String>,
}

#[instrument(skip(state, req), fields(conversation_id = %req.conversation_id, is_scheduled_task = req.is_scheduled_task))]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<axum::response::Response> {
    if req.message.trim().is_empty() {
        return Err(AgentError::Validation("message must not be empty".into()));
    }
    if req.conversation_id.trim().is_empty() {
        return Err(AgentError::Validation("conversationId must not be empty".into()));
    }

    // Managed-gateway requests are the only ones subject to the daily
    // per-tenant cap (§4.8); every other provider skips the limiter.
    if req.config.provider.is_managed() {
        let tenant_id = req.tenant_id.clone().ok_or_else(|| {
            AgentError::Validation("tenantId is required when provider is managed".into())
        })?;
        let limit = state.rate_limiter.daily_limit_default();
        state.rate_limiter.check(&tenant_id, limit).await?;
        state
            .rate_limiter
            .record(&req.conversation_id, &tenant_id, req.config.provider.name())
            .await?;
    }

    let mut specs = vec![McpServerSpec::Local { url: state.local_mcp_url() }];
    if let Some(url) = req.external_aggregator_url.clone() {
        specs.push(McpServerSpec::ExternalAggregator { url });
    }
    specs.extend(req.custom_mcp_urls.iter().cloned().map(|url| McpServerSpec::Custom { url }));

    let conversation_id = req.conversation_id.clone();
    let init_id = conversation_id.clone();
    let config = req.config.clone();
    let mode = req.mode;
    let tenant_id = req.tenant_id.clone();
    let is_scheduled_task = req.is_scheduled_task;
    let probe_cache = state.probe_cache.clone();
    let health = state.mcp_health.clone();
    let relist_interval = std::time::Duration::from_secs(state.config.mcp.relist_interval_secs);

    let (session, is_new) = state
        .sessions
        .get_or_create(&conversation_id, || async move {
            Session::new(
                init_id,
                config,
                mode,
                tenant_id,
                is_scheduled_task,
                probe_cache,
                health,
                &specs,
                relist_interval,
            )
            .await
        })
        .await;

    let user_message = Message::user(format!("msg-{}", Uuid::new_v4()), req.message.clone());
    let (writer, mut rx) = UiEventWriter::new();

    let reasoning = state.reasoning.clone();
    let scope = conversation_id.clone();
    let browser_context = req.browser_context.clone();
    // Scheduled-task conversations have no prior UI turn to resume, so the
    // `<previous_conversation>` envelope never applies to them (SPEC_FULL
    // §3 `[ADD]`), regardless of whether the client still sent a blob.
    let previous_conversation = if req.is_scheduled_task { None } else { req.previous_conversation.clone() };

    tokio::spawn(async move {
        reasoning
            .execute(
                &session,
                user_message,
                writer,
                &scope,
                browser_context.as_deref(),
                previous_conversation.as_deref(),
                is_new,
            )
            .await;
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok::<_, std::convert::Infallible>(Event::default().data(data));
        }
        yield Ok::<_, std::convert::Infallible>(Event::default().data("[DONE]"));
    };

    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    // §4.6/§6: an implementation-defined marker alongside the standard SSE
    // headers, signalling this stream follows the v1 UI-message schema.
    response
        .headers_mut()
        .insert("x-agent-ui-message-stream", HeaderValue::from_static("v1"));
    Ok(response)
}
