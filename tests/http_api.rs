// tests/http_api.rs
// Cross-module integration coverage for the HTTP surface (§6): router
// wiring, request validation, and the rate-limit gate end to end against
// an in-memory sqlite pool. Unit-level coverage for each component lives
// inline per module (compactor, dispatcher, reasoning, session, pool,
// local_server); this file exercises them wired together through
// `api::http::build_router`, matching the teacher's own `backend/tests/`
// placement for cross-module coverage.

use std::sync::Arc;

use http_body_util::BodyExt;
use pilot_agent::config::{
    AppConfig, CapabilityConfig, CompactorConfig, DatabaseConfig, LoggingConfig, McpConfig,
    RateLimitConfig, ReasoningConfig, ServerConfig,
};
use pilot_agent::state::AppState;
use serde_json::json;
use tower::ServiceExt;

fn test_config(daily_limit: u32, bypass: bool) -> &'static AppConfig {
    let config = AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 8787,
            execution_dir: "./sessions".into(),
            mcp_allow_remote: false,
        },
        database: DatabaseConfig { url: "sqlite::memory:".into(), max_connections: 1 },
        logging: LoggingConfig { level: "error".into() },
        rate_limit: RateLimitConfig { daily_limit_default: daily_limit, bypass },
        mcp: McpConfig {
            probe_cache_ttl_secs: 3600,
            default_tool_timeout_secs: 1,
            browser_state_ttl_secs: 1800,
            browser_state_sweep_interval_secs: 300,
            relist_interval_secs: 300,
        },
        compactor: CompactorConfig { truncate_chars: 15_000, compaction_threshold: 0.6, chars_per_token: 4 },
        reasoning: ReasoningConfig { max_turns: 48 },
        capabilities: CapabilityConfig { catalog_service_url: None, analytics_key: None, error_reporting_dsn: None },
    };
    Box::leak(Box::new(config))
}

async fn build_app(daily_limit: u32, bypass: bool) -> axum::Router {
    let config = test_config(daily_limit, bypass);
    let state = AppState::new(config).await.expect("state construction");
    pilot_agent::api::http::build_router(Arc::new(state))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

#[tokio::test]
async fn health_check_reports_ok() {
    let app = build_app(50, true).await;
    let response = app
        .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn status_reports_zero_conversations_initially() {
    let app = build_app(50, true).await;
    let response = app
        .oneshot(axum::http::Request::builder().uri("/status").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["activeConversations"], 0);
    assert_eq!(body["bridgeConnected"], false);
}

#[tokio::test]
async fn delete_unknown_conversation_is_404() {
    let app = build_app(50, true).await;
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("DELETE")
                .uri("/chat/does-not-exist")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_rejects_empty_message_with_validation_error() {
    let app = build_app(50, true).await;
    let payload = json!({
        "conversationId": "c1",
        "message": "",
        "config": {"provider": "openai", "api_key": "k", "model": "gpt-5", "context_window": 128000, "system_prompt": "sys"},
        "mode": "agent",
    });
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/chat")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["name"], "ValidationError");
}

#[tokio::test]
async fn test_provider_endpoint_rejects_missing_credentials() {
    let app = build_app(50, true).await;
    let payload = json!({"provider": "openai", "api_key": "", "model": "gpt-5", "context_window": 128000, "system_prompt": "sys"});
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/test-provider")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_provider_endpoint_accepts_valid_shape() {
    let app = build_app(50, true).await;
    let payload = json!({"provider": "openai", "api_key": "k", "model": "gpt-5", "context_window": 128000, "system_prompt": "sys"});
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/test-provider")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["provider"], "openai");
}

#[tokio::test]
async fn shutdown_endpoint_cancels_shutdown_token() {
    let app = build_app(50, true).await;
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/shutdown")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

/// Rate-limit gate (§8 scenario 6): managed-provider requests count once
/// per conversation id; the fourth distinct conversation over the daily
/// cap gets a 429, and reusing an earlier conversation id never rolls the
/// count back.
#[tokio::test]
async fn managed_provider_chat_enforces_daily_cap_without_bypass() {
    let app = build_app(3, false).await;

    let managed_config = json!({
        "provider": "managed",
        "api_key": "k",
        "gateway_url": "https://gw.example",
        "upstream": "anthropic",
        "model": "claude",
        "context_window": 128000,
        "system_prompt": "sys",
    });

    for i in 0..3 {
        let payload = json!({
            "conversationId": format!("conv-{i}"),
            "message": "hello",
            "config": managed_config,
            "mode": "agent",
            "tenantId": "tenant-a",
        });
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/chat")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        // The turn itself runs async against an unreachable gateway host
        // and will error out internally, but the SSE handshake (which is
        // all the rate limiter gates) must succeed.
        assert_eq!(response.status(), axum::http::StatusCode::OK, "conversation {i} should pass the rate gate");
    }

    let payload = json!({
        "conversationId": "conv-3",
        "message": "hello",
        "config": managed_config,
        "mode": "agent",
        "tenantId": "tenant-a",
    });
    let response = app
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/chat")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["count"], 3);
    assert_eq!(body["limit"], 3);

    // Reusing conversation id "conv-0" must still fail: record is
    // insert-or-ignore, the count does not roll back.
    let payload = json!({
        "conversationId": "conv-0",
        "message": "hello again",
        "config": managed_config,
        "mode": "agent",
        "tenantId": "tenant-a",
    });
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/chat")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn managed_provider_chat_requires_tenant_id() {
    let app = build_app(50, false).await;
    let payload = json!({
        "conversationId": "conv-x",
        "message": "hello",
        "config": {
            "provider": "managed",
            "api_key": "k",
            "gateway_url": "https://gw.example",
            "upstream": "anthropic",
            "model": "claude",
            "context_window": 128000,
            "system_prompt": "sys",
        },
        "mode": "agent",
    });
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/chat")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}
