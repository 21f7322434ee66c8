// src/error.rs
// Error taxonomy (§7). Tool-layer and model-stream-layer kinds never cross
// the HTTP boundary directly — they only ever reach the client as SSE
// events (see events_writer::UiEvent). Only the kinds below implement
// `IntoResponse`, for the request-scoped failures in §6's HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("provider config error: {0}")]
    ProviderConfig(String),

    #[error("rate limit exceeded: {count}/{limit}")]
    RateLimitExceeded { count: u32, limit: u32 },

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let (status, name, code) = match &self {
            AgentError::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError", "validation_error"),
            AgentError::ProviderConfig(_) => {
                (StatusCode::BAD_REQUEST, "ProviderConfigError", "provider_config_error")
            }
            AgentError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RateLimitExceeded", "rate_limit_exceeded")
            }
            AgentError::NotFound => (StatusCode::NOT_FOUND, "NotFound", "not_found"),
            AgentError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "internal_error")
            }
        };

        let mut body = serde_json::json!({
            "error": {
                "name": name,
                "message": self.to_string(),
                "code": code,
                "statusCode": status.as_u16(),
            }
        });

        if let AgentError::RateLimitExceeded { count, limit } = &self {
            body["count"] = serde_json::json!(count);
            body["limit"] = serde_json::json!(limit);
        }

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
