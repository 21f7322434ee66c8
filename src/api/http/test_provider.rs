// src/api/http/test_provider.rs
// `POST /test-provider` (§6): a one-shot credential-shape probe. Reuses
// `ModelAdapter::build`'s validation without opening a stream, so a
// misconfigured client gets a fast 400 instead of discovering the problem
// mid-turn.

use axum::Json;
use serde::Serialize;

use crate::error::Result;
use crate::model::{ModelAdapter, ProviderConfig};

#[derive(Debug, Serialize)]
pub struct TestProviderResponse {
    pub ok: bool,
    pub provider: String,
}

pub async fn test_provider(Json(config): Json<ProviderConfig>) -> Result<Json<TestProviderResponse>> {
    let provider = config.provider.name().to_string();
    ModelAdapter::build(&config)?;
    Ok(Json(TestProviderResponse { ok: true, provider }))
}
