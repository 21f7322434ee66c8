// src/rate_limit.rs
// Rate Limiter (C8, §4.8). Only meaningful for requests targeting the
// managed-gateway provider: a daily, per-tenant cap backed by a small
// sqlite table, migrated on boot (grounded in the teacher's
// `sqlx::SqlitePool` + migrate-on-boot convention).

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::RateLimitConfig;
use crate::error::AgentError;

pub struct RateLimiter {
    pool: SqlitePool,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Connects (creating the file if needed) and runs the table-create
    /// migration. `daily_limit` should be the value fetched from the
    /// catalog service at startup, already falling back to
    /// `config.daily_limit_default` if that call failed.
    pub async fn connect(database_url: &str, max_connections: u32, config: RateLimitConfig) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rate_limit_records (
                conversation_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool, config })
    }

    #[cfg(test)]
    async fn in_memory(config: RateLimitConfig) -> anyhow::Result<Self> {
        Self::connect("sqlite::memory:", 1, config).await
    }

    /// `check(tenantId)` (§4.8): errors with `RateLimitExceeded` if today's
    /// count (calendar day, server-local) is already at or above the daily
    /// limit. Dev/test environments bypass entirely.
    pub async fn check(&self, tenant_id: &str, limit: u32) -> Result<(), AgentError> {
        if self.config.bypass {
            return Ok(());
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rate_limit_records
             WHERE tenant_id = ? AND substr(created_at, 1, 10) = ?",
        )
        .bind(tenant_id)
        .bind(&today)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AgentError::Internal(e.into()))?;

        let count = count as u32;
        if count >= limit {
            return Err(AgentError::RateLimitExceeded { count, limit });
        }
        Ok(())
    }

    /// `record({conversationId, tenantId, provider})` (§4.8): insert-or-
    /// ignore keyed on `conversationId` so repeated turns within one
    /// conversation count exactly once.
    pub async fn record(&self, conversation_id: &str, tenant_id: &str, provider: &str) -> Result<(), AgentError> {
        if self.config.bypass {
            return Ok(());
        }

        sqlx::query(
            "INSERT OR IGNORE INTO rate_limit_records (conversation_id, tenant_id, provider, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(tenant_id)
        .bind(provider)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::Internal(e.into()))?;

        Ok(())
    }

    pub fn daily_limit_default(&self) -> u32 {
        self.config.daily_limit_default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(bypass: bool) -> RateLimitConfig {
        RateLimitConfig { daily_limit_default: 3, bypass }
    }

    #[tokio::test]
    async fn bypass_never_rejects() {
        let limiter = RateLimiter::in_memory(cfg(true)).await.unwrap();
        for _ in 0..10 {
            assert!(limiter.check("tenant-a", 3).await.is_ok());
        }
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::in_memory(cfg(false)).await.unwrap();
        for i in 0..3 {
            limiter.check("tenant-a", 3).await.unwrap();
            limiter.record(&format!("conv-{i}"), "tenant-a", "managed").await.unwrap();
        }
        let result = limiter.check("tenant-a", 3).await;
        match result {
            Err(AgentError::RateLimitExceeded { count, limit }) => {
                assert_eq!(count, 3);
                assert_eq!(limit, 3);
            }
            other => panic!("expected RateLimitExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn record_is_insert_or_ignore_and_does_not_roll_back_on_repeat() {
        let limiter = RateLimiter::in_memory(cfg(false)).await.unwrap();
        for i in 0..3 {
            limiter.check("tenant-a", 3).await.unwrap();
            limiter.record(&format!("conv-{i}"), "tenant-a", "managed").await.unwrap();
        }
        // Reusing conversation id "conv-0" must not add a second record.
        limiter.record("conv-0", "tenant-a", "managed").await.unwrap();
        let result = limiter.check("tenant-a", 3).await;
        assert!(matches!(result, Err(AgentError::RateLimitExceeded { count: 3, limit: 3 })));
    }

    #[tokio::test]
    async fn distinct_tenants_are_isolated() {
        let limiter = RateLimiter::in_memory(cfg(false)).await.unwrap();
        limiter.check("tenant-a", 1).await.unwrap();
        limiter.record("conv-a", "tenant-a", "managed").await.unwrap();
        assert!(limiter.check("tenant-b", 1).await.is_ok());
    }
}
