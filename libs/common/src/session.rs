//! Session store: the single currently valid refresh token per user
//!
//! There is one slot per user, not a set of sessions. Issuing a new refresh
//! token overwrites the slot, and rotation goes through
//! [`SessionStore::compare_and_swap`] so that two refreshes racing on the same
//! stale token cannot both succeed.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{cache::RedisPool, error::StoreResult};

/// Storage for the single active refresh token of each user
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The stored refresh token, if any
    async fn current(&self, user_id: Uuid) -> StoreResult<Option<String>>;

    /// Unconditionally store `token`, superseding any previous value
    async fn replace(&self, user_id: Uuid, token: &str) -> StoreResult<()>;

    /// Store `next` only if the slot still holds `expected`.
    ///
    /// Returns `false` when the slot held anything else (including nothing).
    async fn compare_and_swap(&self, user_id: Uuid, expected: &str, next: &str)
    -> StoreResult<bool>;

    /// Clear the slot. Idempotent.
    async fn clear(&self, user_id: Uuid) -> StoreResult<()>;
}

/// Which backend holds the refresh token slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    /// `users.refresh_token` column
    Postgres,
    /// `{prefix}:{user_id}` keys with a TTL
    Redis,
}

impl SessionBackend {
    /// Read `SESSION_BACKEND` (`postgres` or `redis`, default `postgres`)
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var("SESSION_BACKEND") {
            Err(_) => Ok(SessionBackend::Postgres),
            Ok(value) => match value.to_ascii_lowercase().as_str() {
                "postgres" | "" => Ok(SessionBackend::Postgres),
                "redis" => Ok(SessionBackend::Redis),
                other => anyhow::bail!("Unknown SESSION_BACKEND: {}", other),
            },
        }
    }
}

/// Refresh token slot stored on the user row
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn current(&self, user_id: Uuid) -> StoreResult<Option<String>> {
        let token: Option<Option<String>> =
            sqlx::query_scalar("SELECT refresh_token FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(token.flatten())
    }

    async fn replace(&self, user_id: Uuid, token: &str) -> StoreResult<()> {
        info!("Storing refresh token for user: {}", user_id);

        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn compare_and_swap(
        &self,
        user_id: Uuid,
        expected: &str,
        next: &str,
    ) -> StoreResult<bool> {
        // single statement: the row lock serializes racing updates and the
        // loser re-evaluates the predicate against the winner's value
        let result = sqlx::query(
            r#"
            UPDATE users SET refresh_token = $3, updated_at = NOW()
            WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(user_id)
        .bind(expected)
        .bind(next)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear(&self, user_id: Uuid) -> StoreResult<()> {
        info!("Clearing refresh token for user: {}", user_id);

        sqlx::query("UPDATE users SET refresh_token = NULL, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Refresh token slot stored in Redis, expiring with the token
#[derive(Clone)]
pub struct RedisSessionStore {
    redis_pool: RedisPool,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(redis_pool: RedisPool, ttl_seconds: u64) -> Self {
        Self {
            redis_pool,
            ttl_seconds,
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn current(&self, user_id: Uuid) -> StoreResult<Option<String>> {
        Ok(self.redis_pool.fetch(&self.redis_pool.key(user_id)).await?)
    }

    async fn replace(&self, user_id: Uuid, token: &str) -> StoreResult<()> {
        info!("Storing refresh token for user: {}", user_id);

        self.redis_pool
            .store(&self.redis_pool.key(user_id), token, self.ttl_seconds)
            .await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        user_id: Uuid,
        expected: &str,
        next: &str,
    ) -> StoreResult<bool> {
        Ok(self
            .redis_pool
            .compare_and_set(&self.redis_pool.key(user_id), expected, next, self.ttl_seconds)
            .await?)
    }

    async fn clear(&self, user_id: Uuid) -> StoreResult<()> {
        info!("Clearing refresh token for user: {}", user_id);

        self.redis_pool.remove(&self.redis_pool.key(user_id)).await?;
        Ok(())
    }
}
