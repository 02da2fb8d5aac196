//! Redis access for the session backend
//!
//! One auto-reconnecting multiplexed connection is shared by every clone of
//! [`RedisPool`]. Keys are namespaced with the configured prefix.

use std::fmt::Display;

use redis::{AsyncCommands, Client, RedisResult, Script, aio::ConnectionManager};
use tracing::info;

/// Swap the value only while it still equals the expected one.
const COMPARE_AND_SET: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return 1
end
return 0
"#;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Namespace prepended to every key
    pub key_prefix: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    /// - `REDIS_KEY_PREFIX`: Key namespace (default: "session")
    pub fn from_env() -> anyhow::Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let key_prefix = std::env::var("REDIS_KEY_PREFIX")
            .ok()
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or_else(|| "session".to_string());

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            anyhow::bail!("REDIS_URL must use the redis:// or rediss:// scheme");
        }

        Ok(RedisConfig { url, key_prefix })
    }
}

/// Shared Redis connection
#[derive(Clone)]
pub struct RedisPool {
    manager: ConnectionManager,
    key_prefix: String,
}

impl RedisPool {
    /// Open the shared connection
    pub async fn new(config: &RedisConfig) -> RedisResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        info!("Connected to Redis, key prefix '{}'", config.key_prefix);

        Ok(RedisPool {
            manager,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// `{prefix}:{id}`
    pub fn key(&self, id: impl Display) -> String {
        namespaced(&self.key_prefix, id)
    }

    pub async fn fetch(&self, key: &str) -> RedisResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key).await
    }

    /// Overwrite `key`, expiring after `ttl_seconds`
    pub async fn store(&self, key: &str, value: &str, ttl_seconds: u64) -> RedisResult<()> {
        let mut conn = self.manager.clone();
        conn.set_ex(key, value, ttl_seconds).await
    }

    pub async fn remove(&self, key: &str) -> RedisResult<()> {
        let mut conn = self.manager.clone();
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    /// Replace `key` with `value` only if it currently holds `expected`.
    ///
    /// Runs as a single server-side script, so concurrent callers racing on
    /// the same expected value see exactly one success.
    pub async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> RedisResult<bool> {
        let mut conn = self.manager.clone();
        let swapped: i32 = Script::new(COMPARE_AND_SET)
            .key(key)
            .arg(expected)
            .arg(value)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> RedisResult<bool> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

fn namespaced(prefix: &str, id: impl Display) -> String {
    format!("{}:{}", prefix, id)
}
