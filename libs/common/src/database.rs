//! PostgreSQL pool for the account stores
//!
//! Both services connect through [`init_pool`]. Only the auth service applies
//! migrations at startup; the api service expects the schema to be present.

use std::{env, time::Duration};

use crate::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

/// Database configuration struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// How long a request waits for a free connection
    pub acquire_timeout: Duration,
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> DatabaseResult<T> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| DatabaseError::Configuration(format!("{} is not a number: {}", name, raw))),
    }
}

impl DatabaseConfig {
    /// Create a new DatabaseConfig from environment variables
    ///
    /// # Environment Variables
    /// - `DATABASE_URL`: PostgreSQL connection URL (required)
    /// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 5)
    /// - `DATABASE_ACQUIRE_TIMEOUT`: Seconds to wait for a connection (default: 5)
    pub fn from_env() -> DatabaseResult<Self> {
        let database_url = env::var("DATABASE_URL").map_err(|_| {
            DatabaseError::Configuration("DATABASE_URL environment variable not set".to_string())
        })?;

        let max_connections = parsed("DATABASE_MAX_CONNECTIONS", 5u32)?;
        if max_connections == 0 {
            return Err(DatabaseError::Configuration(
                "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        let acquire_timeout = Duration::from_secs(parsed("DATABASE_ACQUIRE_TIMEOUT", 5u64)?);

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout,
        })
    }
}

/// Connect a pool sized by `config`
pub async fn init_pool(config: &DatabaseConfig) -> DatabaseResult<PgPool> {
    let options = config
        .database_url
        .parse()
        .map_err(|e| DatabaseError::Configuration(format!("Invalid database URL: {}", e)))?;

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(DatabaseError::Connection)
}

/// Apply the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> DatabaseResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

    info!("Database migrations applied");
    Ok(())
}

/// Round-trip a trivial query
pub async fn health_check(pool: &PgPool) -> DatabaseResult<bool> {
    let one: i32 = sqlx::query_scalar("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(DatabaseError::Query)?;

    Ok(one == 1)
}
