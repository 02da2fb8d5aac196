//! Common library for the Joy Kunga account services
//!
//! This crate provides the pieces the auth and api services share: the
//! credential codec, the refresh token session store, user and relation
//! storage, password hashing, media upload, database and cache plumbing,
//! and the error and response types returned to callers.
//!
//! Wiring the PostgreSQL-backed stores:
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, init_pool, run_migrations};
//! use common::session::PgSessionStore;
//! use common::users::PgUserStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     run_migrations(&pool).await?;
//!     let _users = PgUserStore::new(pool.clone());
//!     let _sessions = PgSessionStore::new(pool);
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod cache;
pub mod database;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod password;
pub mod relations;
pub mod response;
pub mod session;
pub mod settings;
pub mod token;
pub mod upload;
pub mod users;
pub mod validation;
