use anyhow::Result;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod error;
mod middleware;
mod models;
mod routes;
mod service;

use common::{
    access::AccessGuard,
    cache::{RedisConfig, RedisPool},
    database,
    password::Argon2Hasher,
    session::{PgSessionStore, RedisSessionStore, SessionBackend, SessionStore},
    settings::ServerConfig,
    token::{TokenCodec, TokenConfig},
    upload::{MediaConfig, S3Uploader},
    users::PgUserStore,
};

use crate::service::AuthService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: AuthService,
    pub guard: AccessGuard,
    pub upload_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting authentication service");

    // Initialize database connection pool
    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    // Check database connectivity
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool).await?;

    let token_config = TokenConfig::from_env()?;
    let codec = TokenCodec::new(&token_config);

    let sessions: Arc<dyn SessionStore> = match SessionBackend::from_env()? {
        SessionBackend::Postgres => Arc::new(PgSessionStore::new(pool.clone())),
        SessionBackend::Redis => {
            let redis_config = RedisConfig::from_env()?;
            let redis_pool = RedisPool::new(&redis_config).await?;
            Arc::new(RedisSessionStore::new(
                redis_pool,
                token_config.refresh_token_expiry,
            ))
        }
    };

    let media_config = MediaConfig::from_env();
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let uploader = S3Uploader::new(aws_sdk_s3::Client::new(&aws_config), &media_config);

    let users = Arc::new(PgUserStore::new(pool));
    let service = AuthService::new(
        codec.clone(),
        users.clone(),
        sessions,
        Arc::new(Argon2Hasher::default()),
        Arc::new(uploader),
    );

    let app_state = AppState {
        service,
        guard: AccessGuard::new(codec, users),
        upload_dir: media_config.upload_dir,
    };

    info!("Authentication service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let server_config = ServerConfig::load(3000)?;
    let listener = tokio::net::TcpListener::bind(server_config.bind_address()).await?;
    info!(
        "Authentication service listening on {}",
        server_config.bind_address()
    );

    axum::serve(listener, app).await?;

    Ok(())
}
