use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod account;
mod aggregator;
mod error;
mod middleware;
mod models;
mod routes;
mod state;

use common::{
    access::AccessGuard,
    database::{self, DatabaseConfig, init_pool},
    relations::PgRelationStore,
    settings::ServerConfig,
    token::{TokenCodec, TokenConfig},
    upload::{MediaConfig, S3Uploader},
    users::PgUserStore,
};

use crate::{account::AccountService, aggregator::RelationshipAggregator, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting API service");

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    let token_config = TokenConfig::from_env()?;
    let codec = TokenCodec::new(&token_config);

    let media_config = MediaConfig::from_env();
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let uploader = S3Uploader::new(aws_sdk_s3::Client::new(&aws_config), &media_config);

    let users = Arc::new(PgUserStore::new(pool.clone()));
    let relations = Arc::new(PgRelationStore::new(pool));

    let app_state = AppState {
        guard: AccessGuard::new(codec, users.clone()),
        accounts: AccountService::new(users.clone(), Arc::new(uploader)),
        aggregator: RelationshipAggregator::new(users, relations),
        upload_dir: media_config.upload_dir,
    };

    info!("API service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let server_config = ServerConfig::load(3001)?;
    let listener = tokio::net::TcpListener::bind(server_config.bind_address()).await?;
    info!("API service listening on {}", server_config.bind_address());

    axum::serve(listener, app).await?;

    Ok(())
}
