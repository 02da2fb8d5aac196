//! Integration tests for the infrastructure components
//!
//! These tests verify that the PostgreSQL stores and the Redis session store
//! honour their contracts against live services. Run them with
//! `--ignored` once `DATABASE_URL` and `REDIS_URL` point at real instances.

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
    relations::{PgRelationStore, RelationStore},
    session::{PgSessionStore, RedisSessionStore, SessionStore},
    users::{NewUser, PgUserStore, UserStore},
};
use uuid::Uuid;

fn unique_user() -> NewUser {
    let tag = Uuid::new_v4().simple().to_string();
    NewUser {
        username: format!("user_{}", &tag[..12]),
        email: format!("{}@example.com", tag),
        full_name: "Integration User".to_string(),
        avatar: "https://cdn.example.com/avatar.png".to_string(),
        cover_image: String::new(),
        password_hash: "plain$integration".to_string(),
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_postgres_session_slot_compare_and_swap() -> Result<(), Box<dyn std::error::Error>> {
    let pool = init_pool(&DatabaseConfig::from_env()?).await?;
    assert!(health_check(&pool).await?, "Database health check failed");
    run_migrations(&pool).await?;

    let users = PgUserStore::new(pool.clone());
    let sessions = PgSessionStore::new(pool.clone());

    let user = users.create(unique_user()).await?;
    assert_eq!(sessions.current(user.id).await?, None);

    sessions.replace(user.id, "first").await?;
    assert!(sessions.compare_and_swap(user.id, "first", "second").await?);
    assert!(!sessions.compare_and_swap(user.id, "first", "third").await?);
    assert_eq!(sessions.current(user.id).await?, Some("second".to_string()));

    sessions.clear(user.id).await?;
    assert_eq!(sessions.current(user.id).await?, None);
    assert!(!sessions.compare_and_swap(user.id, "second", "fourth").await?);

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_postgres_user_store_conflicts_and_lookups() -> Result<(), Box<dyn std::error::Error>> {
    let pool = init_pool(&DatabaseConfig::from_env()?).await?;
    run_migrations(&pool).await?;

    let users = PgUserStore::new(pool.clone());
    let relations = PgRelationStore::new(pool);

    let new_user = unique_user();
    let created = users.create(new_user.clone()).await?;

    let duplicate = users.create(new_user.clone()).await;
    assert!(matches!(
        duplicate,
        Err(common::error::StoreError::Conflict(_))
    ));

    let found = users
        .find_by_identifier(None, Some(&new_user.email.to_uppercase()))
        .await?
        .expect("user by email");
    assert_eq!(found.id, created.id);

    let found = users
        .find_by_username(&new_user.username.to_uppercase())
        .await?
        .expect("user by username");
    assert_eq!(found.id, created.id);

    assert_eq!(relations.count_subscribers(created.id).await?, 0);
    assert!(relations.watch_history(created.id).await?.is_empty());

    Ok(())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_session_slot_compare_and_swap() -> Result<(), Box<dyn std::error::Error>> {
    let redis_pool = RedisPool::new(&RedisConfig::from_env()?).await?;
    assert!(redis_pool.health_check().await?, "Redis health check failed");

    let sessions = RedisSessionStore::new(redis_pool, 60);
    let user_id = Uuid::new_v4();

    sessions.replace(user_id, "first").await?;
    assert!(sessions.compare_and_swap(user_id, "first", "second").await?);
    assert!(!sessions.compare_and_swap(user_id, "first", "third").await?);

    sessions.clear(user_id).await?;
    assert_eq!(sessions.current(user_id).await?, None);

    Ok(())
}
