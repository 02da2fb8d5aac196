//! Read-only relation storage: subscriptions, watch history, videos and
//! video owners. Counts are computed by the database, never by loading the
//! edge sets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreResult;

/// Video record
#[derive(Debug, Clone, PartialEq)]
pub struct Video {
    pub id: Uuid,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The owner fields a video view is allowed to expose
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub full_name: String,
    pub username: String,
    pub avatar: String,
}

#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Number of subscriptions whose channel is `channel_id`
    async fn count_subscribers(&self, channel_id: Uuid) -> StoreResult<i64>;

    /// Number of subscriptions whose subscriber is `subscriber_id`
    async fn count_subscriptions(&self, subscriber_id: Uuid) -> StoreResult<i64>;

    async fn is_subscribed(&self, subscriber_id: Uuid, channel_id: Uuid) -> StoreResult<bool>;

    /// Video ids in stored order (most recent first)
    async fn watch_history(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>>;

    /// Videos among `ids` that exist, in no particular order
    async fn videos_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Video>>;

    /// Owners among `ids` that exist, in no particular order
    async fn owners_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<OwnerSummary>>;
}

/// PostgreSQL-backed relation repository
#[derive(Clone)]
pub struct PgRelationStore {
    pool: PgPool,
}

impl PgRelationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationStore for PgRelationStore {
    async fn count_subscribers(&self, channel_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE channel = $1")
            .bind(channel_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn count_subscriptions(&self, subscriber_id: Uuid) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE subscriber = $1")
                .bind(subscriber_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn is_subscribed(&self, subscriber_id: Uuid, channel_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE subscriber = $1 AND channel = $2)",
        )
        .bind(subscriber_id)
        .bind(channel_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn watch_history(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids: Option<Vec<Uuid>> =
            sqlx::query_scalar("SELECT watch_history FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(ids.unwrap_or_default())
    }

    async fn videos_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Video>> {
        let rows = sqlx::query(
            r#"
            SELECT id, video_file, thumbnail, title, description, duration, views,
                   is_published, owner, created_at, updated_at
            FROM videos
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let videos = rows
            .into_iter()
            .map(|row| Video {
                id: row.get("id"),
                video_file: row.get("video_file"),
                thumbnail: row.get("thumbnail"),
                title: row.get("title"),
                description: row.get("description"),
                duration: row.get("duration"),
                views: row.get("views"),
                is_published: row.get("is_published"),
                owner: row.get("owner"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect();

        Ok(videos)
    }

    async fn owners_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<OwnerSummary>> {
        let rows = sqlx::query(
            "SELECT id, full_name, username, avatar FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let owners = rows
            .into_iter()
            .map(|row| OwnerSummary {
                id: row.get("id"),
                full_name: row.get("full_name"),
                username: row.get("username"),
                avatar: row.get("avatar"),
            })
            .collect();

        Ok(owners)
    }
}
