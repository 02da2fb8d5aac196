//! In-memory collaborators for tests
//!
//! These mirror the contracts of the PostgreSQL, Redis and S3 backed
//! implementations closely enough to drive the session engine and the
//! aggregator without external services.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    error::{StoreError, StoreResult},
    password::PasswordHasher,
    relations::{OwnerSummary, RelationStore, Video},
    session::SessionStore,
    token::Clock,
    upload::{MediaUploader, UploadError, UploadedMedia},
    users::{ImageSlot, NewUser, User, UserStore},
};

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Reversible "hash" that keeps tests fast
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, plain: &str) -> anyhow::Result<String> {
        Ok(format!("plain${}", plain))
    }

    fn verify(&self, plain: &str, digest: &str) -> anyhow::Result<bool> {
        let stored = digest
            .strip_prefix("plain$")
            .ok_or_else(|| anyhow::anyhow!("Failed to parse password hash"))?;
        Ok(stored == plain)
    }
}

/// Mock user repository
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

fn same_text(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| same_text(&u.username, username))
            .cloned())
    }

    async fn find_by_identifier(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|u| {
                username.is_some_and(|name| same_text(&u.username, name))
                    || email.is_some_and(|mail| same_text(&u.email, mail))
            })
            .min_by_key(|u| u.created_at)
            .cloned())
    }

    async fn create(&self, new_user: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().await;

        if users
            .values()
            .any(|u| same_text(&u.username, &new_user.username))
        {
            return Err(StoreError::Conflict("users_username_key".to_string()));
        }
        if users.values().any(|u| same_text(&u.email, &new_user.email)) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            full_name: new_user.full_name,
            avatar: new_user.avatar,
            cover_image: new_user.cover_image,
            password_hash: new_user.password_hash,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_details(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> StoreResult<Option<User>> {
        let mut users = self.users.write().await;

        if users
            .values()
            .any(|u| u.id != id && same_text(&u.email, email))
        {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }

        Ok(users.get_mut(&id).map(|user| {
            user.full_name = full_name.to_string();
            user.email = email.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_image(
        &self,
        id: Uuid,
        slot: ImageSlot,
        url: &str,
    ) -> StoreResult<Option<User>> {
        Ok(self.users.write().await.get_mut(&id).map(|user| {
            match slot {
                ImageSlot::Avatar => user.avatar = url.to_string(),
                ImageSlot::CoverImage => user.cover_image = url.to_string(),
            }
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}

/// Mock session store; the mutex makes compare-and-swap atomic
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    slots: Arc<Mutex<HashMap<Uuid, String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn current(&self, user_id: Uuid) -> StoreResult<Option<String>> {
        Ok(self.slots.lock().await.get(&user_id).cloned())
    }

    async fn replace(&self, user_id: Uuid, token: &str) -> StoreResult<()> {
        self.slots.lock().await.insert(user_id, token.to_string());
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        user_id: Uuid,
        expected: &str,
        next: &str,
    ) -> StoreResult<bool> {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(&user_id) {
            Some(current) if current == expected => {
                *current = next.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear(&self, user_id: Uuid) -> StoreResult<()> {
        self.slots.lock().await.remove(&user_id);
        Ok(())
    }
}

/// Mock relation store; owners are read from the paired user store
#[derive(Clone)]
pub struct MemoryRelationStore {
    users: MemoryUserStore,
    subscriptions: Arc<RwLock<HashSet<(Uuid, Uuid)>>>,
    videos: Arc<RwLock<HashMap<Uuid, Video>>>,
    history: Arc<RwLock<HashMap<Uuid, Vec<Uuid>>>>,
}

impl MemoryRelationStore {
    pub fn new(users: MemoryUserStore) -> Self {
        Self {
            users,
            subscriptions: Arc::default(),
            videos: Arc::default(),
            history: Arc::default(),
        }
    }

    pub async fn subscribe(&self, subscriber: Uuid, channel: Uuid) {
        self.subscriptions
            .write()
            .await
            .insert((subscriber, channel));
    }

    pub async fn unsubscribe(&self, subscriber: Uuid, channel: Uuid) {
        self.subscriptions
            .write()
            .await
            .remove(&(subscriber, channel));
    }

    /// Store a published video owned by `owner` and return it
    pub async fn add_video(&self, owner: Uuid, title: &str) -> Video {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let video = Video {
            id,
            video_file: format!("https://cdn.example.com/videos/{}.mp4", id),
            thumbnail: format!("https://cdn.example.com/thumbs/{}.jpg", id),
            title: title.to_string(),
            description: String::new(),
            duration: 60.0,
            views: 0,
            is_published: true,
            owner,
            created_at: now,
            updated_at: now,
        };
        self.videos.write().await.insert(id, video.clone());
        video
    }

    /// Record a view; the newest entry goes first
    pub async fn record_watch(&self, user_id: Uuid, video_id: Uuid) {
        self.history
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(0, video_id);
    }
}

#[async_trait]
impl RelationStore for MemoryRelationStore {
    async fn count_subscribers(&self, channel_id: Uuid) -> StoreResult<i64> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.iter().filter(|(_, c)| *c == channel_id).count() as i64)
    }

    async fn count_subscriptions(&self, subscriber_id: Uuid) -> StoreResult<i64> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions
            .iter()
            .filter(|(s, _)| *s == subscriber_id)
            .count() as i64)
    }

    async fn is_subscribed(&self, subscriber_id: Uuid, channel_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .subscriptions
            .read()
            .await
            .contains(&(subscriber_id, channel_id)))
    }

    async fn watch_history(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .history
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn videos_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Video>> {
        let videos = self.videos.read().await;
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        Ok(videos
            .values()
            .filter(|v| wanted.contains(&v.id))
            .cloned()
            .collect())
    }

    async fn owners_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<OwnerSummary>> {
        let mut owners = Vec::new();
        for id in ids.iter().collect::<HashSet<_>>() {
            if let Some(user) = self.users.find_by_id(*id).await? {
                owners.push(OwnerSummary {
                    id: user.id,
                    full_name: user.full_name,
                    username: user.username,
                    avatar: user.avatar,
                });
            }
        }
        Ok(owners)
    }
}

/// Mock media host returning `{base_url}/{file name}`
#[derive(Clone)]
pub struct StaticUploader {
    base_url: String,
    failing: Arc<AtomicBool>,
    uploads: Arc<AtomicUsize>,
}

impl StaticUploader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            failing: Arc::default(),
            uploads: Arc::default(),
        }
    }

    /// Make every following upload fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful uploads so far
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaUploader for StaticUploader {
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, UploadError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(UploadError::Remote("media host unavailable".to_string()));
        }

        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| UploadError::Remote("staged file has no name".to_string()))?;

        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(UploadedMedia {
            url: format!("{}/{}", self.base_url, file_name),
        })
    }
}
