//! Read-only views built from the relation records
//!
//! Nothing here writes to storage. Counts come from the store, and the watch
//! history join keeps the stored order of the history list.

use std::collections::HashMap;
use std::sync::Arc;

use common::{
    error::{AccountError, AccountResult, StoreError},
    relations::RelationStore,
    users::UserStore,
};
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::{ChannelProfile, OwnerView, WatchedVideo};

fn store_failure(context: &'static str) -> impl Fn(StoreError) -> AccountError {
    move |e| {
        error!("{}: {}", context, e);
        AccountError::internal()
    }
}

/// Channel profiles and watch history
#[derive(Clone)]
pub struct RelationshipAggregator {
    users: Arc<dyn UserStore>,
    relations: Arc<dyn RelationStore>,
}

impl RelationshipAggregator {
    pub fn new(users: Arc<dyn UserStore>, relations: Arc<dyn RelationStore>) -> Self {
        Self { users, relations }
    }

    /// Profile of `target` (case-insensitive username) as seen by `viewer`
    pub async fn channel_profile(
        &self,
        target: &str,
        viewer: Option<Uuid>,
    ) -> AccountResult<ChannelProfile> {
        let target = target.trim();
        if target.is_empty() {
            return Err(AccountError::bad_request("Username is missing"));
        }

        let channel = self
            .users
            .find_by_username(target)
            .await
            .map_err(store_failure("Failed to look up channel"))?
            .ok_or_else(|| AccountError::not_found("Channel does not exist"))?;

        let subscribed = async {
            match viewer {
                Some(viewer) => self.relations.is_subscribed(viewer, channel.id).await,
                None => Ok(false),
            }
        };

        let (subscribers_count, channels_subscribed_to_count, is_subscribed) = tokio::try_join!(
            self.relations.count_subscribers(channel.id),
            self.relations.count_subscriptions(channel.id),
            subscribed,
        )
        .map_err(store_failure("Failed to aggregate channel relations"))?;

        debug!(
            "Channel {} has {} subscribers",
            channel.username, subscribers_count
        );

        Ok(ChannelProfile {
            full_name: channel.full_name,
            username: channel.username,
            subscribers_count,
            channels_subscribed_to_count,
            is_subscribed,
            avatar: channel.avatar,
            cover_image: channel.cover_image,
            email: channel.email,
        })
    }

    /// The caller's watch history, most recent first.
    ///
    /// Entries whose video no longer exists are skipped; a missing owner
    /// leaves `owner` empty.
    pub async fn watch_history(&self, user_id: Uuid) -> AccountResult<Vec<WatchedVideo>> {
        let history = self
            .relations
            .watch_history(user_id)
            .await
            .map_err(store_failure("Failed to load watch history"))?;
        if history.is_empty() {
            return Ok(Vec::new());
        }

        let videos: HashMap<Uuid, _> = self
            .relations
            .videos_by_ids(&history)
            .await
            .map_err(store_failure("Failed to load watched videos"))?
            .into_iter()
            .map(|video| (video.id, video))
            .collect();

        let mut owner_ids: Vec<Uuid> = videos.values().map(|video| video.owner).collect();
        owner_ids.sort_unstable();
        owner_ids.dedup();

        let mut owners: HashMap<Uuid, OwnerView> = HashMap::new();
        for owner in self
            .relations
            .owners_by_ids(&owner_ids)
            .await
            .map_err(store_failure("Failed to load video owners"))?
        {
            owners.entry(owner.id).or_insert_with(|| owner.into());
        }

        Ok(history
            .iter()
            .filter_map(|id| videos.get(id))
            .map(|video| WatchedVideo::new(video.clone(), owners.get(&video.owner).cloned()))
            .collect())
    }
}
