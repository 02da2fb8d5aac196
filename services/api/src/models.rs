//! API models for request and response payloads

use chrono::{DateTime, Utc};
use common::relations::{OwnerSummary, Video};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request for an account details update
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateAccountRequest {
    pub full_name: String,
    pub email: String,
}

/// Public profile of a channel as seen by a viewer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    pub full_name: String,
    pub username: String,
    pub subscribers_count: i64,
    pub channels_subscribed_to_count: i64,
    pub is_subscribed: bool,
    pub avatar: String,
    pub cover_image: String,
    pub email: String,
}

/// Owner fields embedded in a watched video
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerView {
    pub full_name: String,
    pub username: String,
    pub avatar: String,
}

impl From<OwnerSummary> for OwnerView {
    fn from(owner: OwnerSummary) -> Self {
        OwnerView {
            full_name: owner.full_name,
            username: owner.username,
            avatar: owner.avatar,
        }
    }
}

/// Watch history entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedVideo {
    pub id: Uuid,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    /// `None` if the owner no longer exists
    pub owner: Option<OwnerView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WatchedVideo {
    pub fn new(video: Video, owner: Option<OwnerView>) -> Self {
        WatchedVideo {
            id: video.id,
            video_file: video.video_file,
            thumbnail: video.thumbnail,
            title: video.title,
            description: video.description,
            duration: video.duration,
            views: video.views,
            is_published: video.is_published,
            owner,
            created_at: video.created_at,
            updated_at: video.updated_at,
        }
    }
}
