use async_trait::async_trait;
use twitch_api2::types::{EventSubId, UserId};

use crate::errors::DirectoryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcaster {
    pub id: UserId,
    pub login: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub game: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowedChannels {
    /// (id, name), at most 100 of them
    pub channels: Vec<(UserId, String)>,
    /// true when the account follows more channels than listed
    pub truncated: bool,
}

/// Everything we need from the streaming platform.
#[async_trait]
pub trait StreamDirectory: Send + Sync {
    async fn resolve_broadcaster(&self, login: &str) -> Result<Broadcaster, DirectoryError>;

    async fn stream_info(&self, id: &UserId) -> Result<StreamInfo, DirectoryError>;

    async fn followed_channels(&self, user: &UserId) -> Result<FollowedChannels, DirectoryError>;

    /// Ask to be notified when the broadcaster goes live.
    /// No retry is done here, a failure is reported right away.
    async fn subscribe(&self, id: &UserId) -> Result<EventSubId, DirectoryError>;

    async fn unsubscribe(&self, handle: &EventSubId) -> Result<(), DirectoryError>;

    /// Drop the upstream subscriptions left over by a previous run.
    /// Only fails when they can't be listed, single deletions are best effort.
    async fn reset(&self) -> Result<(), DirectoryError>;
}
