use async_trait::async_trait;
use futures::StreamExt;
use twitch_api2::{
    eventsub::{self, stream::StreamOnlineV1},
    helix::{
        self,
        streams,
        users::{get_users, get_users_follows},
    },
    twitch_oauth2::AppAccessToken,
    types::{EventSubId, Nickname, UserId},
    HelixClient,
};

use crate::config::Config;
use crate::directory::{Broadcaster, FollowedChannels, StreamDirectory, StreamInfo};
use crate::errors::DirectoryError;

const MAX_FOLLOWED_CHANNELS: usize = 100;

struct WrappedToken(AppAccessToken);

impl WrappedToken {
    fn get(&self) -> &AppAccessToken {
        &self.0
    }
}

/// StreamDirectory backed by the twitch helix api, with an app access token.
pub struct HelixDirectory {
    // The twitch client and the oauth client are kept separate, sharing the
    // same http client for both trips a higher rank trait bound bug in rustc:
    // https://github.com/rust-lang/rust/issues/70263
    client: HelixClient<'static, reqwest::Client>,
    // TODO wrap the uses of the token to automatically refresh it if expired
    token: WrappedToken,
    callback_uri: String,
    app_secret: String,
}

impl HelixDirectory {
    pub async fn new(config: &Config) -> Result<Self, DirectoryError> {
        let auth_client = reqwest::Client::default();
        let token = AppAccessToken::get_app_access_token(
            &auth_client,
            config.client_id.clone(),
            config.client_secret.clone(),
            vec![], // scopes
        )
        .await
        .map_err(|e| DirectoryError::upstream(e, "Cannot get app access token"))?;

        Ok(HelixDirectory {
            client: HelixClient::new(),
            token: WrappedToken(token),
            callback_uri: config.callback_uri.0.clone(),
            app_secret: config.app_secret.0.clone(),
        })
    }
}

#[async_trait]
impl StreamDirectory for HelixDirectory {
    async fn resolve_broadcaster(&self, login: &str) -> Result<Broadcaster, DirectoryError> {
        let req = get_users::GetUsersRequest::builder()
            .id(vec![])
            .login(vec![Nickname::from(login.to_lowercase())])
            .build();
        let mut resp = self
            .client
            .req_get(req, self.token.get())
            .await
            .map_err(|e| DirectoryError::upstream(e, format!("cannot get user {login}")))?;

        let user = resp
            .data
            .pop()
            .ok_or_else(|| DirectoryError::NotFound(login.to_string()))?;

        Ok(Broadcaster {
            id: user.id,
            login: user.login.to_string(),
            display_name: user.display_name.to_string(),
        })
    }

    async fn stream_info(&self, id: &UserId) -> Result<StreamInfo, DirectoryError> {
        let mut resp = self
            .client
            .req_get(
                streams::GetStreamsRequest::builder()
                    .user_id(vec![id.clone()])
                    .build(),
                self.token.get(),
            )
            .await
            .map_err(|e| DirectoryError::upstream(e, format!("Can't get live stream for {id}")))?;

        // Ok but empty means the stream isn't live (anymore)
        let stream = resp.data.pop().ok_or(DirectoryError::Unavailable)?;
        Ok(StreamInfo {
            game: stream.game_name.to_string(),
            title: stream.title,
        })
    }

    async fn followed_channels(&self, user: &UserId) -> Result<FollowedChannels, DirectoryError> {
        let mut req = get_users_follows::GetUsersFollowsRequest::builder().build();
        req.from_id = Some(user.clone());
        req.first = Some(MAX_FOLLOWED_CHANNELS);

        let resp = self
            .client
            .req_get(req, self.token.get())
            .await
            .map_err(|e| DirectoryError::upstream(e, format!("cannot list follows of {user}")))?;

        let channels = resp
            .data
            .follow_relationships
            .into_iter()
            .take(MAX_FOLLOWED_CHANNELS)
            .map(|follow| (follow.to_id, follow.to_name.to_string()))
            .collect::<Vec<_>>();
        let truncated = resp.data.total as usize > channels.len();

        Ok(FollowedChannels {
            channels,
            truncated,
        })
    }

    /// Create a stream.online subscription. Twitch confirms it later
    /// through the webhook, which must be running for the subscription
    /// to become active.
    async fn subscribe(&self, id: &UserId) -> Result<EventSubId, DirectoryError> {
        let event = StreamOnlineV1::builder()
            .broadcaster_user_id(id.clone())
            .build();
        let sub_body = helix::eventsub::CreateEventSubSubscriptionBody::builder()
            .subscription(event)
            .transport(
                eventsub::Transport::builder()
                    .method(eventsub::TransportMethod::Webhook)
                    .callback(self.callback_uri.clone())
                    .secret(self.app_secret.clone())
                    .build(),
            )
            .build();

        let resp = self
            .client
            .req_post(
                helix::eventsub::CreateEventSubSubscriptionRequest::builder().build(),
                sub_body,
                self.token.get(),
            )
            .await
            .map_err(|e| {
                DirectoryError::upstream(e, format!("Failed to subscribe stream.online for {id}"))
            })?;

        log::info!("Subscribed stream.online for broadcaster {id}");
        Ok(resp.data.id)
    }

    async fn unsubscribe(&self, handle: &EventSubId) -> Result<(), DirectoryError> {
        log::info!("Deleting subscription {handle}");
        self.client
            .req_delete(
                helix::eventsub::DeleteEventSubSubscriptionRequest::builder()
                    .id(handle.clone())
                    .build(),
                self.token.get(),
            )
            .await
            .map_err(|e| {
                DirectoryError::upstream(e, format!("Failed to delete subscription {handle}"))
            })?;

        Ok(())
    }

    /// Delete every eventsub subscription owned by the app.
    /// They would otherwise conflict with the ones created when restoring
    /// the subscriptions of all chats.
    async fn reset(&self) -> Result<(), DirectoryError> {
        // TODO: handle pagination
        let resp = self
            .client
            .req_get(
                helix::eventsub::GetEventSubSubscriptionsRequest::builder().build(),
                self.token.get(),
            )
            .await
            .map_err(|e| DirectoryError::upstream(e, "cannot list subscriptions"))?;

        let ids = resp
            .data
            .subscriptions
            .into_iter()
            .map(|sub| EventSubId::from(sub.id))
            .collect::<Vec<_>>();
        log::info!("Deleting {} leftover eventsub subscriptions", ids.len());

        // a leftover only sends notifications with an unknown handle
        futures::stream::iter(ids)
            .for_each_concurrent(5, |id| async move {
                if let Err(err) = self.unsubscribe(&id).await {
                    log::warn!("Cannot delete leftover subscription: {err}");
                }
            })
            .await;
        Ok(())
    }
}
