use time::OffsetDateTime;
use twitch_api2::{
    eventsub::{stream::StreamOnlineV1, NotificationPayload},
    types::{EventSubId, UserId},
};

/// A broadcaster went live, as notified by twitch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessEvent {
    /// eventsub subscription which triggered the notification
    pub subscription: EventSubId,
    pub broadcaster_id: UserId,
    pub broadcaster_login: String,
    /// name of the broadcaster according to twitch
    pub broadcaster_name: String,
    pub started_at: OffsetDateTime,
}

impl LivenessEvent {
    pub fn from_notification(
        payload: NotificationPayload<StreamOnlineV1>,
    ) -> Result<Self, time::error::Parse> {
        let online = payload.event;
        let started_at = OffsetDateTime::parse(
            online.started_at.as_str(),
            &time::format_description::well_known::Rfc3339,
        )?;

        Ok(LivenessEvent {
            subscription: payload.subscription.id.into(),
            broadcaster_id: online.broadcaster_user_id,
            broadcaster_login: online.broadcaster_user_login.to_string(),
            broadcaster_name: online.broadcaster_user_name.to_string(),
            started_at,
        })
    }
}
