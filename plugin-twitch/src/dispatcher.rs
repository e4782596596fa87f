//! Turns liveness events into chat messages.
//!
//! Events are consumed one at a time from a channel fed by the webhook
//! server. Nothing here ever fails outward: every event ends up either
//! delivered, skipped with a log line, or as a cascade removal of the chats
//! which can't receive messages anymore.

use std::sync::Arc;

use plugin_core::{Delivery, Outbox};
use time::{Duration, OffsetDateTime};
use tokio::sync::mpsc;

use crate::directory::{StreamDirectory, StreamInfo};
use crate::event::LivenessEvent;
use crate::registry::SubscriptionRegistry;

pub struct NotificationDispatcher {
    registry: Arc<SubscriptionRegistry>,
    directory: Arc<dyn StreamDirectory>,
    outbox: Arc<dyn Outbox>,
    staleness_window: Duration,
    clock_skew: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        directory: Arc<dyn StreamDirectory>,
        outbox: Arc<dyn Outbox>,
        staleness_window: Duration,
        clock_skew: Duration,
    ) -> Self {
        NotificationDispatcher {
            registry,
            directory,
            outbox,
            staleness_window,
            clock_skew,
        }
    }

    /// Returns once every sender of the channel is gone
    pub async fn run(&self, mut events: mpsc::Receiver<LivenessEvent>) {
        while let Some(event) = events.recv().await {
            self.on_liveness_event(event).await;
        }
        log::error!("liveness event channel closed, dispatcher exiting");
    }

    /// Returns the number of chats notified
    pub async fn on_liveness_event(&self, event: LivenessEvent) -> usize {
        self.dispatch_at(event, OffsetDateTime::now_utc()).await
    }

    async fn dispatch_at(&self, event: LivenessEvent, now: OffsetDateTime) -> usize {
        let elapsed = now - event.started_at;
        if elapsed > self.staleness_window || elapsed < -self.clock_skew {
            // twitch replays notifications, and a restart resubscribes to
            // streams which may already be live
            log::info!(
                "Ignoring stale notification for {}, stream started {}s ago",
                event.broadcaster_login,
                elapsed.whole_seconds()
            );
            return 0;
        }

        let targets = match self.registry.live_targets(&event.subscription).await {
            Some(targets) => targets,
            None => {
                log::info!(
                    "Got a notification for {} with unknown subscription {}",
                    event.broadcaster_login,
                    event.subscription
                );
                return 0;
            }
        };

        let info = match self.directory.stream_info(&targets.broadcaster).await {
            Ok(info) => Some(info),
            Err(err) => {
                log::info!("No stream info for {}: {err}", event.broadcaster_login);
                None
            }
        };

        let mut notified = 0;
        for (chat, display_name) in targets.chats {
            let message = format_live_message(&display_name, &event.broadcaster_login, info.as_ref());
            match self.outbox.send(chat.as_str(), &message).await {
                Delivery::Sent => {
                    log::debug!("Stream online message to {chat}: {message}");
                    notified += 1;
                }
                Delivery::Transient(reason) => {
                    log::warn!("Cannot notify {chat} for now: {reason}");
                }
                Delivery::Permanent(reason) => {
                    log::warn!("{chat} cannot be notified anymore ({reason}), dropping its subscriptions");
                    if let Err(err) = self.registry.unsubscribe_all(&chat).await {
                        log::error!("Failed to drop subscriptions of {chat}: {err:?}");
                    }
                }
            }
        }
        notified
    }
}

fn format_live_message(display_name: &str, login: &str, info: Option<&StreamInfo>) -> String {
    let url = format!("https://www.twitch.tv/{}", login);
    let mut message = format!("{} is now live at {}", display_name, url);
    if let Some(info) = info {
        if !info.game.is_empty() {
            message.push_str(&format!(" ({})", info.game));
        }
        if !info.title.is_empty() {
            message.push_str(&format!(" − {}", info.title));
        }
    }
    message
}
