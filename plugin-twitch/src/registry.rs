//! Owner of the subscriptions, both the persisted chat side and the
//! in-memory broadcaster index.
//!
//! Every operation runs under a single lock, held across the calls to the
//! stream directory. This makes "is there already an upstream subscription
//! for this broadcaster? if not, create one" atomic, and fan out reads
//! never see a half applied change.
//! The store is written before the index is touched, so a failed write
//! leaves everything as it was.
//! Sqlite calls run on the async worker, under the lock: they are local and
//! short, and the lock must cover them anyway.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use twitch_api2::types::{EventSubId, UserId};

use crate::directory::StreamDirectory;
use crate::errors::RegistryError;
use crate::index::{ChatId, LiveTargets, SubscriptionIndex, TrackedBroadcaster};
use crate::store::SubscriptionStore;

pub const MAX_SUBSCRIPTIONS_PER_CHAT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
    LimitExceeded,
    /// twitch refused the eventsub subscription, nothing changed
    UpstreamError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed { display_name: String },
    NotSubscribed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub chats: usize,
    pub broadcasters: usize,
    /// persisted pairs left out of the index because twitch refused
    /// the subscription for their broadcaster
    pub inert: usize,
}

struct Inner {
    index: SubscriptionIndex,
    store: SubscriptionStore,
}

pub struct SubscriptionRegistry {
    directory: Arc<dyn StreamDirectory>,
    inner: Mutex<Inner>,
}

impl SubscriptionRegistry {
    pub fn new(directory: Arc<dyn StreamDirectory>, store: SubscriptionStore) -> Self {
        SubscriptionRegistry {
            directory,
            inner: Mutex::new(Inner {
                index: SubscriptionIndex::default(),
                store,
            }),
        }
    }

    pub async fn subscribe(
        &self,
        chat: &ChatId,
        broadcaster: &UserId,
        display_name: &str,
    ) -> Result<SubscribeOutcome, RegistryError> {
        let mut inner = self.inner.lock().await;

        if inner.index.is_subscribed(chat, broadcaster) {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }
        // rows left inert by a failed restore count too
        if inner.store.count_except(chat, broadcaster)? >= MAX_SUBSCRIPTIONS_PER_CHAT {
            log::info!("{chat} reached the subscription limit");
            return Ok(SubscribeOutcome::LimitExceeded);
        }

        let existing = inner.index.broadcaster(broadcaster).map(|b| b.handle.clone());
        let (handle, created) = match existing {
            Some(handle) => (handle, false),
            None => match self.directory.subscribe(broadcaster).await {
                Ok(handle) => (handle, true),
                Err(err) => {
                    log::warn!("Cannot subscribe to {broadcaster} for {chat}: {err}");
                    return Ok(SubscribeOutcome::UpstreamError(err.to_string()));
                }
            },
        };

        let tracked = TrackedBroadcaster {
            id: broadcaster.clone(),
            display_name: display_name.to_string(),
        };

        let persisted = inner.store.add(chat, &tracked);
        if let Err(err) = persisted {
            log::error!("Cannot persist subscription of {chat} to {broadcaster}: {err:?}");
            if created {
                self.teardown(&handle).await;
            }
            return Err(err.into());
        }

        log::info!("{chat} subscribed to {display_name} ({broadcaster})");
        inner.index.link(chat, tracked, handle);
        Ok(SubscribeOutcome::Subscribed)
    }

    pub async fn unsubscribe(
        &self,
        chat: &ChatId,
        broadcaster: &UserId,
    ) -> Result<UnsubscribeOutcome, RegistryError> {
        let mut inner = self.inner.lock().await;

        if !inner.index.is_subscribed(chat, broadcaster) {
            return Ok(UnsubscribeOutcome::NotSubscribed);
        }

        inner.store.remove(chat, broadcaster)?;
        let display_name = self
            .unlink(&mut inner, chat, broadcaster)
            .await
            .map(|t| t.display_name)
            .unwrap_or_default();

        log::info!("{chat} unsubscribed from {display_name} ({broadcaster})");
        Ok(UnsubscribeOutcome::Unsubscribed { display_name })
    }

    /// Drop every subscription of the chat, returns how many were active.
    pub async fn unsubscribe_all(&self, chat: &ChatId) -> Result<usize, RegistryError> {
        let mut inner = self.inner.lock().await;

        let broadcasters = inner
            .index
            .chat(chat)
            .iter()
            .map(|t| t.id.clone())
            .collect::<Vec<_>>();

        // also clears rows left inert by a failed restore
        inner.store.remove_chat(chat)?;
        for broadcaster in &broadcasters {
            self.unlink(&mut inner, chat, broadcaster).await;
        }

        if !broadcasters.is_empty() {
            log::info!("{chat} unsubscribed from {} broadcasters", broadcasters.len());
        }
        Ok(broadcasters.len())
    }

    /// Display names of the chat's subscriptions, oldest first
    pub async fn list(&self, chat: &ChatId) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .index
            .chat(chat)
            .iter()
            .map(|t| t.display_name.clone())
            .collect()
    }

    /// Which broadcaster the chat knows under that name, if any
    pub async fn find_by_name(&self, chat: &ChatId, display_name: &str) -> Option<UserId> {
        let inner = self.inner.lock().await;
        inner
            .index
            .find_by_name(chat, display_name)
            .map(|t| t.id.clone())
    }

    /// Snapshot of the chats to notify for the given upstream subscription.
    /// None if the handle is unknown, most likely already torn down.
    pub async fn live_targets(&self, handle: &EventSubId) -> Option<LiveTargets> {
        let inner = self.inner.lock().await;
        inner.index.live_targets(handle)
    }

    /// Rebuild the index from the store and subscribe once upstream
    /// for every broadcaster. Broadcasters twitch refuses are left out,
    /// their rows stay in the store untouched.
    pub async fn restore(&self) -> Result<RestoreReport, RegistryError> {
        let mut inner = self.inner.lock().await;
        if !inner.index.is_empty() {
            log::warn!("Subscriptions already restored, skipping");
            return Ok(RestoreReport::default());
        }

        let persisted = inner.store.load_all()?;
        let mut handles: HashMap<UserId, Option<EventSubId>> = HashMap::new();
        let mut report = RestoreReport {
            chats: persisted.len(),
            ..RestoreReport::default()
        };

        for chat in persisted {
            for tracked in chat.broadcasters {
                let known = handles.get(&tracked.id).cloned();
                let handle = match known {
                    Some(handle) => handle,
                    None => {
                        let handle = match self.directory.subscribe(&tracked.id).await {
                            Ok(handle) => Some(handle),
                            Err(err) => {
                                log::warn!(
                                    "Cannot restore subscription for {} ({}): {err}",
                                    tracked.display_name,
                                    tracked.id
                                );
                                None
                            }
                        };
                        handles.insert(tracked.id.clone(), handle.clone());
                        handle
                    }
                };

                match handle {
                    Some(handle) => inner.index.link(&chat.chat, tracked, handle),
                    None => report.inert += 1,
                }
            }
        }

        report.broadcasters = inner.index.broadcaster_count();
        log::info!(
            "Restored {} chats tracking {} broadcasters ({} inert subscriptions)",
            report.chats,
            report.broadcasters,
            report.inert
        );
        Ok(report)
    }

    /// Remove the pair from the index, tearing down the upstream
    /// subscription first when nobody else tracks the broadcaster.
    async fn unlink(
        &self,
        inner: &mut Inner,
        chat: &ChatId,
        broadcaster: &UserId,
    ) -> Option<TrackedBroadcaster> {
        if let Some(handle) = inner.index.sole_subscriber_handle(chat, broadcaster) {
            self.teardown(&handle).await;
        }
        inner.index.unlink(chat, broadcaster)
    }

    async fn teardown(&self, handle: &EventSubId) {
        // a leftover subscription only costs some ignored notifications,
        // and is deleted at the next startup anyway
        if let Err(err) = self.directory.unsubscribe(handle).await {
            log::warn!("Cannot delete upstream subscription {handle}: {err}");
        }
    }

    #[cfg(test)]
    pub(crate) async fn assert_consistent(&self) {
        self.inner.lock().await.index.assert_consistent();
    }

    #[cfg(test)]
    pub(crate) async fn subscribers_of(&self, broadcaster: &UserId) -> Option<Vec<ChatId>> {
        let inner = self.inner.lock().await;
        inner
            .index
            .broadcaster(broadcaster)
            .map(|b| b.subscribers.iter().cloned().collect())
    }

    #[cfg(test)]
    pub(crate) async fn persisted(&self) -> Vec<crate::store::PersistedChat> {
        self.inner.lock().await.store.load_all().unwrap()
    }
}
