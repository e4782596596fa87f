//! Fakes of the platform collaborators, recording what they are asked to do.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use plugin_core::{Delivery, Outbox};
use twitch_api2::types::{EventSubId, UserId};

use crate::directory::{Broadcaster, FollowedChannels, StreamDirectory, StreamInfo};
use crate::errors::DirectoryError;

pub fn user_id(id: &str) -> UserId {
    UserId::from(id.to_string())
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<String, Broadcaster>,
    infos: HashMap<UserId, StreamInfo>,
    follows: HashMap<UserId, FollowedChannels>,
    failing: HashSet<UserId>,
    unreachable: bool,
    /// live upstream subscriptions
    active: HashMap<EventSubId, UserId>,
    subscribe_calls: Vec<UserId>,
    unsubscribe_calls: Vec<EventSubId>,
    next_handle: usize,
}

#[derive(Debug, Default)]
pub struct FakeDirectory {
    state: Mutex<DirectoryState>,
}

impl FakeDirectory {
    pub fn with_user(self, login: &str, id: &str) -> Self {
        self.state.lock().users.insert(
            login.to_lowercase(),
            Broadcaster {
                id: user_id(id),
                login: login.to_lowercase(),
                display_name: login.to_string(),
            },
        );
        self
    }

    pub fn with_stream(self, id: &str, game: &str, title: &str) -> Self {
        self.state.lock().infos.insert(
            user_id(id),
            StreamInfo {
                game: game.to_string(),
                title: title.to_string(),
            },
        );
        self
    }

    pub fn with_follows(self, id: &str, follows: FollowedChannels) -> Self {
        self.state.lock().follows.insert(user_id(id), follows);
        self
    }

    pub fn fail_subscriptions_for(&self, id: &str) {
        self.state.lock().failing.insert(user_id(id));
    }

    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.failing.clear();
        state.unreachable = false;
    }

    /// Every call listing upstream subscriptions fails until healed
    pub fn unreachable(&self) {
        self.state.lock().unreachable = true;
    }

    /// Pretend a previous run left an upstream subscription behind
    pub fn with_leftover(self, handle: &str, id: &str) -> Self {
        self.state
            .lock()
            .active
            .insert(EventSubId::from(handle.to_string()), user_id(id));
        self
    }

    pub fn subscribe_calls(&self) -> Vec<UserId> {
        self.state.lock().subscribe_calls.clone()
    }

    pub fn unsubscribe_calls(&self) -> Vec<EventSubId> {
        self.state.lock().unsubscribe_calls.clone()
    }

    /// Number of live upstream subscriptions for the given broadcaster
    pub fn active_for(&self, id: &str) -> usize {
        let id = user_id(id);
        self.state.lock().active.values().filter(|u| **u == id).count()
    }

    pub fn handle_for(&self, id: &str) -> Option<EventSubId> {
        let id = user_id(id);
        self.state
            .lock()
            .active
            .iter()
            .find(|(_, u)| **u == id)
            .map(|(h, _)| h.clone())
    }
}

#[async_trait]
impl StreamDirectory for FakeDirectory {
    async fn resolve_broadcaster(&self, login: &str) -> Result<Broadcaster, DirectoryError> {
        self.state
            .lock()
            .users
            .get(&login.to_lowercase())
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(login.to_string()))
    }

    async fn stream_info(&self, id: &UserId) -> Result<StreamInfo, DirectoryError> {
        self.state
            .lock()
            .infos
            .get(id)
            .cloned()
            .ok_or(DirectoryError::Unavailable)
    }

    async fn followed_channels(&self, user: &UserId) -> Result<FollowedChannels, DirectoryError> {
        Ok(self.state.lock().follows.get(user).cloned().unwrap_or_default())
    }

    async fn subscribe(&self, id: &UserId) -> Result<EventSubId, DirectoryError> {
        let mut state = self.state.lock();
        state.subscribe_calls.push(id.clone());
        if state.failing.contains(id) {
            return Err(DirectoryError::upstream(
                std::io::Error::new(std::io::ErrorKind::Other, "409 conflict"),
                format!("Failed to subscribe stream.online for {id}"),
            ));
        }
        state.next_handle += 1;
        let handle = EventSubId::from(format!("sub-{}", state.next_handle));
        state.active.insert(handle.clone(), id.clone());
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: &EventSubId) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        state.unsubscribe_calls.push(handle.clone());
        state.active.remove(handle);
        Ok(())
    }

    async fn reset(&self) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        if state.unreachable {
            return Err(DirectoryError::upstream(
                std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"),
                "cannot list subscriptions",
            ));
        }
        state.active.clear();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeOutbox {
    sent: Mutex<Vec<(String, String)>>,
    permanent: Mutex<HashSet<String>>,
    transient: Mutex<HashSet<String>>,
}

impl FakeOutbox {
    pub fn gone(&self, target: &str) {
        self.permanent.lock().insert(target.to_string());
    }

    pub fn flaky(&self, target: &str) {
        self.transient.lock().insert(target.to_string());
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Outbox for FakeOutbox {
    async fn send(&self, target: &str, text: &str) -> Delivery {
        if self.permanent.lock().contains(target) {
            return Delivery::Permanent(format!("{target} is gone"));
        }
        if self.transient.lock().contains(target) {
            return Delivery::Transient("connection reset".to_string());
        }
        self.sent.lock().push((target.to_string(), text.to_string()));
        Delivery::Sent
    }
}
