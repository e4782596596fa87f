//! In-memory view of who tracks which broadcaster.
//!
//! Both sides only refer to each other through ids: chats list the
//! broadcaster ids they track (with their own display name for each), and
//! every broadcaster entry lists the chat ids subscribed to it together
//! with the handle of its upstream eventsub subscription.
//! `link` and `unlink` are the only ways to mutate it, and they always
//! update both sides.

use std::collections::{BTreeSet, HashMap};

use twitch_api2::types::{EventSubId, UserId};

/// An IRC target: a channel, or a nickname for private messages
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        ChatId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A broadcaster as seen by one chat.
/// The display name is whatever the chat used when subscribing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedBroadcaster {
    pub id: UserId,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct BroadcasterSubscription {
    pub handle: EventSubId,
    /// never empty, the entry is dropped with its last subscriber
    pub subscribers: BTreeSet<ChatId>,
}

/// Chats to notify when a broadcaster goes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTargets {
    pub broadcaster: UserId,
    /// chat and the name that chat uses for the broadcaster
    pub chats: Vec<(ChatId, String)>,
}

#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    /// in subscription order
    chats: HashMap<ChatId, Vec<TrackedBroadcaster>>,
    broadcasters: HashMap<UserId, BroadcasterSubscription>,
}

impl SubscriptionIndex {
    pub fn is_empty(&self) -> bool {
        self.chats.is_empty() && self.broadcasters.is_empty()
    }

    pub fn chat(&self, chat: &ChatId) -> &[TrackedBroadcaster] {
        self.chats.get(chat).map(|v| &v[..]).unwrap_or_default()
    }

    pub fn is_subscribed(&self, chat: &ChatId, broadcaster: &UserId) -> bool {
        self.chat(chat).iter().any(|t| &t.id == broadcaster)
    }

    pub fn broadcaster(&self, broadcaster: &UserId) -> Option<&BroadcasterSubscription> {
        self.broadcasters.get(broadcaster)
    }

    pub fn broadcaster_count(&self) -> usize {
        self.broadcasters.len()
    }

    /// Returns the upstream handle if `chat` is the only one left tracking
    /// `broadcaster`, that is, when unlinking it would orphan the subscription.
    pub fn sole_subscriber_handle(
        &self,
        chat: &ChatId,
        broadcaster: &UserId,
    ) -> Option<EventSubId> {
        self.broadcasters
            .get(broadcaster)
            .filter(|b| b.subscribers.len() == 1 && b.subscribers.contains(chat))
            .map(|b| b.handle.clone())
    }

    /// Case insensitive lookup of a broadcaster by the name a chat gave it
    pub fn find_by_name(&self, chat: &ChatId, display_name: &str) -> Option<&TrackedBroadcaster> {
        self.chat(chat)
            .iter()
            .find(|t| t.display_name.eq_ignore_ascii_case(display_name))
    }

    pub fn live_targets(&self, handle: &EventSubId) -> Option<LiveTargets> {
        let (id, sub) = self
            .broadcasters
            .iter()
            .find(|(_, sub)| &sub.handle == handle)?;

        let chats = sub
            .subscribers
            .iter()
            .filter_map(|chat| {
                self.chat(chat)
                    .iter()
                    .find(|t| &t.id == id)
                    .map(|t| (chat.clone(), t.display_name.clone()))
            })
            .collect();

        Some(LiveTargets {
            broadcaster: id.clone(),
            chats,
        })
    }

    /// Record that `chat` tracks `tracked`.
    /// `handle` is only kept when nobody was tracking that broadcaster yet.
    pub fn link(&mut self, chat: &ChatId, tracked: TrackedBroadcaster, handle: EventSubId) {
        let sub = self
            .broadcasters
            .entry(tracked.id.clone())
            .or_insert_with(|| BroadcasterSubscription {
                handle,
                subscribers: BTreeSet::new(),
            });
        if !sub.subscribers.insert(chat.clone()) {
            return;
        }
        self.chats.entry(chat.clone()).or_default().push(tracked);
    }

    /// Forget that `chat` tracks `broadcaster`. Chats and broadcasters
    /// left without any counterpart are removed.
    pub fn unlink(&mut self, chat: &ChatId, broadcaster: &UserId) -> Option<TrackedBroadcaster> {
        let tracked = self.chats.get_mut(chat).and_then(|tracked| {
            let pos = tracked.iter().position(|t| &t.id == broadcaster)?;
            Some(tracked.remove(pos))
        })?;

        if self.chat(chat).is_empty() {
            self.chats.remove(chat);
        }

        if let Some(sub) = self.broadcasters.get_mut(broadcaster) {
            sub.subscribers.remove(chat);
            if sub.subscribers.is_empty() {
                self.broadcasters.remove(broadcaster);
            }
        }

        Some(tracked)
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (chat, tracked) in &self.chats {
            assert!(!tracked.is_empty(), "empty chat entry for {chat}");
            for t in tracked {
                let sub = self
                    .broadcasters
                    .get(&t.id)
                    .unwrap_or_else(|| panic!("{chat} tracks {} without index entry", t.id));
                assert!(sub.subscribers.contains(chat));
            }
        }
        for (id, sub) in &self.broadcasters {
            assert!(!sub.subscribers.is_empty(), "empty subscriber set for {id}");
            for chat in &sub.subscribers {
                assert!(self.is_subscribed(chat, id), "{chat} missing {id}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tracked(id: &str, name: &str) -> TrackedBroadcaster {
        TrackedBroadcaster {
            id: UserId::from(id.to_string()),
            display_name: name.to_string(),
        }
    }

    fn handle(h: &str) -> EventSubId {
        EventSubId::from(h.to_string())
    }

    #[test]
    fn test_link_keeps_first_handle() {
        let mut index = SubscriptionIndex::default();
        let (a, b) = (ChatId::new("#a"), ChatId::new("#b"));
        index.link(&a, tracked("42", "nova"), handle("h1"));
        index.link(&b, tracked("42", "Nova"), handle("h2"));
        index.assert_consistent();

        let sub = index.broadcaster(&UserId::from("42".to_string())).unwrap();
        assert_eq!(sub.handle, handle("h1"));
        assert_eq!(sub.subscribers.len(), 2);
    }

    #[test]
    fn test_unlink_removes_empty_entries() {
        let mut index = SubscriptionIndex::default();
        let a = ChatId::new("#a");
        let id = UserId::from("42".to_string());
        index.link(&a, tracked("42", "nova"), handle("h1"));

        assert_eq!(
            index.sole_subscriber_handle(&a, &id),
            Some(handle("h1"))
        );
        assert_eq!(index.unlink(&a, &id), Some(tracked("42", "nova")));
        assert!(index.is_empty());
        assert_eq!(index.unlink(&a, &id), None, "second unlink is a no-op");
        index.assert_consistent();
    }

    #[test]
    fn test_live_targets_use_chat_names() {
        let mut index = SubscriptionIndex::default();
        let (a, b) = (ChatId::new("#a"), ChatId::new("#b"));
        index.link(&a, tracked("42", "nova"), handle("h1"));
        index.link(&b, tracked("42", "NovaTheGreat"), handle("h1"));
        index.link(&b, tracked("7", "other"), handle("h7"));

        let targets = index.live_targets(&handle("h1")).unwrap();
        assert_eq!(targets.broadcaster, UserId::from("42".to_string()));
        assert_eq!(
            targets.chats,
            vec![
                (a.clone(), "nova".to_string()),
                (b.clone(), "NovaTheGreat".to_string())
            ]
        );
        assert_eq!(index.live_targets(&handle("stale")), None);
    }

    #[test]
    fn test_chat_order_and_name_lookup() {
        let mut index = SubscriptionIndex::default();
        let a = ChatId::new("#a");
        index.link(&a, tracked("3", "zed"), handle("h3"));
        index.link(&a, tracked("1", "alpha"), handle("h1"));

        let names: Vec<_> = index.chat(&a).iter().map(|t| t.display_name.as_str()).collect();
        assert_eq!(names, vec!["zed", "alpha"]);
        assert_eq!(
            index.find_by_name(&a, "ALPHA").map(|t| t.id.clone()),
            Some(UserId::from("1".to_string()))
        );
        assert!(index.find_by_name(&ChatId::new("#b"), "alpha").is_none());
    }
}
