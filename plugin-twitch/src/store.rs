//! Durable chat -> broadcasters mapping, one sqlite row per (chat, broadcaster).
//! A chat without rows doesn't exist as far as the store is concerned.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use twitch_api2::types::UserId;

use crate::errors::StoreError;
use crate::index::{ChatId, TrackedBroadcaster};
use crate::schema::subscriptions::dsl;

embed_migrations!("./migrations/");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedChat {
    pub chat: ChatId,
    /// in subscription order
    pub broadcasters: Vec<TrackedBroadcaster>,
}

pub struct SubscriptionStore {
    conn: SqliteConnection,
}

impl std::fmt::Debug for SubscriptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStore")
            .field("conn", &"<SqliteConnection>")
            .finish()
    }
}

impl SubscriptionStore {
    /// Open (or create) the database and bring its schema up to date
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn =
            SqliteConnection::establish(db_path).map_err(|source| StoreError::Connection {
                path: db_path.to_string(),
                source,
            })?;
        embedded_migrations::run(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        Self::open(":memory:").expect("in memory sqlite db")
    }

    pub fn load_all(&self) -> Result<Vec<PersistedChat>, StoreError> {
        let rows = dsl::subscriptions
            .select((dsl::chat_id, dsl::broadcaster_id, dsl::display_name))
            .order((dsl::chat_id.asc(), dsl::position.asc()))
            .load::<(String, String, String)>(&self.conn)?;

        let mut chats: Vec<PersistedChat> = Vec::new();
        for (chat_id, broadcaster_id, display_name) in rows {
            let tracked = TrackedBroadcaster {
                id: UserId::from(broadcaster_id),
                display_name,
            };
            match chats.last_mut() {
                Some(last) if last.chat.as_str() == chat_id => last.broadcasters.push(tracked),
                _ => chats.push(PersistedChat {
                    chat: ChatId::new(chat_id),
                    broadcasters: vec![tracked],
                }),
            }
        }
        Ok(chats)
    }

    /// Append a broadcaster to the chat's list. Overwrites any leftover
    /// row for the same pair.
    pub fn add(&self, chat: &ChatId, tracked: &TrackedBroadcaster) -> Result<(), StoreError> {
        self.conn.transaction::<_, diesel::result::Error, _>(|| {
            let last_position = dsl::subscriptions
                .filter(dsl::chat_id.eq(chat.as_str()))
                .filter(dsl::broadcaster_id.ne(tracked.id.as_str()))
                .select(diesel::dsl::max(dsl::position))
                .first::<Option<i32>>(&self.conn)?;

            diesel::replace_into(dsl::subscriptions)
                .values((
                    dsl::chat_id.eq(chat.as_str()),
                    dsl::broadcaster_id.eq(tracked.id.as_str()),
                    dsl::display_name.eq(tracked.display_name.as_str()),
                    dsl::position.eq(last_position.map_or(0, |p| p + 1)),
                ))
                .execute(&self.conn)?;
            Ok(())
        })?;
        Ok(())
    }

    /// Number of broadcasters the chat holds, `except` aside. Counts rows
    /// which aren't in the index, like the ones a failed restore left.
    pub fn count_except(&self, chat: &ChatId, except: &UserId) -> Result<usize, StoreError> {
        let count = dsl::subscriptions
            .filter(dsl::chat_id.eq(chat.as_str()))
            .filter(dsl::broadcaster_id.ne(except.as_str()))
            .count()
            .get_result::<i64>(&self.conn)?;
        Ok(count as usize)
    }

    /// Returns the number of deleted rows
    pub fn remove(&self, chat: &ChatId, broadcaster: &UserId) -> Result<usize, StoreError> {
        let deleted = diesel::delete(
            dsl::subscriptions
                .filter(dsl::chat_id.eq(chat.as_str()))
                .filter(dsl::broadcaster_id.eq(broadcaster.as_str())),
        )
        .execute(&self.conn)?;
        Ok(deleted)
    }

    /// Drop every row of the chat, returns the number of deleted rows
    pub fn remove_chat(&self, chat: &ChatId) -> Result<usize, StoreError> {
        let deleted = diesel::delete(dsl::subscriptions.filter(dsl::chat_id.eq(chat.as_str())))
            .execute(&self.conn)?;
        Ok(deleted)
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

    #[test]
    fn test_load_groups_chats_in_subscription_order() {
        let store = SubscriptionStore::in_memory();
        let (a, b) = (ChatId::new("#a"), ChatId::new("#b"));
        store.add(&b, &tracked("1", "one")).unwrap();
        store.add(&a, &tracked("9", "nine")).unwrap();
        store.add(&a, &tracked("2", "two")).unwrap();

        assert_eq!(
            store.load_all().unwrap(),
            vec![
                PersistedChat {
                    chat: a,
                    broadcasters: vec![tracked("9", "nine"), tracked("2", "two")],
                },
                PersistedChat {
                    chat: b,
                    broadcasters: vec![tracked("1", "one")],
                },
            ]
        );
    }

    #[test]
    fn test_removing_last_row_removes_chat() {
        let store = SubscriptionStore::in_memory();
        let a = ChatId::new("#a");
        store.add(&a, &tracked("1", "one")).unwrap();

        assert_eq!(store.remove(&a, &UserId::from("1".to_string())).unwrap(), 1);
        assert_eq!(store.remove(&a, &UserId::from("1".to_string())).unwrap(), 0);
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_count_except() {
        let store = SubscriptionStore::in_memory();
        let a = ChatId::new("#a");
        store.add(&a, &tracked("1", "one")).unwrap();
        store.add(&a, &tracked("2", "two")).unwrap();
        store.add(&ChatId::new("#b"), &tracked("3", "three")).unwrap();

        assert_eq!(store.count_except(&a, &UserId::from("9".to_string())).unwrap(), 2);
        assert_eq!(store.count_except(&a, &UserId::from("1".to_string())).unwrap(), 1);
        assert_eq!(
            store
                .count_except(&ChatId::new("#nobody"), &UserId::from("1".to_string()))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_re_adding_replaces_leftover_row() {
        let store = SubscriptionStore::in_memory();
        let a = ChatId::new("#a");
        store.add(&a, &tracked("1", "one")).unwrap();
        store.add(&a, &tracked("2", "two")).unwrap();
        store.add(&a, &tracked("1", "uno")).unwrap();

        let chats = store.load_all().unwrap();
        assert_eq!(
            chats[0].broadcasters,
            vec![tracked("2", "two"), tracked("1", "uno")]
        );
        assert_eq!(store.remove_chat(&a).unwrap(), 2);
        assert!(store.load_all().unwrap().is_empty());
    }
}
