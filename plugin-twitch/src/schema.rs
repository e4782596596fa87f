table! {
    subscriptions (chat_id, broadcaster_id) {
        chat_id -> Text,
        broadcaster_id -> Text,
        display_name -> Text,
        position -> Integer,
    }
}
