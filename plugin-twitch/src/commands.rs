//! Chat commands to manage the subscriptions of a chat, each one answered
//! with a single line of text.

use std::sync::Arc;

use plugin_core::utils::parser;

use crate::directory::StreamDirectory;
use crate::errors::DirectoryError;
use crate::index::ChatId;
use crate::registry::{
    SubscribeOutcome, SubscriptionRegistry, UnsubscribeOutcome, MAX_SUBSCRIPTIONS_PER_CHAT,
};

const HELP: &str = "&sub <channel> − get notified when the channel goes live. \
                    &unsub <channel> − stop that. \
                    &unsub_all − drop every subscription of this chat. \
                    &import <account> − subscribe to the channels followed by the account. \
                    &list − show the subscriptions of this chat. \
                    &about − what this bot is.";

const ABOUT: &str = "I announce when twitch streams go live. Each channel, and each private \
                     chat with me, picks its own streams. Ask &help for the commands.";

const TRY_LATER: &str = "Something went wrong, try again later.";

#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Sub(Option<&'a str>),
    Unsub(Option<&'a str>),
    UnsubAll,
    Import(Option<&'a str>),
    List,
    About,
    Help,
}

pub fn parse(input: &str) -> Option<Command<'_>> {
    if let Some(arg) = parser::command_with_arg("sub", input) {
        return Some(Command::Sub(arg));
    }
    if let Some(arg) = parser::command_with_arg("unsub", input) {
        return Some(Command::Unsub(arg));
    }
    if let Some(arg) = parser::command_with_arg("import", input) {
        return Some(Command::Import(arg));
    }
    if parser::single_command("unsub_all", input).is_some() {
        return Some(Command::UnsubAll);
    }
    if parser::single_command("list", input).is_some() {
        return Some(Command::List);
    }
    if parser::single_command("about", input).is_some() {
        return Some(Command::About);
    }
    if parser::single_command("help", input).is_some() {
        return Some(Command::Help);
    }
    None
}

#[derive(Debug, Default)]
struct ImportTally {
    added: usize,
    already: usize,
    over_limit: usize,
    failed: usize,
}

pub struct CommandFacade {
    registry: Arc<SubscriptionRegistry>,
    directory: Arc<dyn StreamDirectory>,
}

impl CommandFacade {
    pub fn new(registry: Arc<SubscriptionRegistry>, directory: Arc<dyn StreamDirectory>) -> Self {
        CommandFacade {
            registry,
            directory,
        }
    }

    pub async fn handle(&self, chat: &ChatId, command: Command<'_>) -> String {
        match command {
            Command::Sub(None) => "Usage: &sub <channel>".to_string(),
            Command::Sub(Some(name)) => self.sub(chat, name).await,
            Command::Unsub(None) => "Usage: &unsub <channel>".to_string(),
            Command::Unsub(Some(name)) => self.unsub(chat, name).await,
            Command::UnsubAll => self.unsub_all(chat).await,
            Command::Import(None) => "Usage: &import <account>".to_string(),
            Command::Import(Some(account)) => self.import(chat, account).await,
            Command::List => {
                let names = self.registry.list(chat).await;
                if names.is_empty() {
                    "No subscription here yet.".to_string()
                } else {
                    format!("Subscriptions: {}", names.join(", "))
                }
            }
            Command::About => ABOUT.to_string(),
            Command::Help => HELP.to_string(),
        }
    }

    async fn sub(&self, chat: &ChatId, name: &str) -> String {
        let broadcaster = match self.directory.resolve_broadcaster(name).await {
            Ok(b) => b,
            Err(err) => return directory_error_message(name, err),
        };

        match self.registry.subscribe(chat, &broadcaster.id, name).await {
            Ok(SubscribeOutcome::Subscribed) => {
                format!("You'll be notified when {name} goes live.")
            }
            Ok(SubscribeOutcome::AlreadySubscribed) => format!("Already subscribed to {name}."),
            Ok(SubscribeOutcome::LimitExceeded) => format!(
                "Cannot follow more than {MAX_SUBSCRIPTIONS_PER_CHAT} channels here, unsubscribe from some first."
            ),
            Ok(SubscribeOutcome::UpstreamError(_)) => {
                format!("Twitch refused the subscription to {name}, try again later.")
            }
            Err(err) => {
                log::error!("sub {name} for {chat} failed: {err:?}");
                TRY_LATER.to_string()
            }
        }
    }

    async fn unsub(&self, chat: &ChatId, name: &str) -> String {
        let broadcaster = match self.registry.find_by_name(chat, name).await {
            Some(id) => Some(id),
            // the chat may know the broadcaster under another name
            None => self
                .directory
                .resolve_broadcaster(name)
                .await
                .ok()
                .map(|b| b.id),
        };

        let outcome = match broadcaster {
            Some(id) => self.registry.unsubscribe(chat, &id).await,
            None => Ok(UnsubscribeOutcome::NotSubscribed),
        };

        match outcome {
            Ok(UnsubscribeOutcome::Unsubscribed { display_name }) => {
                format!("You won't be notified for {display_name} anymore.")
            }
            Ok(UnsubscribeOutcome::NotSubscribed) => {
                format!("You weren't subscribed to {name}, so we're good here.")
            }
            Err(err) => {
                log::error!("unsub {name} for {chat} failed: {err:?}");
                TRY_LATER.to_string()
            }
        }
    }

    async fn unsub_all(&self, chat: &ChatId) -> String {
        match self.registry.unsubscribe_all(chat).await {
            Ok(0) => "No subscription here, so we're good here.".to_string(),
            Ok(n) => format!("Removed {n} subscriptions."),
            Err(err) => {
                log::error!("unsub_all for {chat} failed: {err:?}");
                TRY_LATER.to_string()
            }
        }
    }

    async fn import(&self, chat: &ChatId, account: &str) -> String {
        let user = match self.directory.resolve_broadcaster(account).await {
            Ok(user) => user,
            Err(err) => return directory_error_message(account, err),
        };
        let followed = match self.directory.followed_channels(&user.id).await {
            Ok(followed) => followed,
            Err(err) => return directory_error_message(account, err),
        };
        if followed.channels.is_empty() {
            return format!("{account} follows no other account.");
        }

        let mut tally = ImportTally::default();
        for (id, name) in &followed.channels {
            match self.registry.subscribe(chat, id, name).await {
                Ok(SubscribeOutcome::Subscribed) => tally.added += 1,
                Ok(SubscribeOutcome::AlreadySubscribed) => tally.already += 1,
                Ok(SubscribeOutcome::LimitExceeded) => tally.over_limit += 1,
                Ok(SubscribeOutcome::UpstreamError(_)) => tally.failed += 1,
                Err(err) => {
                    log::error!("import of {name} for {chat} failed: {err:?}");
                    tally.failed += 1;
                }
            }
        }

        let mut message = format!(
            "Imported {} channels followed by {account} ({} already there, {} over the limit, {} failed).",
            tally.added, tally.already, tally.over_limit, tally.failed
        );
        if followed.truncated {
            message.push_str(" Only the first 100 follows were considered.");
        }
        message
    }
}

fn directory_error_message(name: &str, err: DirectoryError) -> String {
    match err {
        DirectoryError::NotFound(_) => format!("Cannot find {name} on twitch, check the spelling."),
        err => {
            log::warn!("twitch lookup for {name} failed: {err}");
            "Cannot reach twitch right now, try again later.".to_string()
        }
    }
}
