use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use irc::client::prelude::Command as IrcCommand;
use irc::proto::Message as IrcMessage;
use plugin_core::{Outbox, Plugin, Result};
use tokio::sync::mpsc;

use crate::commands::{self, CommandFacade};
use crate::config::Config;
use crate::directory::StreamDirectory;
use crate::dispatcher::NotificationDispatcher;
use crate::errors::RegistryError;
use crate::helix::HelixDirectory;
use crate::index::ChatId;
use crate::registry::{RestoreReport, SubscriptionRegistry};
use crate::store::SubscriptionStore;
use crate::webhook_server;

pub struct Twitch {
    config: Config,
    directory: Arc<HelixDirectory>,
    registry: Arc<SubscriptionRegistry>,
    commands: CommandFacade,
}

#[async_trait]
impl Plugin for Twitch {
    async fn init(config_path: &str) -> Result<Self> {
        let config = Config::from_file_keyed(config_path)
            .with_context(|| format!("Cannot read twitch config from {config_path}"))?;

        let directory = Arc::new(
            HelixDirectory::new(&config)
                .await
                .context("Cannot connect to twitch")?,
        );

        let db_path = config.db_path.clone();
        let store = tokio::task::spawn_blocking(move || SubscriptionStore::open(&db_path))
            .await
            .context("Cannot open subscription store")?
            .context("Cannot open subscription store")?;

        let registry = Arc::new(SubscriptionRegistry::new(directory.clone(), store));
        let commands = CommandFacade::new(registry.clone(), directory.clone());

        Ok(Twitch {
            config,
            directory,
            registry,
            commands,
        })
    }

    fn get_name(&self) -> &'static str {
        "twitch"
    }

    async fn run(&self, outbox: Arc<dyn Outbox>) -> Result<()> {
        let (twitch_tx, twitch_rx) = mpsc::channel(50);
        let dispatcher = NotificationDispatcher::new(
            self.registry.clone(),
            self.directory.clone() as Arc<dyn StreamDirectory>,
            outbox,
            self.config.staleness_window(),
            self.config.clock_skew(),
        );

        // twitch checks every new subscription against the webhook,
        // so the server must be up while restoring
        let restore_and_dispatch = async {
            restore_subscriptions(&*self.directory, &self.registry)
                .await
                .context("Cannot restore subscriptions")?;
            dispatcher.run(twitch_rx).await;
            Err::<(), _>(anyhow::anyhow!("Twitch dispatcher exited"))
        };

        tokio::try_join!(
            restore_and_dispatch,
            webhook_server::run(&self.config, twitch_tx)
        )?;
        Ok(())
    }

    async fn in_message(&self, msg: &IrcMessage) -> Result<Option<IrcMessage>> {
        let response_target = match msg.response_target() {
            None => return Ok(None),
            Some(target) => target,
        };

        if let IrcCommand::PRIVMSG(_source, privmsg) = &msg.command {
            if let Some(command) = commands::parse(privmsg) {
                let chat = ChatId::new(response_target);
                let reply = self.commands.handle(&chat, command).await;
                return Ok(Some(
                    IrcCommand::PRIVMSG(response_target.to_string(), reply).into(),
                ));
            }
        }
        Ok(None)
    }
}

/// Clear what a previous run left upstream, then resubscribe for every
/// persisted chat. Only a broken store stops the startup.
async fn restore_subscriptions(
    directory: &dyn StreamDirectory,
    registry: &SubscriptionRegistry,
) -> std::result::Result<RestoreReport, RegistryError> {
    if let Err(err) = directory.reset().await {
        log::warn!("Cannot delete leftover eventsub subscriptions, restoring anyway: {err}");
    }
    registry.restore().await
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::TrackedBroadcaster;
    use crate::test_utils::{user_id, FakeDirectory};
    use pretty_assertions::assert_eq;

    fn store_with_nova() -> SubscriptionStore {
        let store = SubscriptionStore::in_memory();
        let nova = TrackedBroadcaster {
            id: user_id("42"),
            display_name: "nova".to_string(),
        };
        store.add(&ChatId::new("#a"), &nova).unwrap();
        store
    }

    #[tokio::test]
    async fn test_restore_replaces_leftovers() {
        let directory = Arc::new(FakeDirectory::default().with_leftover("old-sub", "42"));
        let registry = SubscriptionRegistry::new(directory.clone(), store_with_nova());

        let report = restore_subscriptions(&*directory, &registry)
            .await
            .unwrap();
        assert_eq!(report.broadcasters, 1);
        assert_eq!(directory.active_for("42"), 1);
        assert_ne!(
            directory.handle_for("42"),
            Some(twitch_api2::types::EventSubId::from("old-sub".to_string()))
        );
    }

    #[tokio::test]
    async fn test_failed_reset_still_restores() {
        let directory = Arc::new(FakeDirectory::default());
        directory.unreachable();
        let registry = SubscriptionRegistry::new(directory.clone(), store_with_nova());

        let report = restore_subscriptions(&*directory, &registry)
            .await
            .unwrap();
        assert_eq!(report.broadcasters, 1);
        assert_eq!(registry.list(&ChatId::new("#a")).await, vec!["nova"]);
    }
}
