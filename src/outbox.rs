use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use irc::proto::{Command, Message, Response};
use plugin_core::{Delivery, Outbox};

/// Targets the bot can't talk to anymore: channels it was kicked or banned
/// from, channels and nicks the server reported as nonexistent.
/// Joining a channel again, or hearing from a nick, clears the mark.
#[derive(Debug, Default)]
pub struct DepartedChannels {
    channels: Mutex<HashSet<String>>,
}

impl DepartedChannels {
    pub fn observe(&self, own_nick: &str, msg: &Message) {
        if let Some(nick) = msg.source_nickname() {
            if nick != own_nick {
                self.clear(nick);
            }
        }

        match &msg.command {
            Command::KICK(chan, nick, _) if nick == own_nick => {
                log::warn!("Kicked from {}", chan);
                self.mark(chan);
            }
            Command::JOIN(chans, _, _) if msg.source_nickname() == Some(own_nick) => {
                for chan in chans.split(',') {
                    self.clear(chan);
                }
            }
            Command::Response(
                Response::ERR_NOSUCHNICK
                | Response::ERR_NOSUCHCHANNEL
                | Response::ERR_CANNOTSENDTOCHAN
                | Response::ERR_BANNEDFROMCHAN,
                args,
            ) => {
                // args: our nick, the target, a human readable reason
                if let Some(chan) = args.get(1) {
                    log::warn!("Cannot talk to {}: {:?}", chan, args.get(2));
                    self.mark(chan);
                }
            }
            _ => (),
        }
    }

    pub fn contains(&self, target: &str) -> bool {
        self.channels
            .lock()
            .expect("departed channels lock")
            .contains(&target.to_lowercase())
    }

    /// Deliver through `send` unless the target is known to be unreachable.
    /// Errors of the client are transient, the connection may come back.
    pub fn deliver<F>(&self, target: &str, send: F) -> Delivery
    where
        F: FnOnce() -> irc::error::Result<()>,
    {
        if self.contains(target) {
            return Delivery::Permanent(format!("cannot reach {} anymore", target));
        }
        match send() {
            Ok(()) => Delivery::Sent,
            Err(err) => Delivery::Transient(err.to_string()),
        }
    }

    fn mark(&self, target: &str) {
        self.channels
            .lock()
            .expect("departed channels lock")
            .insert(target.to_lowercase());
    }

    fn clear(&self, target: &str) {
        self.channels
            .lock()
            .expect("departed channels lock")
            .remove(&target.to_lowercase());
    }
}

pub struct IrcOutbox {
    client: Arc<Mutex<irc::client::Client>>,
    departed: Arc<DepartedChannels>,
}

impl IrcOutbox {
    pub fn new(client: Arc<Mutex<irc::client::Client>>, departed: Arc<DepartedChannels>) -> Self {
        IrcOutbox { client, departed }
    }
}

#[async_trait]
impl Outbox for IrcOutbox {
    async fn send(&self, target: &str, text: &str) -> Delivery {
        self.departed.deliver(target, || {
            let client = self.client.lock().expect("lock golem irc client");
            client.send_privmsg(target, text)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn observe_all(departed: &DepartedChannels, lines: &[&str]) {
        for line in lines {
            let msg: Message = line.parse().expect("valid irc line");
            departed.observe("golem", &msg);
        }
    }

    #[test]
    fn test_kick_and_rejoin() {
        let departed = DepartedChannels::default();
        observe_all(&departed, &[":op!o@host KICK #Rust golem :bye"]);
        assert_eq!(departed.contains("#rust"), true);

        observe_all(&departed, &[":golem!g@host JOIN #rust"]);
        assert_eq!(departed.contains("#rust"), false);
    }

    #[test]
    fn test_kicking_someone_else() {
        let departed = DepartedChannels::default();
        observe_all(&departed, &[":op!o@host KICK #rust charlie :bye"]);
        assert_eq!(departed.contains("#rust"), false);
    }

    #[test]
    fn test_server_errors_mark_channel() {
        let departed = DepartedChannels::default();
        observe_all(
            &departed,
            &[
                ":irc.server 404 golem #quiet :Cannot send to channel",
                ":irc.server 403 golem #gone :No such channel",
                ":irc.server 474 golem #banned :Cannot join channel (+b)",
                ":irc.server 401 golem Charlie :No such nick/channel",
            ],
        );
        assert!(departed.contains("#quiet"));
        assert!(departed.contains("#gone"));
        assert!(departed.contains("#banned"));
        assert!(departed.contains("charlie"));
        assert!(!departed.contains("#elsewhere"));
    }

    #[test]
    fn test_returning_nick_is_reachable_again() {
        let departed = DepartedChannels::default();
        observe_all(&departed, &[":irc.server 401 golem charlie :No such nick/channel"]);
        assert!(departed.contains("charlie"));

        observe_all(&departed, &[":Charlie!c@host PRIVMSG golem :&list"]);
        assert!(!departed.contains("charlie"));
    }

    #[test]
    fn test_deliver_to_departed_target() {
        let departed = DepartedChannels::default();
        observe_all(&departed, &[":op!o@host KICK #rust golem :bye"]);

        let mut called = false;
        let delivery = departed.deliver("#Rust", || {
            called = true;
            Ok(())
        });
        assert!(matches!(delivery, Delivery::Permanent(_)));
        assert!(!called, "nothing sent to a departed channel");
    }

    #[test]
    fn test_deliver_classifies_client_errors() {
        let departed = DepartedChannels::default();

        assert_eq!(departed.deliver("#rust", || Ok(())), Delivery::Sent);

        let delivery = departed.deliver("#rust", || {
            Err(irc::error::Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection lost",
            )))
        });
        assert!(matches!(delivery, Delivery::Transient(_)));
    }
}
