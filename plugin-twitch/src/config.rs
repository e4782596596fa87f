use std::path::Path;

use serde::Deserialize;
use twitch_api2::twitch_oauth2::{ClientId, ClientSecret};

const DEFAULT_STALENESS_WINDOW_SECS: u64 = 300;
const DEFAULT_CLOCK_SKEW_SECS: u64 = 30;

#[derive(Deserialize)]
#[serde(transparent)]
pub struct Obfuscated(pub String);

impl std::fmt::Debug for Obfuscated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<Obfuscated string>")?;
        Ok(())
    }
}

impl std::clone::Clone for Obfuscated {
    fn clone(&self) -> Self {
        Obfuscated(self.0.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    /// Secret shared with twitch to sign eventsub notifications
    pub app_secret: Obfuscated,
    pub webhook_bind: String,
    pub webhook_port: u16,
    /// Public url twitch will post eventsub notifications to
    pub callback_uri: Obfuscated,
    /// sqlite file holding the subscriptions of every chat
    pub db_path: String,
    /// Notifications for streams started longer ago than that are dropped
    pub staleness_window_secs: Option<u64>,
    pub clock_skew_secs: Option<u64>,
}

// tmp struct to parse the config from a file with other stuff in it
#[derive(Deserialize)]
struct TC {
    twitch: Config,
}

impl Config {
    /// read config from a file where it's under a key
    /// named "twitch"
    pub fn from_file_keyed<P>(p: P) -> Result<Self, serde_dhall::Error>
    where
        P: AsRef<Path>,
    {
        let tmp: TC = serde_dhall::from_file(p).parse()?;
        Ok(tmp.twitch)
    }

    pub fn staleness_window(&self) -> time::Duration {
        let secs = self
            .staleness_window_secs
            .unwrap_or(DEFAULT_STALENESS_WINDOW_SECS);
        time::Duration::seconds(secs as i64)
    }

    pub fn clock_skew(&self) -> time::Duration {
        let secs = self.clock_skew_secs.unwrap_or(DEFAULT_CLOCK_SKEW_SECS);
        time::Duration::seconds(secs as i64)
    }
}
