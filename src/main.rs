#[macro_use]
extern crate anyhow;

use anyhow::{Context, Result};
use irc::client::prelude::*;
use log::info;
use structopt::StructOpt;

mod golem;
mod outbox;

#[derive(Debug, StructOpt)]
struct Opt {
    /// list of channels to join
    #[structopt(long)]
    channels: Vec<String>,

    #[structopt(long, default_value = "livegolem")]
    nickname: String,

    #[structopt(long, default_value = "irc.libera.chat")]
    server: String,

    #[structopt(long, default_value = "6697")]
    port: u16,

    #[structopt(long)]
    disable_tls: bool,

    /// dhall file holding the bot and plugin configuration
    #[structopt(long, default_value = "golem_config.dhall")]
    config: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let opt = Opt::from_args();

    if opt.channels.is_empty() {
        return Err(anyhow!("No channels to join, aborting"));
    }

    info!("Joining channel(s): {:?}", opt.channels);
    let alt_nicks = vec![format!("{}_", opt.nickname), format!("{}__", opt.nickname)];

    let irc_config = Config {
        nickname: Some(opt.nickname),
        server: Some(opt.server),
        port: Some(opt.port),
        use_tls: Some(!opt.disable_tls),
        channels: opt.channels,
        alt_nicks,
        ..Config::default()
    };

    golem::Golem::new_from_config(irc_config, &opt.config)
        .await?
        .run()
        .await
        .context("golem crashed")?;

    Err(anyhow!("Golem exited!"))
}
