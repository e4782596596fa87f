#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;

pub mod commands;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod helix;
pub mod index;
mod plugin;
pub mod registry;
mod schema;
pub mod store;
mod webhook_server;

#[cfg(test)]
mod test_utils;

pub use plugin::Twitch;
