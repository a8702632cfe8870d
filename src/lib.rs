//! # guildcfg
//!
//! Schema migrations and a per-guild settings cache for a chat bot.
//!
//! Startup order is enforced by types: [`db::run_migrations`] yields the
//! [`db::SchemaReady`] token that [`cache::GuildCache::new`] requires.

pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod telemetry;
pub use migration;
