//! Test utilities for database testing.
//!
//! Sets up in-memory SQLite databases with every migration applied.

use anyhow::Result;
use guildcfg::{
    cache::GuildCache,
    db::{SchemaReady, run_migrations},
    repositories::GuildRepository,
};
use migration::{GUILDS_TABLE, QueryBuilder};
use sea_orm::{Database, DatabaseConnection};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<(DatabaseConnection, SchemaReady)> {
    let db = Database::connect("sqlite::memory:").await?;
    let ready = run_migrations(&db).await?;
    Ok((db, ready))
}

/// A cache over a fresh database, plus a handle to that database.
#[allow(dead_code)]
pub async fn setup_test_cache() -> Result<(GuildCache, DatabaseConnection)> {
    let (db, ready) = setup_test_db().await?;
    Ok((GuildCache::new(db.clone(), ready), db))
}

/// Inserts a guild row, optionally with a raw channels document.
#[allow(dead_code)]
pub async fn create_test_guild(
    db: &DatabaseConnection,
    guild_id: &str,
    channels: Option<&str>,
) -> Result<()> {
    GuildRepository::new(db).create(guild_id, "Test Guild").await?;
    if let Some(channels) = channels {
        QueryBuilder::table(GUILDS_TABLE)
            .where_eq("id", guild_id)
            .update(db, |row| {
                row.set("channels", channels);
            })
            .await?;
    }
    Ok(())
}

/// The channels column exactly as stored.
#[allow(dead_code)]
pub async fn stored_channels(db: &DatabaseConnection, guild_id: &str) -> Result<Option<String>> {
    let row = GuildRepository::new(db).find(guild_id).await?;
    Ok(row.and_then(|row| row.channels))
}

#[allow(dead_code)]
pub async fn guild_count(db: &DatabaseConnection) -> Result<usize> {
    Ok(QueryBuilder::table(GUILDS_TABLE).get(db).await?.len())
}
