//! # Guild Cache
//!
//! Process-wide map from guild id to its loaded [`GuildTransformer`].
//!
//! Each guild has its own async mutex. A mutate-then-persist sequence holds
//! that mutex from the mutation through the database write, so concurrent
//! commands on one guild cannot lose each other's changes. Different guilds
//! never wait on each other except for the brief map lookup.
//!
//! A slot holding `None` is not loaded. Slots are never removed, so a mutex
//! handed out for a guild stays the only mutex for that guild.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::db::SchemaReady;
use crate::error::{CacheError, SettingsError};
use crate::models::GuildTransformer;
use crate::repositories::GuildRepository;

type Slot = Arc<Mutex<Option<GuildTransformer>>>;

pub struct GuildCache {
    db: DatabaseConnection,
    entries: RwLock<HashMap<String, Slot>>,
}

impl GuildCache {
    /// Requires a [`SchemaReady`] token, which only a completed migration pass produces.
    pub fn new(db: DatabaseConnection, _ready: SchemaReady) -> Self {
        Self {
            db,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A snapshot of the guild's settings, loading them on first access.
    pub async fn get(&self, guild_id: &str) -> Result<GuildTransformer, CacheError> {
        let slot = self.slot(guild_id).await;
        let mut entry = slot.lock().await;
        let guild = self.load_into(guild_id, &mut entry).await?;
        Ok(guild.clone())
    }

    /// Mutate the cached settings without writing them. Call [`GuildCache::persist`] later.
    pub async fn modify<F, R>(&self, guild_id: &str, mutate: F) -> Result<R, CacheError>
    where
        F: FnOnce(&mut GuildTransformer) -> Result<R, SettingsError>,
    {
        let slot = self.slot(guild_id).await;
        let mut entry = slot.lock().await;
        let guild = self.load_into(guild_id, &mut entry).await?;
        match mutate(&mut *guild) {
            Ok(output) => Ok(output),
            Err(err) => {
                // The closure may have applied part of its changes.
                *entry = None;
                Err(err.into())
            }
        }
    }

    /// Mutate and persist as one critical section for this guild.
    ///
    /// The guild is taken out of its slot while the write is in flight and put
    /// back only once the store accepted it. A failure, or the future being
    /// dropped mid-write, leaves the slot empty so the next access reloads
    /// what the store actually holds.
    pub async fn update<F, R>(&self, guild_id: &str, mutate: F) -> Result<R, CacheError>
    where
        F: FnOnce(&mut GuildTransformer) -> Result<R, SettingsError>,
    {
        let slot = self.slot(guild_id).await;
        let mut entry = slot.lock().await;
        let mut guild = self.take_or_load(guild_id, &mut entry).await?;

        let output = mutate(&mut guild)?;

        match GuildRepository::new(&self.db).save(&guild).await {
            Ok(_) => {
                guild.mark_saved();
                *entry = Some(guild);
                debug!(guild_id, "guild settings persisted");
                Ok(output)
            }
            Err(err) => {
                warn!(guild_id, error = %err, "failed to persist guild settings");
                Err(err)
            }
        }
    }

    /// Write the cached settings back to the store.
    pub async fn persist(&self, guild_id: &str) -> Result<(), CacheError> {
        self.update(guild_id, |_| Ok(())).await
    }

    /// Forget the cached copy; the next access reloads from the store.
    pub async fn invalidate(&self, guild_id: &str) {
        let slot = self.entries.read().await.get(guild_id).cloned();
        if let Some(slot) = slot {
            *slot.lock().await = None;
            info!(guild_id, "guild cache entry invalidated");
        }
    }

    pub async fn is_cached(&self, guild_id: &str) -> bool {
        let slot = self.entries.read().await.get(guild_id).cloned();
        match slot {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    async fn slot(&self, guild_id: &str) -> Slot {
        if let Some(slot) = self.entries.read().await.get(guild_id) {
            return Arc::clone(slot);
        }
        let mut entries = self.entries.write().await;
        Arc::clone(entries.entry(guild_id.to_string()).or_default())
    }

    async fn load_into<'e>(
        &self,
        guild_id: &str,
        entry: &'e mut Option<GuildTransformer>,
    ) -> Result<&'e mut GuildTransformer, CacheError> {
        let guild = self.take_or_load(guild_id, entry).await?;
        Ok(entry.insert(guild))
    }

    /// Removes the cached guild from `entry`, reading it from the store on a miss.
    async fn take_or_load(
        &self,
        guild_id: &str,
        entry: &mut Option<GuildTransformer>,
    ) -> Result<GuildTransformer, CacheError> {
        if let Some(guild) = entry.take() {
            return Ok(guild);
        }
        let row = GuildRepository::new(&self.db)
            .find(guild_id)
            .await?
            .ok_or_else(|| CacheError::tenant_not_found(guild_id))?;
        debug!(guild_id, "guild settings loaded");
        Ok(GuildTransformer::from_row(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;
    use sea_orm::{Database, TransactionTrait};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn setup() -> GuildCache {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let ready = run_migrations(&db).await.unwrap();
        GuildRepository::new(&db).create("G1", "Guild One").await.unwrap();
        GuildCache::new(db, ready)
    }

    #[tokio::test]
    async fn get_loads_lazily() {
        let cache = setup().await;
        assert!(!cache.is_cached("G1").await);

        let guild = cache.get("G1").await.unwrap();
        assert_eq!(guild.name(), "Guild One");
        assert!(cache.is_cached("G1").await);
    }

    #[tokio::test]
    async fn missing_guild_is_not_cached() {
        let cache = setup().await;
        let err = cache.get("G404").await.unwrap_err();
        assert!(matches!(err, CacheError::TenantNotFound { .. }));
        assert!(!cache.is_cached("G404").await);
    }

    #[tokio::test]
    async fn rejected_mutation_discards_partial_changes() {
        let cache = setup().await;
        let err = cache
            .update("G1", |guild| {
                guild.set_levels(true);
                guild.channel_mut("C1").slowmode_mut().set_limit(31)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Settings(_)));

        let guild = cache.get("G1").await.unwrap();
        assert!(!guild.levels());
        assert!(guild.channel("C1").is_none());
    }

    #[tokio::test]
    async fn modify_then_persist() {
        let cache = setup().await;
        cache
            .modify("G1", |guild| {
                guild.set_locale("nb_NO")?;
                Ok(())
            })
            .await
            .unwrap();
        cache.persist("G1").await.unwrap();
        cache.invalidate("G1").await;

        assert_eq!(cache.get("G1").await.unwrap().locale(), "nb_NO");
    }

    #[tokio::test]
    async fn dropped_update_leaves_no_unsaved_changes_behind() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let ready = run_migrations(&db).await.unwrap();
        GuildRepository::new(&db).create("G1", "Guild One").await.unwrap();
        let cache = GuildCache::new(db.clone(), ready);
        cache.get("G1").await.unwrap();

        // Pin the only connection so the save cannot finish.
        let txn = db.begin().await.unwrap();
        let outcome = timeout(
            Duration::from_millis(300),
            cache.update("G1", |guild| {
                guild.channel_mut("C1").slowmode_mut().enable(3, 9)
            }),
        )
        .await;
        assert!(outcome.is_err());
        txn.rollback().await.unwrap();

        assert!(!cache.is_cached("G1").await);
        let guild = cache.get("G1").await.unwrap();
        assert!(guild.channel("C1").is_none());
        assert!(guild.dirty_scalars().is_empty());
    }
}
