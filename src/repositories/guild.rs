//! # Guild Repository
//!
//! Reads and writes rows of the guilds table through the query builder.

use migration::{GUILDS_TABLE, QueryBuilder, QueryError, RawSql, WriteResult};
use sea_orm::{DatabaseConnection, QueryResult, TryGetable};
use serde_json::Value;

use crate::error::CacheError;
use crate::models::{GuildRow, GuildTransformer};

const COLUMNS: [&str; 7] = ["id", "name", "locale", "prefix", "levels", "modlog", "channels"];

/// Repository for guild rows.
pub struct GuildRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> GuildRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(&self, guild_id: &str) -> Result<Option<GuildRow>, QueryError> {
        let Some(row) = QueryBuilder::table(GUILDS_TABLE)
            .select(COLUMNS)
            .where_eq("id", guild_id)
            .first(self.db)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(GuildRow {
            id: column(&row, "id")?,
            name: column(&row, "name")?,
            locale: column(&row, "locale")?,
            prefix: column(&row, "prefix")?,
            levels: column(&row, "levels")?,
            modlog: column(&row, "modlog")?,
            channels: column(&row, "channels")?,
        }))
    }

    /// Write the channels document, any changed scalar columns and `updated_at`.
    ///
    /// Zero affected rows means the guild row is gone: [`CacheError::TenantNotFound`].
    pub async fn save(&self, guild: &GuildTransformer) -> Result<WriteResult, CacheError> {
        let document = guild
            .channels_to_json()
            .map_err(|source| CacheError::Serialize {
                guild_id: guild.id().to_string(),
                source,
            })?;

        let result = QueryBuilder::table(GUILDS_TABLE)
            .where_eq("id", guild.id())
            .update(self.db, |row| {
                row.set_raw("channels", RawSql::json(&document));
                for (column, value) in guild.dirty_scalars() {
                    row.set(column, bind(value));
                }
                row.set_now("updated_at");
            })
            .await?;

        if result.is_empty() {
            return Err(CacheError::tenant_not_found(guild.id()));
        }
        Ok(result)
    }

    /// Insert a bare guild row. Provisioning normally happens outside this crate.
    pub async fn create(&self, guild_id: &str, name: &str) -> Result<WriteResult, QueryError> {
        QueryBuilder::table(GUILDS_TABLE)
            .insert(self.db, |row| {
                row.set("id", guild_id).set("name", name);
            })
            .await
    }
}

fn column<T: TryGetable>(row: &QueryResult, name: &str) -> Result<T, QueryError> {
    row.try_get("", name)
        .map_err(|source| QueryError::decode(name, source))
}

/// Scalar settings are plain text and boolean columns, never JSON.
fn bind(value: Value) -> sea_orm::Value {
    match value {
        Value::Bool(flag) => flag.into(),
        Value::String(text) => text.into(),
        Value::Null => sea_orm::Value::String(None),
        other => other.to_string().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;
    use sea_orm::Database;
    use serde_json::json;

    async fn setup() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        run_migrations(&db).await.unwrap();
        db
    }

    #[tokio::test]
    async fn find_missing_guild_returns_none() {
        let db = setup().await;
        assert!(GuildRepository::new(&db).find("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn created_guild_has_column_defaults() {
        let db = setup().await;
        let repo = GuildRepository::new(&db);
        repo.create("G1", "Guild One").await.unwrap();

        let row = repo.find("G1").await.unwrap().unwrap();
        assert_eq!(row.name, "Guild One");
        assert_eq!(row.locale.as_deref(), Some("en_US"));
        assert!(!row.levels);
        assert!(row.channels.is_none());
    }

    #[tokio::test]
    async fn save_writes_channels_and_dirty_scalars() {
        let db = setup().await;
        let repo = GuildRepository::new(&db);
        repo.create("G1", "Guild One").await.unwrap();

        let mut guild = GuildTransformer::from_row(repo.find("G1").await.unwrap().unwrap());
        guild.set_prefix(Some("?")).unwrap();
        guild.set_levels(true);
        guild
            .channel_mut("C1")
            .welcome_mut()
            .set_message(Some("it's nice here".to_string()))
            .unwrap();
        repo.save(&guild).await.unwrap();

        let row = repo.find("G1").await.unwrap().unwrap();
        assert_eq!(row.prefix.as_deref(), Some("?"));
        assert!(row.levels);
        let stored: Value = serde_json::from_str(row.channels.as_deref().unwrap()).unwrap();
        assert_eq!(stored["C1"]["welcome"]["message"], json!("it's nice here"));
    }

    #[tokio::test]
    async fn save_of_missing_guild_is_tenant_not_found() {
        let db = setup().await;
        let guild = GuildTransformer::from_row(GuildRow {
            id: "ghost".to_string(),
            ..GuildRow::default()
        });

        let err = GuildRepository::new(&db).save(&guild).await.unwrap_err();
        assert!(matches!(err, CacheError::TenantNotFound { ref guild_id } if guild_id == "ghost"));
    }
}
