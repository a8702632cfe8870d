//! Creates the guilds table holding per-guild scalar settings and the channels document.

use sea_orm_migration::prelude::*;

use crate::error::StoreError;
use crate::runner::MigrationUnit;
use crate::schema::Schema;

pub const GUILDS_TABLE: &str = "guilds";

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationUnit for Migration {
    fn created_at(&self) -> &str {
        "2017-09-21 18:00"
    }

    async fn up(&self, schema: &Schema<'_>) -> Result<(), StoreError> {
        schema
            .create_if_not_exists(GUILDS_TABLE, |table| {
                table.string("id", 32).primary();
                table.string("name", 255);
                table.string("prefix", 32).nullable();
                table.boolean("levels").default(false);
                table.string("modlog", 32).nullable();
                table.text("channels").nullable();
                table.timestamps();
            })
            .await?;
        Ok(())
    }

    async fn down(&self, schema: &Schema<'_>) -> Result<(), StoreError> {
        schema.drop_if_exists(GUILDS_TABLE).await?;
        Ok(())
    }
}
