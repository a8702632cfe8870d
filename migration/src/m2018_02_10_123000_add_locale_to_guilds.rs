use sea_orm_migration::prelude::*;

use crate::error::StoreError;
use crate::m2017_09_21_180000_create_guilds_table::GUILDS_TABLE;
use crate::runner::MigrationUnit;
use crate::schema::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationUnit for Migration {
    fn created_at(&self) -> &str {
        "2018-02-10 12:30"
    }

    async fn up(&self, schema: &Schema<'_>) -> Result<(), StoreError> {
        schema
            .add_columns_if_not_exists(GUILDS_TABLE, |table| {
                table.string("locale", 12).default("en_US");
            })
            .await?;
        Ok(())
    }

    async fn down(&self, schema: &Schema<'_>) -> Result<(), StoreError> {
        schema.drop_column_if_exists(GUILDS_TABLE, "locale").await?;
        Ok(())
    }
}
