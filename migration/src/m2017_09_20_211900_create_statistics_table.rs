//! Creates the bot-wide statistics table and seeds its single row.

use sea_orm_migration::prelude::*;

use crate::error::StoreError;
use crate::query::QueryBuilder;
use crate::runner::MigrationUnit;
use crate::schema::Schema;

pub const STATISTICS_TABLE: &str = "statistics";

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationUnit for Migration {
    fn created_at(&self) -> &str {
        "Wed, Sep 20, 2017 9:19 PM"
    }

    async fn up(&self, schema: &Schema<'_>) -> Result<(), StoreError> {
        schema
            .create_if_not_exists(STATISTICS_TABLE, |table| {
                table.big_integer("respects").unsigned().default(0i64);
                table.timestamps();
            })
            .await?;

        let seeded = QueryBuilder::table(STATISTICS_TABLE)
            .first(schema.connection())
            .await?;
        if seeded.is_none() {
            QueryBuilder::table(STATISTICS_TABLE)
                .insert(schema.connection(), |row| {
                    row.set("respects", 0i64);
                })
                .await?;
        }
        Ok(())
    }

    async fn down(&self, schema: &Schema<'_>) -> Result<(), StoreError> {
        schema.drop_if_exists(STATISTICS_TABLE).await?;
        Ok(())
    }
}
