//! Schema migrations for guildcfg.
//!
//! This crate owns the schema builder, the parameterized query builder, the
//! migration runner and the static registry of migration units.

pub mod error;
pub mod query;
pub mod runner;
pub mod schema;

mod m2017_09_20_211900_create_statistics_table;
mod m2017_09_21_180000_create_guilds_table;
mod m2018_02_10_123000_add_locale_to_guilds;

use sea_orm::DatabaseConnection;

pub use error::{Direction, MigrationError, QueryError, SchemaError, StoreError};
pub use m2017_09_20_211900_create_statistics_table::STATISTICS_TABLE;
pub use m2017_09_21_180000_create_guilds_table::GUILDS_TABLE;
pub use query::{ChangeSet, Collection, Operator, QueryBuilder, RawSql, WriteResult};
pub use runner::{LEDGER_TABLE, MigrationRecord, MigrationRunner, MigrationStatus, MigrationUnit};
pub use schema::{Blueprint, ColumnSpec, ColumnType, Schema};
pub use sea_orm_migration::MigrationName;

pub struct Migrator;

impl Migrator {
    /// Every unit shipped with the binary. Registration order is irrelevant;
    /// the runner orders units by `created_at`.
    pub fn migrations() -> Vec<Box<dyn MigrationUnit>> {
        vec![
            Box::new(m2017_09_20_211900_create_statistics_table::Migration),
            Box::new(m2017_09_21_180000_create_guilds_table::Migration),
            Box::new(m2018_02_10_123000_add_locale_to_guilds::Migration),
        ]
    }

    pub fn runner(db: &DatabaseConnection) -> MigrationRunner<'_> {
        MigrationRunner::new(db, Self::migrations())
    }
}
