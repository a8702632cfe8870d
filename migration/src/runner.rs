//! Ordered application and rollback of migration units against a ledger table.
//!
//! Units are ordered by their `created_at` value, never by registration order.
//! Each unit runs in its own transaction together with its ledger write, so a
//! unit is either applied and recorded or neither.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDateTime, Utc};
use sea_orm::sea_query::Order;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, Statement,
    TransactionTrait,
};
use sea_orm_migration::MigrationName;
use tracing::{debug, info, warn};

use crate::error::{Direction, MigrationError, QueryError, StoreError};
use crate::query::QueryBuilder;
use crate::schema::Schema;

/// Table recording which units have been applied.
pub const LEDGER_TABLE: &str = "migrations";

/// Advisory lock key held by a Postgres migration pass ("GUILDCFG" in ascii).
const MIGRATION_LOCK_ID: i64 = 0x4755_494C_4443_4647;

const CREATED_AT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%a, %b %d, %Y %I:%M %p",
];

/// One reversible schema change.
#[async_trait::async_trait]
pub trait MigrationUnit: MigrationName + Send + Sync {
    /// When the unit was authored. Orders the registry and must be unique.
    ///
    /// Accepts `YYYY-MM-DD HH:MM[:SS]` or `Wed, Sep 20, 2017 9:19 PM`.
    fn created_at(&self) -> &str;

    /// Bring the schema forward. Must succeed when the target state already exists.
    async fn up(&self, schema: &Schema<'_>) -> Result<(), StoreError>;

    /// Undo [`MigrationUnit::up`]. Must succeed when the state is already absent.
    async fn down(&self, schema: &Schema<'_>) -> Result<(), StoreError>;
}

/// A row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub name: String,
    pub applied_at: NaiveDateTime,
}

/// A registered unit and whether the ledger knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub name: String,
    pub created_at: NaiveDateTime,
    pub applied_at: Option<NaiveDateTime>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

pub fn parse_created_at(value: &str) -> Option<NaiveDateTime> {
    CREATED_AT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value.trim(), format).ok())
}

struct Registered<'r> {
    created_at: NaiveDateTime,
    unit: &'r dyn MigrationUnit,
}

/// Applies and rolls back a fixed set of units.
pub struct MigrationRunner<'a> {
    db: &'a DatabaseConnection,
    units: Vec<Box<dyn MigrationUnit>>,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(db: &'a DatabaseConnection, units: Vec<Box<dyn MigrationUnit>>) -> Self {
        Self { db, units }
    }

    /// Registered units sorted by `created_at`, rejecting bad or duplicate timestamps.
    fn ordered(&self) -> Result<Vec<Registered<'_>>, MigrationError> {
        let mut ordered = self
            .units
            .iter()
            .map(|unit| {
                let created_at = parse_created_at(unit.created_at()).ok_or_else(|| {
                    MigrationError::InvalidTimestamp {
                        name: unit.name().to_string(),
                        value: unit.created_at().to_string(),
                    }
                })?;
                Ok(Registered {
                    created_at,
                    unit: unit.as_ref(),
                })
            })
            .collect::<Result<Vec<_>, MigrationError>>()?;

        ordered.sort_by_key(|registered| registered.created_at);

        for pair in ordered.windows(2) {
            if pair[0].created_at == pair[1].created_at {
                return Err(MigrationError::DuplicateTimestamp {
                    first: pair[0].unit.name().to_string(),
                    second: pair[1].unit.name().to_string(),
                    created_at: pair[0].created_at.to_string(),
                });
            }
        }

        Ok(ordered)
    }

    async fn ensure_ledger(&self) -> Result<(), MigrationError> {
        Schema::new(self.db)
            .create_if_not_exists(LEDGER_TABLE, |table| {
                table.increments("id");
                table.string("name", 255).unique();
                table.timestamp("applied_at");
            })
            .await
            .map(|_| ())
            .map_err(|e| MigrationError::Ledger(e.into()))
    }

    async fn records(&self, order: Order) -> Result<Vec<MigrationRecord>, MigrationError> {
        let rows = QueryBuilder::table(LEDGER_TABLE)
            .select(["name", "applied_at"])
            .order_by("applied_at", order.clone())
            .order_by("id", order)
            .get(self.db)
            .await
            .map_err(|e| MigrationError::Ledger(e.into()))?;

        rows.iter()
            .map(|row| {
                let name: String = row
                    .try_get("", "name")
                    .map_err(|e| QueryError::decode("name", e))?;
                let applied_at: NaiveDateTime = row
                    .try_get("", "applied_at")
                    .map_err(|e| QueryError::decode("applied_at", e))?;
                Ok(MigrationRecord { name, applied_at })
            })
            .collect::<Result<Vec<_>, QueryError>>()
            .map_err(|e| MigrationError::Ledger(e.into()))
    }

    /// Ledger rows in the order they were applied.
    pub async fn applied(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        self.ensure_ledger().await?;
        self.records(Order::Asc).await
    }

    pub async fn status(&self) -> Result<Vec<MigrationStatus>, MigrationError> {
        let ordered = self.ordered()?;
        let applied: HashMap<String, NaiveDateTime> = self
            .applied()
            .await?
            .into_iter()
            .map(|record| (record.name, record.applied_at))
            .collect();

        Ok(ordered
            .iter()
            .map(|registered| MigrationStatus {
                name: registered.unit.name().to_string(),
                created_at: registered.created_at,
                applied_at: applied.get(registered.unit.name()).copied(),
            })
            .collect())
    }

    /// Names of units not yet in the ledger, in apply order.
    pub async fn pending(&self) -> Result<Vec<String>, MigrationError> {
        Ok(self
            .status()
            .await?
            .into_iter()
            .filter(|status| !status.is_applied())
            .map(|status| status.name)
            .collect())
    }

    /// Apply every pending unit in ascending `created_at` order.
    ///
    /// Stops at the first failing unit; units applied before it stay applied.
    pub async fn up(&self) -> Result<Vec<String>, MigrationError> {
        let ordered = self.ordered()?;
        let lock = self.acquire_lock().await?;
        let result = self.up_locked(&ordered).await;
        self.release_lock(lock).await;
        result
    }

    async fn up_locked(&self, ordered: &[Registered<'_>]) -> Result<Vec<String>, MigrationError> {
        let records = self.applied().await?;
        let applied: HashSet<&str> = records.iter().map(|r| r.name.as_str()).collect();

        for record in &records {
            if !ordered.iter().any(|r| r.unit.name() == record.name) {
                warn!(migration = %record.name, "ledger contains a migration missing from the registry");
            }
        }

        let latest = ordered
            .iter()
            .filter(|r| applied.contains(r.unit.name()))
            .last();
        let pending: Vec<&Registered<'_>> = ordered
            .iter()
            .filter(|r| !applied.contains(r.unit.name()))
            .collect();

        if let Some(latest) = latest {
            if let Some(stale) = pending.iter().find(|r| r.created_at < latest.created_at) {
                return Err(MigrationError::OutOfOrder {
                    name: stale.unit.name().to_string(),
                    latest: latest.unit.name().to_string(),
                });
            }
        }

        if pending.is_empty() {
            info!("schema is up to date");
            return Ok(Vec::new());
        }

        let mut done = Vec::with_capacity(pending.len());
        for registered in pending {
            let name = registered.unit.name().to_string();
            info!(migration = %name, "applying migration");
            self.apply(registered.unit).await?;
            info!(migration = %name, "migration applied");
            done.push(name);
        }
        Ok(done)
    }

    /// Roll back the `steps` most recently applied units, newest first.
    pub async fn rollback(&self, steps: usize) -> Result<Vec<String>, MigrationError> {
        self.ordered()?;
        let lock = self.acquire_lock().await?;
        let result = self.rollback_locked(Some(steps)).await;
        self.release_lock(lock).await;
        result
    }

    /// Roll back every applied unit.
    pub async fn reset(&self) -> Result<Vec<String>, MigrationError> {
        self.ordered()?;
        let lock = self.acquire_lock().await?;
        let result = self.rollback_locked(None).await;
        self.release_lock(lock).await;
        result
    }

    async fn rollback_locked(&self, steps: Option<usize>) -> Result<Vec<String>, MigrationError> {
        self.ensure_ledger().await?;
        let records = self.records(Order::Desc).await?;
        let limit = steps.unwrap_or(records.len());

        let mut done = Vec::new();
        for record in records.into_iter().take(limit) {
            let unit = self
                .units
                .iter()
                .find(|unit| unit.name() == record.name)
                .ok_or_else(|| MigrationError::UnknownMigration {
                    name: record.name.clone(),
                })?;
            info!(migration = %record.name, "rolling back migration");
            self.revert(unit.as_ref()).await?;
            info!(migration = %record.name, "migration rolled back");
            done.push(record.name);
        }

        if done.is_empty() {
            info!("nothing to roll back");
        }
        Ok(done)
    }

    async fn apply(&self, unit: &dyn MigrationUnit) -> Result<(), MigrationError> {
        let name = unit.name().to_string();
        let txn = self.begin(&name).await?;

        {
            let schema = Schema::for_transaction(&txn);
            unit.up(&schema).await.map_err(|source| MigrationError::Unit {
                name: name.clone(),
                direction: Direction::Up,
                source,
            })?;
        }

        QueryBuilder::table(LEDGER_TABLE)
            .insert(&txn, |row| {
                row.set("name", name.as_str())
                    .set("applied_at", Utc::now().naive_utc());
            })
            .await
            .map_err(|e| MigrationError::Unit {
                name: name.clone(),
                direction: Direction::Up,
                source: e.into(),
            })?;

        txn.commit()
            .await
            .map_err(|source| MigrationError::Transaction { name, source })
    }

    async fn revert(&self, unit: &dyn MigrationUnit) -> Result<(), MigrationError> {
        let name = unit.name().to_string();
        let txn = self.begin(&name).await?;

        {
            let schema = Schema::for_transaction(&txn);
            unit.down(&schema).await.map_err(|source| MigrationError::Unit {
                name: name.clone(),
                direction: Direction::Down,
                source,
            })?;
        }

        QueryBuilder::table(LEDGER_TABLE)
            .where_eq("name", name.as_str())
            .delete(&txn)
            .await
            .map_err(|e| MigrationError::Unit {
                name: name.clone(),
                direction: Direction::Down,
                source: e.into(),
            })?;

        txn.commit()
            .await
            .map_err(|source| MigrationError::Transaction { name, source })
    }

    async fn begin(&self, name: &str) -> Result<DatabaseTransaction, MigrationError> {
        self.db
            .begin()
            .await
            .map_err(|source| MigrationError::Transaction {
                name: name.to_string(),
                source,
            })
    }

    /// Serialize concurrent passes on Postgres. The lock lives as long as the
    /// returned transaction; other backends run unguarded.
    async fn acquire_lock(&self) -> Result<Option<DatabaseTransaction>, MigrationError> {
        if self.db.get_database_backend() != DbBackend::Postgres {
            return Ok(None);
        }

        debug!("acquiring migration lock");
        let txn = self.db.begin().await.map_err(MigrationError::Lock)?;
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT pg_advisory_xact_lock($1)",
            [MIGRATION_LOCK_ID.into()],
        ))
        .await
        .map_err(MigrationError::Lock)?;
        debug!("migration lock acquired");
        Ok(Some(txn))
    }

    async fn release_lock(&self, lock: Option<DatabaseTransaction>) {
        if let Some(txn) = lock {
            if let Err(e) = txn.commit().await {
                warn!("failed to release migration lock: {}", e);
            } else {
                debug!("migration lock released");
            }
        }
    }
}
