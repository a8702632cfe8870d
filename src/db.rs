//! Database connection, pool management and startup migrations.
//!
//! [`run_migrations`] is the only way to obtain a [`SchemaReady`] token, and
//! the guild cache cannot be built without one.

use std::time::Duration;

use migration::{MigrationError, MigrationStatus, Migrator};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use tokio::time::sleep;

use crate::config::AppConfig;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database after {attempts} attempt(s): {source}")]
    ConnectionFailed {
        attempts: u32,
        #[source]
        source: DbErr,
    },
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("Database health check failed: {0}")]
    HealthCheck(#[source] DbErr),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Proof that the schema has been brought up to date in this process.
#[derive(Debug, Clone, Copy)]
pub struct SchemaReady {
    _private: (),
}

/// Initializes a database connection pool with the given configuration.
///
/// Transient connect failures are retried with exponential backoff, up to
/// `db_connect_retries` attempts.
///
/// ```no_run
/// use guildcfg::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::default();
///     let db = init_pool(&config).await?;
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection, DatabaseError> {
    if cfg.database_url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "Database URL cannot be empty".to_string(),
        });
    }
    if cfg.db_connect_retries == 0 {
        return Err(DatabaseError::InvalidConfiguration {
            message: "Connect retries must be at least 1".to_string(),
        });
    }

    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600)) // 10 minutes
        .max_lifetime(Duration::from_secs(1800)) // 30 minutes
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let max_retries = cfg.db_connect_retries;
    let mut retry_delay = Duration::from_millis(100);
    let mut attempt = 1;

    loop {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                log::info!("Successfully connected to database (attempt {})", attempt);
                return Ok(conn);
            }
            Err(e) if attempt >= max_retries => {
                log::error!(
                    "Failed to connect to database after {} attempts: {}",
                    max_retries,
                    e
                );
                return Err(DatabaseError::ConnectionFailed {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                log::warn!(
                    "Database connection attempt {} failed: {}, retrying in {:?}",
                    attempt,
                    e,
                    retry_delay
                );
                sleep(retry_delay).await;
                retry_delay *= 2;
                attempt += 1;
            }
        }
    }
}

/// Verifies that the connection is still usable with `SELECT 1`.
pub async fn health_check(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(stmt).await.map_err(DatabaseError::HealthCheck)?;
    Ok(())
}

/// Applies every pending migration. Must complete before any cache access.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<SchemaReady, DatabaseError> {
    let applied = Migrator::runner(db).up().await?;
    if applied.is_empty() {
        tracing::info!("database schema already current");
    } else {
        tracing::info!(count = applied.len(), migrations = ?applied, "database schema migrated");
    }
    Ok(SchemaReady { _private: () })
}

pub async fn rollback(db: &DatabaseConnection, steps: usize) -> Result<Vec<String>, DatabaseError> {
    Ok(Migrator::runner(db).rollback(steps).await?)
}

pub async fn reset(db: &DatabaseConnection) -> Result<Vec<String>, DatabaseError> {
    Ok(Migrator::runner(db).reset().await?)
}

pub async fn migration_status(db: &DatabaseConnection) -> Result<Vec<MigrationStatus>, DatabaseError> {
    Ok(Migrator::runner(db).status().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_database_url() {
        let config = AppConfig {
            database_url: String::new(),
            ..AppConfig::default()
        };

        let result = init_pool(&config).await;
        assert!(matches!(
            result,
            Err(DatabaseError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn connects_and_migrates_sqlite() {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            ..AppConfig::default()
        };

        let db = init_pool(&config).await.unwrap();
        health_check(&db).await.unwrap();
        run_migrations(&db).await.unwrap();

        let status = migration_status(&db).await.unwrap();
        assert_eq!(status.len(), 3);
        assert!(status.iter().all(MigrationStatus::is_applied));
    }

    #[tokio::test]
    async fn unreachable_database_fails_after_retries() {
        let config = AppConfig {
            database_url: "sqlite:///nonexistent-dir/guildcfg.db".to_string(),
            db_connect_retries: 2,
            ..AppConfig::default()
        };

        let result = init_pool(&config).await;
        assert!(matches!(
            result,
            Err(DatabaseError::ConnectionFailed { attempts: 2, .. })
        ));
    }
}
