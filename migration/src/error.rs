//! Error types shared by the schema builder, query builder and migration runner.

use std::fmt;

use sea_orm::DbErr;
use thiserror::Error;

/// A DDL statement (or an existence probe) failed against the backing store.
#[derive(Debug, Error)]
#[error("schema statement failed: {statement}: {source}")]
pub struct SchemaError {
    /// The offending statement, as sent to the store.
    pub statement: String,
    #[source]
    pub source: DbErr,
}

impl SchemaError {
    pub fn new(statement: impl Into<String>, source: DbErr) -> Self {
        Self {
            statement: statement.into(),
            source,
        }
    }
}

/// Failures raised while building or executing a data statement.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query failed: {statement}: {source}")]
    Execution {
        statement: String,
        #[source]
        source: DbErr,
    },
    #[error("failed to build {action} statement for `{table}`: {message}")]
    Build {
        table: String,
        action: &'static str,
        message: String,
    },
    #[error("refusing to {action} every row of `{table}` without a where clause")]
    Unconstrained { table: String, action: &'static str },
    #[error("failed to read column `{column}`: {source}")]
    Decode {
        column: String,
        #[source]
        source: DbErr,
    },
}

impl QueryError {
    pub fn execution(statement: impl Into<String>, source: DbErr) -> Self {
        Self::Execution {
            statement: statement.into(),
            source,
        }
    }

    pub fn decode(column: impl Into<String>, source: DbErr) -> Self {
        Self::Decode {
            column: column.into(),
            source,
        }
    }

    /// The statement text when the failure happened at execution time.
    pub fn statement(&self) -> Option<&str> {
        match self {
            QueryError::Execution { statement, .. } => Some(statement),
            _ => None,
        }
    }
}

/// Anything a migration unit can fail with.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Which way a unit was being moved when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// Errors produced by the migration runner.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration `{name}` failed while migrating {direction}: {source}")]
    Unit {
        name: String,
        direction: Direction,
        #[source]
        source: StoreError,
    },
    #[error("migration ledger operation failed: {0}")]
    Ledger(#[source] StoreError),
    #[error("transaction for migration `{name}` failed: {source}")]
    Transaction {
        name: String,
        #[source]
        source: DbErr,
    },
    #[error("migration `{name}` has an unparseable created_at value '{value}'")]
    InvalidTimestamp { name: String, value: String },
    #[error("migrations `{first}` and `{second}` share the created_at value {created_at}")]
    DuplicateTimestamp {
        first: String,
        second: String,
        created_at: String,
    },
    #[error("migration `{name}` is pending but older than applied migration `{latest}`")]
    OutOfOrder { name: String, latest: String },
    #[error("applied migration `{name}` is not part of the registry")]
    UnknownMigration { name: String },
    #[error("failed to acquire the migration lock: {0}")]
    Lock(#[source] DbErr),
}

impl MigrationError {
    /// Name of the unit that caused the failure, if a single unit is to blame.
    pub fn unit_name(&self) -> Option<&str> {
        match self {
            MigrationError::Unit { name, .. }
            | MigrationError::Transaction { name, .. }
            | MigrationError::InvalidTimestamp { name, .. }
            | MigrationError::OutOfOrder { name, .. }
            | MigrationError::UnknownMigration { name } => Some(name),
            MigrationError::DuplicateTimestamp { second, .. } => Some(second),
            MigrationError::Ledger(_) | MigrationError::Lock(_) => None,
        }
    }
}
