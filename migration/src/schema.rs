//! Declarative table definitions and idempotent DDL helpers.
//!
//! Column helpers on [`Blueprint`] are pure descriptors; nothing touches the
//! store until the blueprint is handed to [`Schema::create_if_not_exists`] or
//! [`Schema::add_columns_if_not_exists`].

use sea_orm::sea_query::{Alias, ColumnDef, Expr, Table};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, Statement, Value,
};
use sea_orm_migration::SchemaManager;
use tracing::{debug, info};

use crate::error::SchemaError;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing integer primary key.
    Increments,
    Integer,
    BigInteger,
    String(u32),
    Text,
    Boolean,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Value(Value),
    CurrentTimestamp,
}

/// One column of a [`Blueprint`]. Columns are `NOT NULL` unless marked nullable.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub unsigned: bool,
    pub unique: bool,
    pub primary: bool,
}

impl ColumnSpec {
    fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: false,
            default: None,
            unsigned: false,
            unique: false,
            primary: false,
        }
    }

    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_now(&mut self) -> &mut Self {
        self.default = Some(DefaultValue::CurrentTimestamp);
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    fn to_column_def(&self) -> ColumnDef {
        let mut def = ColumnDef::new(Alias::new(self.name.as_str()));
        match self.column_type {
            ColumnType::Increments => {
                def.integer().auto_increment().primary_key();
            }
            ColumnType::Integer if self.unsigned => {
                def.unsigned();
            }
            ColumnType::Integer => {
                def.integer();
            }
            ColumnType::BigInteger if self.unsigned => {
                def.big_unsigned();
            }
            ColumnType::BigInteger => {
                def.big_integer();
            }
            ColumnType::String(len) => {
                def.string_len(len);
            }
            ColumnType::Text => {
                def.text();
            }
            ColumnType::Boolean => {
                def.boolean();
            }
            ColumnType::Timestamp => {
                def.timestamp();
            }
        }
        if self.nullable {
            def.null();
        } else {
            def.not_null();
        }
        match &self.default {
            Some(DefaultValue::Value(value)) => {
                def.default(value.clone());
            }
            Some(DefaultValue::CurrentTimestamp) => {
                def.default(Expr::current_timestamp());
            }
            None => {}
        }
        if self.unique {
            def.unique_key();
        }
        if self.primary && self.column_type != ColumnType::Increments {
            def.primary_key();
        }
        def
    }
}

/// Ordered column set for one table.
#[derive(Debug, Clone)]
pub struct Blueprint {
    table: String,
    columns: Vec<ColumnSpec>,
}

impl Blueprint {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn increments(&mut self, name: &str) -> &mut ColumnSpec {
        self.push(name, ColumnType::Increments)
    }

    pub fn integer(&mut self, name: &str) -> &mut ColumnSpec {
        self.push(name, ColumnType::Integer)
    }

    pub fn big_integer(&mut self, name: &str) -> &mut ColumnSpec {
        self.push(name, ColumnType::BigInteger)
    }

    pub fn string(&mut self, name: &str, len: u32) -> &mut ColumnSpec {
        self.push(name, ColumnType::String(len))
    }

    pub fn text(&mut self, name: &str) -> &mut ColumnSpec {
        self.push(name, ColumnType::Text)
    }

    pub fn boolean(&mut self, name: &str) -> &mut ColumnSpec {
        self.push(name, ColumnType::Boolean)
    }

    pub fn timestamp(&mut self, name: &str) -> &mut ColumnSpec {
        self.push(name, ColumnType::Timestamp)
    }

    /// Nullable `created_at` and `updated_at`, both defaulting to now.
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").nullable().default_now();
        self.timestamp("updated_at").nullable().default_now();
    }

    fn push(&mut self, name: &str, column_type: ColumnType) -> &mut ColumnSpec {
        let index = self.columns.len();
        self.columns.push(ColumnSpec::new(name, column_type));
        &mut self.columns[index]
    }
}

/// DDL entry point bound to a connection or an open transaction.
pub struct Schema<'c> {
    manager: SchemaManager<'c>,
}

impl<'c> Schema<'c> {
    pub fn new(db: &'c DatabaseConnection) -> Self {
        Self {
            manager: SchemaManager::new(db),
        }
    }

    pub fn for_transaction(txn: &'c DatabaseTransaction) -> Self {
        Self {
            manager: SchemaManager::new(txn),
        }
    }

    pub fn backend(&self) -> DbBackend {
        self.manager.get_database_backend()
    }

    /// Connection the schema runs on, for data statements issued alongside DDL.
    pub fn connection(&self) -> &(impl ConnectionTrait + 'c) {
        self.manager.get_connection()
    }

    pub async fn has_table(&self, table: &str) -> Result<bool, SchemaError> {
        self.manager
            .has_table(table)
            .await
            .map_err(|e| SchemaError::new(format!("has_table({table})"), e))
    }

    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool, SchemaError> {
        self.manager
            .has_column(table, column)
            .await
            .map_err(|e| SchemaError::new(format!("has_column({table}, {column})"), e))
    }

    /// Create `table` from the columns `define` declares, unless it already exists.
    ///
    /// Returns `true` only when a table was created; `define` is not invoked otherwise.
    pub async fn create_if_not_exists<F>(&self, table: &str, define: F) -> Result<bool, SchemaError>
    where
        F: FnOnce(&mut Blueprint),
    {
        if self.has_table(table).await? {
            debug!(table, "table already exists, skipping create");
            return Ok(false);
        }

        let mut blueprint = Blueprint::new(table);
        define(&mut blueprint);

        let mut create = Table::create();
        create.table(Alias::new(table)).if_not_exists();
        for column in blueprint.columns() {
            create.col(&mut column.to_column_def());
        }

        self.execute(self.backend().build(&create)).await?;
        info!(table, "created table");
        Ok(true)
    }

    /// Drop `table` if present. Returns `true` only when a table was dropped.
    pub async fn drop_if_exists(&self, table: &str) -> Result<bool, SchemaError> {
        if !self.has_table(table).await? {
            debug!(table, "table already absent, skipping drop");
            return Ok(false);
        }

        let drop = Table::drop().table(Alias::new(table)).if_exists().to_owned();
        self.execute(self.backend().build(&drop)).await?;
        info!(table, "dropped table");
        Ok(true)
    }

    /// Add every column `define` declares that `table` does not have yet.
    ///
    /// Returns how many columns were added.
    pub async fn add_columns_if_not_exists<F>(
        &self,
        table: &str,
        define: F,
    ) -> Result<usize, SchemaError>
    where
        F: FnOnce(&mut Blueprint),
    {
        let mut blueprint = Blueprint::new(table);
        define(&mut blueprint);

        let mut added = 0;
        for column in blueprint.columns() {
            if self.has_column(table, &column.name).await? {
                debug!(table, column = %column.name, "column already exists, skipping");
                continue;
            }
            // One column per statement; SQLite rejects multi-column alters.
            let alter = Table::alter()
                .table(Alias::new(table))
                .add_column(&mut column.to_column_def())
                .to_owned();
            self.execute(self.backend().build(&alter)).await?;
            info!(table, column = %column.name, "added column");
            added += 1;
        }
        Ok(added)
    }

    pub async fn drop_column_if_exists(&self, table: &str, column: &str) -> Result<bool, SchemaError> {
        if !self.has_table(table).await? || !self.has_column(table, column).await? {
            return Ok(false);
        }

        let alter = Table::alter()
            .table(Alias::new(table))
            .drop_column(Alias::new(column))
            .to_owned();
        self.execute(self.backend().build(&alter)).await?;
        info!(table, column, "dropped column");
        Ok(true)
    }

    async fn execute(&self, statement: Statement) -> Result<(), SchemaError> {
        let sql = statement.sql.clone();
        self.manager
            .get_connection()
            .execute(statement)
            .await
            .map(|_| ())
            .map_err(|e| SchemaError::new(sql, e))
    }
}
