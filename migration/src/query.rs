//! Fluent, parameterized statement construction on top of `sea_query`.
//!
//! Every value handed to [`QueryBuilder`] or [`ChangeSet::set`] is bound as a
//! statement parameter. The single exception is [`ChangeSet::set_raw`], which
//! inlines a [`RawSql`] literal; a `RawSql` can only be produced from an
//! already-serialized JSON document.

use sea_orm::sea_query::{Alias, Asterisk, Expr, Order, Query, SimpleExpr};
use sea_orm::{ConnectionTrait, DbBackend, QueryResult, Statement, Value};
use tracing::debug;

use crate::error::QueryError;

/// Comparison used by a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    fn apply(self, column: &str, value: Value) -> SimpleExpr {
        let col = Expr::col(Alias::new(column));
        match self {
            Operator::Eq => col.eq(value),
            Operator::Ne => col.ne(value),
            Operator::Lt => col.lt(value),
            Operator::Lte => col.lte(value),
            Operator::Gt => col.gt(value),
            Operator::Gte => col.gte(value),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Connector {
    And,
    Or,
}

#[derive(Debug, Clone)]
struct Predicate {
    connector: Connector,
    expr: SimpleExpr,
}

/// A SQL literal that bypasses parameter binding.
///
/// Only constructible from a JSON document, which is quoted as a string
/// literal with embedded single quotes doubled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSql(String);

impl RawSql {
    pub fn json(document: &serde_json::Value) -> Self {
        let text = document.to_string();
        Self(format!("'{}'", text.replace('\'', "''")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Column assignments for an insert or update.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    columns: Vec<(String, SimpleExpr)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` to `column`.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let expr: SimpleExpr = value.into().into();
        self.assign(column, expr)
    }

    /// Inline a pre-serialized JSON literal into `column`.
    pub fn set_raw(&mut self, column: &str, raw: RawSql) -> &mut Self {
        self.assign(column, Expr::cust(raw.0))
    }

    /// Assign the store's current timestamp to `column`.
    pub fn set_now(&mut self, column: &str) -> &mut Self {
        self.assign(column, Expr::current_timestamp().into())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    fn assign(&mut self, column: &str, expr: SimpleExpr) -> &mut Self {
        match self.columns.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = expr,
            None => self.columns.push((column.to_string(), expr)),
        }
        self
    }
}

/// Rows returned by a select. Empty when nothing matched, never absent.
#[derive(Debug, Default)]
pub struct Collection {
    rows: Vec<QueryResult>,
}

impl Collection {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn first(&self) -> Option<&QueryResult> {
        self.rows.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryResult> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<QueryResult> {
        self.rows
    }
}

/// Outcome of an insert, update or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub rows_affected: u64,
}

impl WriteResult {
    pub fn is_empty(&self) -> bool {
        self.rows_affected == 0
    }
}

/// Statement builder scoped to a single table.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    columns: Vec<String>,
    predicates: Vec<Predicate>,
    order: Vec<(String, Order)>,
    limit: Option<u64>,
}

impl QueryBuilder {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: name.into(),
            columns: Vec::new(),
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Restrict the projection of a select. All columns are returned by default.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.and_where(column, Operator::Eq, value)
    }

    pub fn and_where(mut self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate {
            connector: Connector::And,
            expr: op.apply(column, value.into()),
        });
        self
    }

    pub fn or_where(mut self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate {
            connector: Connector::Or,
            expr: op.apply(column, value.into()),
        });
        self
    }

    pub fn where_null(mut self, column: &str) -> Self {
        self.predicates.push(Predicate {
            connector: Connector::And,
            expr: Expr::col(Alias::new(column)).is_null(),
        });
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order.push((column.to_string(), order));
        self
    }

    pub fn take(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn condition(&self) -> Option<SimpleExpr> {
        let mut predicates = self.predicates.iter();
        let first = predicates.next()?.expr.clone();
        Some(predicates.fold(first, |acc, predicate| match predicate.connector {
            Connector::And => acc.and(predicate.expr.clone()),
            Connector::Or => acc.or(predicate.expr.clone()),
        }))
    }

    pub fn build_select(&self, backend: DbBackend) -> Statement {
        let mut select = Query::select();
        select.from(Alias::new(self.table.as_str()));
        if self.columns.is_empty() {
            select.column(Asterisk);
        } else {
            select.columns(self.columns.iter().map(|c| Alias::new(c.as_str())));
        }
        if let Some(cond) = self.condition() {
            select.cond_where(cond);
        }
        for (column, order) in &self.order {
            select.order_by(Alias::new(column.as_str()), order.clone());
        }
        if let Some(limit) = self.limit {
            select.limit(limit);
        }
        backend.build(&select)
    }

    pub fn build_insert(
        &self,
        backend: DbBackend,
        changes: &ChangeSet,
    ) -> Result<Statement, QueryError> {
        if changes.is_empty() {
            return Err(self.build_error("insert", "no columns were set"));
        }
        let mut insert = Query::insert();
        insert
            .into_table(Alias::new(self.table.as_str()))
            .columns(changes.columns.iter().map(|(c, _)| Alias::new(c.as_str())));
        insert
            .values(changes.columns.iter().map(|(_, e)| e.clone()))
            .map_err(|e| self.build_error("insert", &e.to_string()))?;
        Ok(backend.build(&insert))
    }

    pub fn build_update(
        &self,
        backend: DbBackend,
        changes: &ChangeSet,
    ) -> Result<Statement, QueryError> {
        if changes.is_empty() {
            return Err(self.build_error("update", "no columns were set"));
        }
        let cond = self.condition().ok_or_else(|| QueryError::Unconstrained {
            table: self.table.clone(),
            action: "update",
        })?;
        let mut update = Query::update();
        update
            .table(Alias::new(self.table.as_str()))
            .values(
                changes
                    .columns
                    .iter()
                    .map(|(c, e)| (Alias::new(c.as_str()), e.clone())),
            )
            .cond_where(cond);
        Ok(backend.build(&update))
    }

    pub fn build_delete(&self, backend: DbBackend) -> Result<Statement, QueryError> {
        let cond = self.condition().ok_or_else(|| QueryError::Unconstrained {
            table: self.table.clone(),
            action: "delete",
        })?;
        let mut delete = Query::delete();
        delete
            .from_table(Alias::new(self.table.as_str()))
            .cond_where(cond);
        Ok(backend.build(&delete))
    }

    /// Run a select and return every matching row.
    pub async fn get<C>(&self, conn: &C) -> Result<Collection, QueryError>
    where
        C: ConnectionTrait,
    {
        let stmt = self.build_select(conn.get_database_backend());
        debug!(table = %self.table, sql = %stmt.sql, "select");
        let sql = stmt.sql.clone();
        let rows = conn
            .query_all(stmt)
            .await
            .map_err(|e| QueryError::execution(sql, e))?;
        Ok(Collection { rows })
    }

    /// Run a select limited to one row.
    pub async fn first<C>(&self, conn: &C) -> Result<Option<QueryResult>, QueryError>
    where
        C: ConnectionTrait,
    {
        let rows = self.clone().take(1).get(conn).await?;
        Ok(rows.into_rows().into_iter().next())
    }

    pub async fn insert<C, F>(&self, conn: &C, build: F) -> Result<WriteResult, QueryError>
    where
        C: ConnectionTrait,
        F: FnOnce(&mut ChangeSet),
    {
        let mut changes = ChangeSet::new();
        build(&mut changes);
        let stmt = self.build_insert(conn.get_database_backend(), &changes)?;
        self.execute(conn, stmt).await
    }

    pub async fn update<C, F>(&self, conn: &C, build: F) -> Result<WriteResult, QueryError>
    where
        C: ConnectionTrait,
        F: FnOnce(&mut ChangeSet),
    {
        let mut changes = ChangeSet::new();
        build(&mut changes);
        let stmt = self.build_update(conn.get_database_backend(), &changes)?;
        self.execute(conn, stmt).await
    }

    pub async fn delete<C>(&self, conn: &C) -> Result<WriteResult, QueryError>
    where
        C: ConnectionTrait,
    {
        let stmt = self.build_delete(conn.get_database_backend())?;
        self.execute(conn, stmt).await
    }

    async fn execute<C>(&self, conn: &C, stmt: Statement) -> Result<WriteResult, QueryError>
    where
        C: ConnectionTrait,
    {
        debug!(table = %self.table, sql = %stmt.sql, "write");
        let sql = stmt.sql.clone();
        let result = conn
            .execute(stmt)
            .await
            .map_err(|e| QueryError::execution(sql, e))?;
        Ok(WriteResult {
            rows_affected: result.rows_affected(),
        })
    }

    fn build_error(&self, action: &'static str, message: &str) -> QueryError {
        QueryError::Build {
            table: self.table.clone(),
            action,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Database;
    use serde_json::json;

    #[test]
    fn select_binds_values_as_parameters() {
        let stmt = QueryBuilder::table("guilds")
            .where_eq("id", "1; DROP TABLE guilds")
            .build_select(DbBackend::Postgres);

        assert_eq!(stmt.sql, r#"SELECT * FROM "guilds" WHERE "id" = $1"#);
        assert!(!stmt.sql.contains("DROP"));
        let values = stmt.values.expect("bound values").0;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], Value::from("1; DROP TABLE guilds"));
    }

    #[test]
    fn select_with_projection_order_and_limit() {
        let stmt = QueryBuilder::table("migrations")
            .select(["name", "applied_at"])
            .order_by("id", Order::Desc)
            .take(3)
            .build_select(DbBackend::Postgres);

        assert!(stmt.sql.starts_with(r#"SELECT "name", "applied_at" FROM "migrations""#));
        assert!(stmt.sql.contains(r#"ORDER BY "id" DESC"#));
        assert!(stmt.sql.contains("LIMIT"));
    }

    #[test]
    fn or_where_combines_predicates() {
        let stmt = QueryBuilder::table("guilds")
            .where_eq("id", "a")
            .or_where("id", Operator::Eq, "b")
            .build_select(DbBackend::Sqlite);

        assert!(stmt.sql.contains(r#""id" = ? OR "id" = ?"#));
    }

    #[test]
    fn raw_json_is_inlined_with_quotes_escaped() {
        let raw = RawSql::json(&json!({"note": "it's"}));
        assert_eq!(raw.as_str(), r#"'{"note":"it''s"}'"#);

        let mut changes = ChangeSet::new();
        changes.set_raw("channels", raw).set("name", "guild");
        let stmt = QueryBuilder::table("guilds")
            .where_eq("id", "G1")
            .build_update(DbBackend::Postgres, &changes)
            .unwrap();

        assert!(stmt.sql.contains(r#""channels" = '{"note":"it''s"}'"#));
        assert!(stmt.sql.contains(r#""name" = $1"#));
        assert_eq!(stmt.values.unwrap().0.len(), 2);
    }

    #[test]
    fn setting_a_column_twice_keeps_the_last_value() {
        let mut changes = ChangeSet::new();
        changes.set("name", "first").set("name", "second");
        assert_eq!(changes.columns().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn update_and_delete_require_a_predicate() {
        let mut changes = ChangeSet::new();
        changes.set("name", "x");
        let builder = QueryBuilder::table("guilds");

        assert!(matches!(
            builder.build_update(DbBackend::Postgres, &changes),
            Err(QueryError::Unconstrained { action: "update", .. })
        ));
        assert!(matches!(
            builder.build_delete(DbBackend::Postgres),
            Err(QueryError::Unconstrained { action: "delete", .. })
        ));
    }

    #[test]
    fn empty_change_set_is_rejected() {
        let result = QueryBuilder::table("guilds")
            .where_eq("id", "G1")
            .build_update(DbBackend::Sqlite, &ChangeSet::new());
        assert!(matches!(result, Err(QueryError::Build { .. })));
    }

    #[tokio::test]
    async fn executes_against_sqlite() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.execute_unprepared("CREATE TABLE things (id TEXT PRIMARY KEY, label TEXT, hits INTEGER)")
            .await
            .unwrap();

        let things = QueryBuilder::table("things");
        let inserted = things
            .insert(&db, |row| {
                row.set("id", "a").set("label", "first").set("hits", 1i64);
            })
            .await
            .unwrap();
        assert_eq!(inserted.rows_affected, 1);

        let missing = things.clone().where_eq("id", "zzz").get(&db).await.unwrap();
        assert!(missing.is_empty());

        let updated = things
            .clone()
            .where_eq("id", "a")
            .update(&db, |row| {
                row.set("hits", 2i64);
            })
            .await
            .unwrap();
        assert_eq!(updated.rows_affected, 1);

        let untouched = things
            .clone()
            .where_eq("id", "nope")
            .update(&db, |row| {
                row.set("hits", 9i64);
            })
            .await
            .unwrap();
        assert!(untouched.is_empty());

        let row = things.clone().where_eq("id", "a").first(&db).await.unwrap().unwrap();
        let hits: i64 = row.try_get("", "hits").unwrap();
        assert_eq!(hits, 2);

        let deleted = things.clone().where_eq("id", "a").delete(&db).await.unwrap();
        assert_eq!(deleted.rows_affected, 1);
        assert!(things.get(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn execution_failure_carries_statement() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let err = QueryBuilder::table("does_not_exist").get(&db).await.unwrap_err();
        assert!(err.statement().unwrap().contains("does_not_exist"));
    }
}
