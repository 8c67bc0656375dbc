//! The direct-SQL façade: `execute`/`fetch_one`/`fetch_all`/`query` plus the
//! data helpers (`sql_insert`/`sql_update`/`sql_delete`/`upsert`/`count`/
//! `exists`/`query_with_pagination`). Every caller-supplied clause passes
//! through [`crate::sql_safety::validate_clause`] before it is concatenated
//! into a statement string.

use rusqlite::types::Value as SqlValue;
use rusqlite::OptionalExtension;

use crate::error::{Error, Result};
use crate::sql_safety::{validate_clause, FunctionOverride, SqlSafetyConfig};
use crate::value::Value;

use super::convert::{row_to_object, value_to_sql};
use super::Core;

/// Validates the caller-supplied fragments of a `SELECT` and assembles the
/// statement text. Shared between [`Core::query`]/[`Core::query_with_pagination`]
/// (executed against the primary connection) and the async façade's
/// read-only-pool path (executed against a pooled read-only connection) so
/// both go through the exact same validation and string-building logic.
pub(crate) fn assemble_select(
    quoted_table: &str,
    columns: &str,
    where_clause: Option<&str>,
    order_by: Option<&str>,
    safety: &SqlSafetyConfig,
    overrides: &FunctionOverride<'_>,
) -> Result<String> {
    validate_clause(columns, safety, overrides)?;
    if let Some(clause) = where_clause {
        validate_clause(clause, safety, overrides)?;
    }
    if let Some(clause) = order_by {
        validate_clause(clause, safety, overrides)?;
    }

    let columns = crate::sql_safety::quote_bare_columns(columns)?;
    let mut sql = format!("SELECT {columns} FROM {quoted_table}");
    if let Some(clause) = where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    if let Some(clause) = order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(clause);
    }
    Ok(sql)
}

/// Runs `sql` against an arbitrary connection (used by the async façade's
/// read-only pool, which does not hold the primary connection's lock).
pub(crate) fn fetch_all_on(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Value>> {
    let bound: Vec<SqlValue> = params.iter().map(value_to_sql).collect();
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), |row| {
        row_to_object(row, &column_names).map_err(|_| rusqlite::Error::InvalidQuery)
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// `fetch_one` counterpart of [`fetch_all_on`].
pub(crate) fn fetch_one_on(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> Result<Option<Value>> {
    let bound: Vec<SqlValue> = params.iter().map(value_to_sql).collect();
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    stmt.query_row(rusqlite::params_from_iter(bound.iter()), |row| {
        row_to_object(row, &column_names).map_err(|_| rusqlite::Error::InvalidQuery)
    })
    .optional()
    .map_err(Error::from)
}

impl Core<'_> {
    /// Quotes `table` if given, otherwise quotes this table's own name — the
    /// "default to the primary table, but accept any table" behavior shared
    /// by `query`/`query_with_pagination`/`count`/`exists`.
    fn resolve_table(&self, table: Option<&str>) -> Result<String> {
        match table {
            Some(table) => crate::sql_safety::quote_identifier(table),
            None => self.state.quoted_table(),
        }
    }

    /// Runs a single non-query statement (caller-assembled DML/DDL already
    /// validated by the caller where it embeds user clauses) and returns the
    /// number of rows affected.
    pub(crate) fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let bound: Vec<SqlValue> = params.iter().map(value_to_sql).collect();
        let conn = self.inner.conn.lock();
        let affected = conn.execute(
            sql,
            rusqlite::params_from_iter(bound.iter()),
        )?;
        Ok(affected)
    }

    /// Runs `sql` once per entry in `param_sets` inside a single transaction.
    pub(crate) fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> Result<usize> {
        let mut conn = self.inner.conn.lock();
        let tx = conn.transaction()?;
        let mut total = 0usize;
        for params in param_sets {
            let bound: Vec<SqlValue> = params.iter().map(value_to_sql).collect();
            total += tx.execute(sql, rusqlite::params_from_iter(bound.iter()))?;
        }
        tx.commit()?;
        Ok(total)
    }

    /// Runs `sql` and returns the first row (if any) as a JSON object keyed
    /// by column name.
    pub(crate) fn fetch_one(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        let bound: Vec<SqlValue> = params.iter().map(value_to_sql).collect();
        let conn = self.inner.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        stmt.query_row(rusqlite::params_from_iter(bound.iter()), |row| {
            row_to_object(row, &column_names).map_err(|_| rusqlite::Error::InvalidQuery)
        })
        .optional()
        .map_err(Error::from)
    }

    /// Runs `sql` and returns every row as a JSON object.
    pub(crate) fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>> {
        let bound: Vec<SqlValue> = params.iter().map(value_to_sql).collect();
        let conn = self.inner.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), |row| {
            row_to_object(row, &column_names).map_err(|_| rusqlite::Error::InvalidQuery)
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Builds and runs `SELECT <columns> FROM <table> [WHERE ..] [ORDER BY
    /// ..]`, validating the caller-supplied fragments before assembly.
    /// `table` defaults to this table when `None`, but any table name may be
    /// given to query a table built with `create_table`.
    pub(crate) fn query(
        &self,
        table: Option<&str>,
        columns: &str,
        where_clause: Option<&str>,
        order_by: Option<&str>,
        params: &[Value],
        overrides: &FunctionOverride<'_>,
    ) -> Result<Vec<Value>> {
        let table = self.resolve_table(table)?;
        let sql = assemble_select(&table, columns, where_clause, order_by, &self.state.safety, overrides)?;
        self.fetch_all(&sql, params)
    }

    /// `query` with a `LIMIT`/`OFFSET` page window appended.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn query_with_pagination(
        &self,
        table: Option<&str>,
        columns: &str,
        where_clause: Option<&str>,
        order_by: Option<&str>,
        params: &[Value],
        overrides: &FunctionOverride<'_>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Value>> {
        let table = self.resolve_table(table)?;
        let mut sql = assemble_select(&table, columns, where_clause, order_by, &self.state.safety, overrides)?;
        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        self.fetch_all(&sql, params)
    }

    /// `SELECT COUNT(*) FROM <table> [WHERE ..]`.
    pub(crate) fn count(
        &self,
        table: Option<&str>,
        where_clause: Option<&str>,
        params: &[Value],
        overrides: &FunctionOverride<'_>,
    ) -> Result<i64> {
        if let Some(clause) = where_clause {
            validate_clause(clause, &self.state.safety, overrides)?;
        }
        let table = self.resolve_table(table)?;
        let mut sql = format!("SELECT COUNT(*) FROM {table}");
        if let Some(clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        let bound: Vec<SqlValue> = params.iter().map(value_to_sql).collect();
        let conn = self.inner.conn.lock();
        let count: i64 = conn.query_row(&sql, rusqlite::params_from_iter(bound.iter()), |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// `SELECT EXISTS(SELECT 1 FROM <table> WHERE ..)`.
    pub(crate) fn exists(
        &self,
        table: Option<&str>,
        where_clause: &str,
        params: &[Value],
        overrides: &FunctionOverride<'_>,
    ) -> Result<bool> {
        validate_clause(where_clause, &self.state.safety, overrides)?;
        let table = self.resolve_table(table)?;
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE {where_clause})");
        let bound: Vec<SqlValue> = params.iter().map(value_to_sql).collect();
        let conn = self.inner.conn.lock();
        let exists: i64 = conn.query_row(&sql, rusqlite::params_from_iter(bound.iter()), |row| {
            row.get(0)
        })?;
        Ok(exists != 0)
    }

    /// Inserts a row into an arbitrary (non key/value) table built with
    /// `create_table`, quoting every column name.
    pub(crate) fn sql_insert(&self, table: &str, row: &[(String, Value)]) -> Result<i64> {
        let quoted_table = crate::sql_safety::quote_identifier(table)?;
        let mut columns = Vec::with_capacity(row.len());
        let mut placeholders = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (i, (column, value)) in row.iter().enumerate() {
            columns.push(crate::sql_safety::quote_identifier(column)?);
            placeholders.push(format!("?{}", i + 1));
            values.push(value_to_sql(value));
        }
        let sql = format!(
            "INSERT INTO {quoted_table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        let conn = self.inner.conn.lock();
        conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        Ok(conn.last_insert_rowid())
    }

    /// Updates rows matching `where_clause` with the given column
    /// assignments.
    pub(crate) fn sql_update(
        &self,
        table: &str,
        assignments: &[(String, Value)],
        where_clause: &str,
        where_params: &[Value],
        overrides: &FunctionOverride<'_>,
    ) -> Result<usize> {
        validate_clause(where_clause, &self.state.safety, overrides)?;
        let quoted_table = crate::sql_safety::quote_identifier(table)?;
        let mut sets = Vec::with_capacity(assignments.len());
        let mut values = Vec::with_capacity(assignments.len() + where_params.len());
        for (i, (column, value)) in assignments.iter().enumerate() {
            let quoted_column = crate::sql_safety::quote_identifier(column)?;
            sets.push(format!("{quoted_column} = ?{}", i + 1));
            values.push(value_to_sql(value));
        }
        for param in where_params {
            values.push(value_to_sql(param));
        }
        let sql = format!(
            "UPDATE {quoted_table} SET {} WHERE {where_clause}",
            sets.join(", ")
        );
        let conn = self.inner.conn.lock();
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        Ok(affected)
    }

    /// Deletes rows matching `where_clause`.
    pub(crate) fn sql_delete(
        &self,
        table: &str,
        where_clause: &str,
        where_params: &[Value],
        overrides: &FunctionOverride<'_>,
    ) -> Result<usize> {
        validate_clause(where_clause, &self.state.safety, overrides)?;
        let quoted_table = crate::sql_safety::quote_identifier(table)?;
        let sql = format!("DELETE FROM {quoted_table} WHERE {where_clause}");
        let values: Vec<SqlValue> = where_params.iter().map(value_to_sql).collect();
        let conn = self.inner.conn.lock();
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        Ok(affected)
    }

    /// Inserts `row`, or updates `update_columns` on the existing row when
    /// `conflict_column` already has that value (`INSERT ... ON CONFLICT ...
    /// DO UPDATE`).
    pub(crate) fn upsert(
        &self,
        table: &str,
        row: &[(String, Value)],
        conflict_column: &str,
        update_columns: &[String],
    ) -> Result<()> {
        let quoted_table = crate::sql_safety::quote_identifier(table)?;
        let quoted_conflict = crate::sql_safety::quote_identifier(conflict_column)?;
        let mut columns = Vec::with_capacity(row.len());
        let mut placeholders = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (i, (column, value)) in row.iter().enumerate() {
            columns.push(crate::sql_safety::quote_identifier(column)?);
            placeholders.push(format!("?{}", i + 1));
            values.push(value_to_sql(value));
        }
        let mut updates = Vec::with_capacity(update_columns.len());
        for column in update_columns {
            let quoted_column = crate::sql_safety::quote_identifier(column)?;
            updates.push(format!("{quoted_column} = excluded.{quoted_column}"));
        }
        let sql = format!(
            "INSERT INTO {quoted_table} ({}) VALUES ({}) ON CONFLICT({quoted_conflict}) DO UPDATE SET {}",
            columns.join(", "),
            placeholders.join(", "),
            updates.join(", ")
        );
        self.inner
            .conn
            .lock()
            .execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        Ok(())
    }
}
