//! DDL helpers: table/index creation, introspection, and the key/value
//! table's own bootstrap (`ensure_schema`, called once from `Handle::open`
//! and `Handle::table`).

use crate::error::Result;
use crate::sql_safety::quote_identifier;

use super::Core;

/// A single column as reported by `get_table_schema`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

impl Core<'_> {
    /// Creates the key/value table for this handle's table name if it does
    /// not already exist, adding the `created_at` column when
    /// `cache_persistence_ttl` is enabled.
    pub(crate) fn ensure_schema(&self) -> Result<()> {
        let table = self.state.quoted_table()?;
        let conn = self.inner.conn.lock();
        conn.execute(
            &format!("CREATE TABLE IF NOT EXISTS {table} (key TEXT PRIMARY KEY, value TEXT)"),
            [],
        )?;
        if self.state.persistence_ttl {
            let has_column: bool = {
                let mut stmt = conn.prepare(
                    "SELECT 1 FROM pragma_table_info(?1) WHERE name = 'created_at'",
                )?;
                stmt.exists([&self.state.table])?
            };
            if !has_column {
                conn.execute(
                    &format!("ALTER TABLE {table} ADD COLUMN created_at INTEGER"),
                    [],
                )?;
            }
        }
        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS <name> (<columns>)`; `columns` is a
    /// caller-assembled column-definition list (e.g. `"id INTEGER PRIMARY
    /// KEY, label TEXT"`), passed through unescaped since SQLite column
    /// definitions are not expressible as bound parameters.
    pub(crate) fn create_table(&self, name: &str, columns: &str) -> Result<()> {
        let quoted = quote_identifier(name)?;
        self.inner.conn.lock().execute(
            &format!("CREATE TABLE IF NOT EXISTS {quoted} ({columns})"),
            [],
        )?;
        Ok(())
    }

    pub(crate) fn drop_table(&self, name: &str) -> Result<()> {
        let quoted = quote_identifier(name)?;
        self.inner
            .conn
            .lock()
            .execute(&format!("DROP TABLE IF EXISTS {quoted}"), [])?;
        Ok(())
    }

    pub(crate) fn create_index(
        &self,
        index_name: &str,
        table: &str,
        columns: &[String],
        unique: bool,
    ) -> Result<()> {
        let quoted_index = quote_identifier(index_name)?;
        let quoted_table = quote_identifier(table)?;
        let mut quoted_columns = Vec::with_capacity(columns.len());
        for column in columns {
            quoted_columns.push(quote_identifier(column)?);
        }
        let unique_kw = if unique { "UNIQUE " } else { "" };
        self.inner.conn.lock().execute(
            &format!(
                "CREATE {unique_kw}INDEX IF NOT EXISTS {quoted_index} ON {quoted_table} ({})",
                quoted_columns.join(", ")
            ),
            [],
        )?;
        Ok(())
    }

    pub(crate) fn drop_index(&self, index_name: &str) -> Result<()> {
        let quoted = quote_identifier(index_name)?;
        self.inner
            .conn
            .lock()
            .execute(&format!("DROP INDEX IF EXISTS {quoted}"), [])?;
        Ok(())
    }

    pub(crate) fn alter_table_add_column(
        &self,
        table: &str,
        column: &str,
        sql_type: &str,
    ) -> Result<()> {
        let quoted_table = quote_identifier(table)?;
        let quoted_column = quote_identifier(column)?;
        self.inner.conn.lock().execute(
            &format!("ALTER TABLE {quoted_table} ADD COLUMN {quoted_column} {sql_type}"),
            [],
        )?;
        Ok(())
    }

    pub(crate) fn table_exists(&self, table: &str) -> Result<bool> {
        let conn = self.inner.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )?;
        Ok(stmt.exists([table])?)
    }

    pub(crate) fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.inner.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(crate::error::Error::from)
    }

    pub(crate) fn list_indexes(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.inner.conn.lock();
        let mut stmt = conn.prepare("PRAGMA index_list(?1)")?;
        let rows = stmt.query_map([table], |row| row.get::<_, String>(1))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(crate::error::Error::from)
    }

    pub(crate) fn get_table_schema(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let conn = self.inner.conn.lock();
        let mut stmt = conn.prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1)")?;
        let rows = stmt.query_map([table], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                sql_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                primary_key: row.get::<_, i64>(3)? != 0,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(crate::error::Error::from)
    }
}
