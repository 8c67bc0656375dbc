//! Administrative operations: `vacuum`, size/row introspection, bulk
//! export/import against arbitrary tables, and the PRAGMA/WAL surface
//! (`pragma`, `checkpoint`).

use crate::error::{Error, Result};
use crate::sql_safety::quote_identifier;

use super::convert::{row_to_object, value_to_sql};
use super::Core;

impl Core<'_> {
    pub(crate) fn vacuum(&self) -> Result<()> {
        self.inner.conn.lock().execute_batch("VACUUM")?;
        Ok(())
    }

    /// Database file size in bytes, via `page_count * page_size`.
    pub(crate) fn get_db_size(&self) -> Result<u64> {
        let conn = self.inner.conn.lock();
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok((page_count * page_size).max(0) as u64)
    }

    pub(crate) fn get_last_insert_rowid(&self) -> i64 {
        self.inner.conn.lock().last_insert_rowid()
    }

    /// Dumps an arbitrary table's full contents as JSON objects.
    pub(crate) fn export_table_to_dict(&self, table: &str) -> Result<Vec<crate::value::Value>> {
        let quoted = quote_identifier(table)?;
        let conn = self.inner.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT * FROM {quoted}"))?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt.query_map([], |row| {
            row_to_object(row, &column_names).map_err(|_| rusqlite::Error::InvalidQuery)
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Inserts every row of `rows` into `table` inside one transaction; each
    /// row must carry the same set of columns as the first.
    pub(crate) fn import_from_dict_list(
        &self,
        table: &str,
        rows: &[std::collections::BTreeMap<String, crate::value::Value>],
    ) -> Result<usize> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let quoted_table = quote_identifier(table)?;
        let columns: Vec<String> = first.keys().cloned().collect();
        let mut quoted_columns = Vec::with_capacity(columns.len());
        for column in &columns {
            quoted_columns.push(quote_identifier(column)?);
        }
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {quoted_table} ({}) VALUES ({})",
            quoted_columns.join(", "),
            placeholders.join(", ")
        );

        let mut conn = self.inner.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        for row in rows {
            let values: Vec<_> = columns
                .iter()
                .map(|c| {
                    row.get(c)
                        .map(value_to_sql)
                        .unwrap_or(rusqlite::types::Value::Null)
                })
                .collect();
            tx.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
            inserted += 1;
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Runs a bare `PRAGMA <name>` (no assignment) and returns its scalar
    /// result as text, or `PRAGMA <name> = <value>` when `value` is given.
    pub(crate) fn pragma(&self, name: &str, value: Option<&str>) -> Result<Option<String>> {
        let conn = self.inner.conn.lock();
        match value {
            Some(value) => {
                conn.execute_batch(&format!("PRAGMA {name} = {value}"))?;
                Ok(None)
            }
            None => conn
                .query_row(&format!("PRAGMA {name}"), [], |row| row.get::<_, String>(0))
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })
                .map_err(Error::from),
        }
    }

    /// Runs `PRAGMA wal_checkpoint(<mode>)` and returns the raw
    /// `(busy, log, checkpointed)` triple SQLite reports.
    pub(crate) fn checkpoint(&self, mode: &str) -> Result<(i64, i64, i64)> {
        let conn = self.inner.conn.lock();
        conn.query_row(&format!("PRAGMA wal_checkpoint({mode})"), [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .map_err(Error::from)
    }
}
