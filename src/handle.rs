//! The primary, synchronous database handle.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{de::DeserializeOwned, Serialize};

use crate::cache::build_strategy;
use crate::codec::Codec;
use crate::config::NanokvConfig;
use crate::core::{check_open, Core, HandleInner, TableState, TransactionGuard};
use crate::error::Result;
use crate::sql_safety::{FunctionOverride, SqlSafetyConfig};
use crate::table_handle::TableHandle;
use crate::value::Value;

/// An open connection to a nanokv database file, owning the primary table's
/// cache, codec, and SQL-safety configuration.
///
/// Cloning a `Handle` is cheap (an `Arc` clone) and yields another handle
/// sharing the same underlying connection and closed flag, but with its own
/// independent view of the primary table's cache — mirroring
/// [`crate::TableHandle`]'s relationship to its parent.
pub struct Handle {
    inner: Arc<HandleInner>,
    state: TableState,
}

impl Handle {
    /// Opens (creating if absent) the SQLite file at `config.path`, applies
    /// the configured PRAGMAs, and ensures the primary table exists.
    pub fn open(config: NanokvConfig) -> Result<Self> {
        let conn = Connection::open(&config.path)?;
        apply_pragmas(&conn, &config)?;

        let codec = match &config.encryption_key {
            Some(key) => Codec::encrypted(key, config.encryption_mode)?,
            None => Codec::plain(),
        };

        let safety = SqlSafetyConfig {
            strict_sql_validation: config.strict_sql_validation,
            max_clause_length: config.max_clause_length,
            handle_allowed_functions: config
                .allowed_sql_functions
                .iter()
                .map(|s| s.to_ascii_uppercase())
                .collect(),
            forbidden_functions: config
                .forbidden_sql_functions
                .iter()
                .map(|s| s.to_ascii_uppercase())
                .collect(),
        };

        let cache_ttl = config.cache_ttl.map(Duration::from_secs);
        let cache = build_strategy(config.cache_strategy, config.cache_size, cache_ttl);

        let inner = Arc::new(HandleInner {
            conn: Mutex::new(conn),
            closed: AtomicBool::new(false),
            db_path: config.path.clone(),
        });
        let state = TableState {
            table: config.table.clone(),
            cache: Mutex::new(cache),
            codec,
            safety,
            all_loaded: std::sync::Mutex::new(false),
            persistence_ttl: config.cache_persistence_ttl,
            cache_ttl,
        };

        let handle = Handle { inner, state };
        handle.core().ensure_schema()?;
        if config.bulk_load {
            handle.core().load_all()?;
        }
        info!("opened nanokv handle at {}", handle.inner.db_path);
        Ok(handle)
    }

    fn core(&self) -> Core<'_> {
        Core {
            inner: &self.inner,
            state: &self.state,
        }
    }

    /// The primary table's name, for building pool-path SQL without a
    /// borrowed `Core`.
    pub(crate) fn table_name(&self) -> &str {
        &self.state.table
    }

    /// The primary table's SQL-safety configuration, shared read-only with
    /// the async façade's read-pool path.
    pub(crate) fn safety_config(&self) -> &SqlSafetyConfig {
        &self.state.safety
    }

    /// The path the underlying file was opened at, for opening additional
    /// read-only connections against the same file.
    pub(crate) fn db_path(&self) -> &str {
        &self.inner.db_path
    }

    fn check_open(&self) -> Result<()> {
        check_open(&self.inner, None)
    }

    /// Builds a sub-table handle sharing this handle's connection and closed
    /// flag but with its own independent cache, codec, and safety config.
    pub fn table(&self, name: impl Into<String>) -> Result<TableHandle> {
        self.check_open()?;
        let name = name.into();
        let state = TableState {
            table: name.clone(),
            cache: Mutex::new(build_strategy(
                crate::config::CacheStrategyKind::Unbounded,
                None,
                None,
            )),
            codec: Codec::plain(),
            safety: SqlSafetyConfig::default(),
            all_loaded: std::sync::Mutex::new(false),
            persistence_ttl: false,
            cache_ttl: None,
        };
        let table_handle = TableHandle::new(Arc::clone(&self.inner), state);
        table_handle.core().ensure_schema()?;
        Ok(table_handle)
    }

    /// Closes this handle. Any sub-table built from it also becomes unusable
    /// (they share the same closed flag).
    pub fn close(&self) {
        debug!("closing nanokv handle at {}", self.inner.db_path);
        self.inner.mark_closed();
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.check_open()?;
        self.core().get(key)
    }

    pub fn get_required(&self, key: &str) -> Result<Value> {
        self.check_open()?;
        self.core().get_required(key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.check_open()?;
        self.core().set(key, &value.into())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.check_open()?;
        self.core().delete(key)
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        self.check_open()?;
        self.core().contains(key)
    }

    pub fn len(&self) -> Result<usize> {
        self.check_open()?;
        self.core().len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.check_open()?;
        self.core().keys()
    }

    /// Mirrors Python's `iter(dict)`, which yields keys only (`items()`
    /// yields pairs); an alias over [`Handle::keys`] kept under its own name
    /// for parity with the conceptual dict-like API surface.
    pub fn iter(&self) -> Result<Vec<String>> {
        self.keys()
    }

    pub fn values(&self) -> Result<Vec<Value>> {
        self.check_open()?;
        self.core().values()
    }

    pub fn items(&self) -> Result<Vec<(String, Value)>> {
        self.check_open()?;
        self.core().items()
    }

    pub fn to_dict(&self) -> Result<BTreeMap<String, Value>> {
        self.check_open()?;
        self.core().to_dict()
    }

    pub fn copy(&self) -> Result<BTreeMap<String, Value>> {
        self.check_open()?;
        self.core().copy()
    }

    pub fn clear(&self) -> Result<()> {
        self.check_open()?;
        self.core().clear()
    }

    pub fn pop(&self, key: &str) -> Result<Value> {
        self.check_open()?;
        self.core().pop(key)
    }

    pub fn setdefault(&self, key: &str, default: impl Into<Value>) -> Result<Value> {
        self.check_open()?;
        self.core().setdefault(key, &default.into())
    }

    pub fn update(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        self.check_open()?;
        self.core().update(entries)
    }

    pub fn refresh(&self, key: Option<&str>) -> Result<()> {
        self.check_open()?;
        self.core().refresh(key)
    }

    pub fn load_all(&self) -> Result<()> {
        self.check_open()?;
        self.core().load_all()
    }

    pub fn is_cached(&self, key: &str) -> Result<bool> {
        self.check_open()?;
        Ok(self.core().is_cached(key))
    }

    pub fn batch_update(&self, entries: &[(String, Value)]) -> Result<()> {
        self.check_open()?;
        self.core().batch_update(entries)
    }

    pub fn batch_delete(&self, keys: &[String]) -> Result<()> {
        self.check_open()?;
        self.core().batch_delete(keys)
    }

    pub fn set_model<T: Serialize>(&self, key: &str, model: &T) -> Result<()> {
        self.check_open()?;
        self.core().set_model(key, model)
    }

    pub fn get_model<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.check_open()?;
        self.core().get_model(key)
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.check_open()?;
        self.core().execute(sql, params)
    }

    pub fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> Result<usize> {
        self.check_open()?;
        self.core().execute_many(sql, param_sets)
    }

    pub fn fetch_one(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        self.check_open()?;
        self.core().fetch_one(sql, params)
    }

    pub fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>> {
        self.check_open()?;
        self.core().fetch_all(sql, params)
    }

    /// Runs a `SELECT` against `table` (the primary table when `None`).
    #[allow(clippy::too_many_arguments)]
    pub fn query(
        &self,
        table: Option<&str>,
        columns: &str,
        where_clause: Option<&str>,
        order_by: Option<&str>,
        params: &[Value],
        overrides: &FunctionOverride<'_>,
    ) -> Result<Vec<Value>> {
        self.check_open()?;
        self.core()
            .query(table, columns, where_clause, order_by, params, overrides)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn query_with_pagination(
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
        self.check_open()?;
        self.core().query_with_pagination(
            table, columns, where_clause, order_by, params, overrides, limit, offset,
        )
    }

    /// `COUNT(*)` against `table` (the primary table when `None`).
    pub fn count(
        &self,
        table: Option<&str>,
        where_clause: Option<&str>,
        params: &[Value],
        overrides: &FunctionOverride<'_>,
    ) -> Result<i64> {
        self.check_open()?;
        self.core().count(table, where_clause, params, overrides)
    }

    /// `EXISTS(...)` against `table` (the primary table when `None`).
    pub fn exists(
        &self,
        table: Option<&str>,
        where_clause: &str,
        params: &[Value],
        overrides: &FunctionOverride<'_>,
    ) -> Result<bool> {
        self.check_open()?;
        self.core().exists(table, where_clause, params, overrides)
    }

    pub fn sql_insert(&self, table: &str, row: &[(String, Value)]) -> Result<i64> {
        self.check_open()?;
        self.core().sql_insert(table, row)
    }

    pub fn sql_update(
        &self,
        table: &str,
        assignments: &[(String, Value)],
        where_clause: &str,
        where_params: &[Value],
        overrides: &FunctionOverride<'_>,
    ) -> Result<usize> {
        self.check_open()?;
        self.core()
            .sql_update(table, assignments, where_clause, where_params, overrides)
    }

    pub fn sql_delete(
        &self,
        table: &str,
        where_clause: &str,
        where_params: &[Value],
        overrides: &FunctionOverride<'_>,
    ) -> Result<usize> {
        self.check_open()?;
        self.core().sql_delete(table, where_clause, where_params, overrides)
    }

    pub fn upsert(
        &self,
        table: &str,
        row: &[(String, Value)],
        conflict_column: &str,
        update_columns: &[String],
    ) -> Result<()> {
        self.check_open()?;
        self.core().upsert(table, row, conflict_column, update_columns)
    }

    pub fn create_table(&self, name: &str, columns: &str) -> Result<()> {
        self.check_open()?;
        self.core().create_table(name, columns)
    }

    pub fn create_index(&self, index_name: &str, table: &str, columns: &[String], unique: bool) -> Result<()> {
        self.check_open()?;
        self.core().create_index(index_name, table, columns, unique)
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.check_open()?;
        self.core().drop_table(name)
    }

    pub fn drop_index(&self, index_name: &str) -> Result<()> {
        self.check_open()?;
        self.core().drop_index(index_name)
    }

    pub fn alter_table_add_column(&self, table: &str, column: &str, sql_type: &str) -> Result<()> {
        self.check_open()?;
        self.core().alter_table_add_column(table, column, sql_type)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        self.check_open()?;
        self.core().table_exists(table)
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.check_open()?;
        self.core().list_tables()
    }

    pub fn list_indexes(&self, table: &str) -> Result<Vec<String>> {
        self.check_open()?;
        self.core().list_indexes(table)
    }

    pub fn get_table_schema(&self, table: &str) -> Result<Vec<crate::core::ColumnInfo>> {
        self.check_open()?;
        self.core().get_table_schema(table)
    }

    pub fn vacuum(&self) -> Result<()> {
        self.check_open()?;
        self.core().vacuum()
    }

    pub fn get_db_size(&self) -> Result<u64> {
        self.check_open()?;
        self.core().get_db_size()
    }

    pub fn export_table_to_dict(&self, table: &str) -> Result<Vec<Value>> {
        self.check_open()?;
        self.core().export_table_to_dict(table)
    }

    pub fn import_from_dict_list(
        &self,
        table: &str,
        rows: &[BTreeMap<String, Value>],
    ) -> Result<usize> {
        self.check_open()?;
        self.core().import_from_dict_list(table, rows)
    }

    pub fn get_last_insert_rowid(&self) -> Result<i64> {
        self.check_open()?;
        Ok(self.core().get_last_insert_rowid())
    }

    pub fn pragma(&self, name: &str, value: Option<&str>) -> Result<Option<String>> {
        self.check_open()?;
        self.core().pragma(name, value)
    }

    pub fn checkpoint(&self, mode: &str) -> Result<(i64, i64, i64)> {
        self.check_open()?;
        self.core().checkpoint(mode)
    }

    pub fn begin_transaction(&self) -> Result<()> {
        self.check_open()?;
        self.core().begin_transaction()
    }

    pub fn commit(&self) -> Result<()> {
        self.check_open()?;
        self.core().commit()
    }

    pub fn rollback(&self) -> Result<()> {
        self.check_open()?;
        self.core().rollback()
    }

    /// Opens a scoped transaction that rolls back on drop unless
    /// [`TransactionGuard::commit`] is called.
    pub fn transaction(&self) -> Result<TransactionGuard<'_>> {
        self.check_open()?;
        TransactionGuard::begin(self.core())
    }
}

/// Applies the performance/locking PRAGMAs named in `config`, in order:
/// journal mode, synchronous level, mmap size, cache size, temp store, page
/// size, busy timeout, locking mode, then WAL checkpoint threshold.
fn apply_pragmas(conn: &Connection, config: &NanokvConfig) -> Result<()> {
    if config.optimize {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch("PRAGMA mmap_size=268435456;")?;
        conn.execute_batch(&format!(
            "PRAGMA cache_size=-{};",
            config.cache_size_mb.max(1) * 1024
        ))?;
        conn.execute_batch("PRAGMA temp_store=MEMORY;")?;
        conn.execute_batch("PRAGMA page_size=4096;")?;
    }
    if let Some(timeout_ms) = config.busy_timeout_ms {
        conn.busy_timeout(Duration::from_millis(timeout_ms as u64))?;
    }
    if config.exclusive_lock {
        conn.execute_batch("PRAGMA locking_mode=EXCLUSIVE;")?;
    }
    if let Some(pages) = config.wal_autocheckpoint {
        conn.execute_batch(&format!("PRAGMA wal_autocheckpoint={pages};"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn temp_config() -> (tempfile::TempDir, NanokvConfig) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nanokv.db");
        let config = NanokvConfig::builder().path(path.to_string_lossy().to_string());
        (dir, config)
    }

    #[test]
    fn set_then_get_round_trips() {
        let (_dir, config) = temp_config();
        let handle = Handle::open(config).unwrap();
        handle.set("name", "ada").unwrap();
        assert_eq!(handle.get("name").unwrap(), Some(Value::from("ada")));
    }

    #[test]
    fn get_missing_key_is_none() {
        let (_dir, config) = temp_config();
        let handle = Handle::open(config).unwrap();
        assert_eq!(handle.get("missing").unwrap(), None);
    }

    #[test]
    fn delete_then_contains_is_false() {
        let (_dir, config) = temp_config();
        let handle = Handle::open(config).unwrap();
        handle.set("k", "v").unwrap();
        handle.delete("k").unwrap();
        assert!(!handle.contains("k").unwrap());
    }

    #[test]
    fn closed_handle_rejects_operations() {
        let (_dir, config) = temp_config();
        let handle = Handle::open(config).unwrap();
        handle.close();
        let err = handle.get("anything").unwrap_err();
        assert!(matches!(err, crate::error::Error::Closed { table: None }));
    }

    #[test]
    fn reserved_word_table_name_round_trips() {
        let (_dir, mut config) = temp_config();
        config.table = "group".to_string();
        let handle = Handle::open(config).unwrap();
        handle.set("k", "v").unwrap();
        assert_eq!(handle.get("k").unwrap(), Some(Value::from("v")));
    }

    #[test]
    fn batch_update_is_all_or_nothing_on_success() {
        let (_dir, config) = temp_config();
        let handle = Handle::open(config).unwrap();
        let entries = vec![
            ("a".to_string(), Value::from(1_i64)),
            ("b".to_string(), Value::from(2_i64)),
        ];
        handle.batch_update(&entries).unwrap();
        assert_eq!(handle.len().unwrap(), 2);
    }

    #[test]
    fn transaction_guard_rolls_back_on_drop() {
        let (_dir, config) = temp_config();
        let handle = Handle::open(config).unwrap();
        handle
            .create_table("t", "id INTEGER PRIMARY KEY, label TEXT")
            .unwrap();
        {
            let _guard = handle.transaction().unwrap();
            handle
                .sql_insert("t", &[("label".to_string(), Value::from("x"))])
                .unwrap();
        }
        let count = handle
            .count(Some("t"), None, &[], &FunctionOverride::default())
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn query_against_other_table_quotes_reserved_word_columns() {
        let (_dir, config) = temp_config();
        let handle = Handle::open(config).unwrap();
        handle
            .create_table("t", "\"group\" TEXT, name TEXT")
            .unwrap();
        handle
            .sql_insert(
                "t",
                &[
                    ("group".to_string(), Value::from("Admin")),
                    ("name".to_string(), Value::from("Alice")),
                ],
            )
            .unwrap();

        let rows = handle
            .query(
                Some("t"),
                "group, name",
                None,
                None,
                &[],
                &FunctionOverride::default(),
            )
            .unwrap();

        assert_eq!(
            rows,
            vec![Value::from_serializable(&serde_json::json!({
                "group": "Admin",
                "name": "Alice",
            }))
            .unwrap()]
        );
    }

    #[test]
    fn checkpoint_returns_a_triple() {
        let (_dir, config) = temp_config();
        let handle = Handle::open(config).unwrap();
        handle.set("k", "v").unwrap();
        let (_busy, _log, _checkpointed) = handle.checkpoint("PASSIVE").unwrap();
    }
}
