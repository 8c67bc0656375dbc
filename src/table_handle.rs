//! A handle onto a second table inside the same database file, built via
//! [`crate::Handle::table`]. Shares the parent's connection and closed flag;
//! owns its own cache, codec, and SQL-safety configuration.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::core::{Core, HandleInner, TableState, TransactionGuard};
use crate::error::{Error, Result};
use crate::sql_safety::FunctionOverride;
use crate::value::Value;

/// A sub-table handle. Calling [`TableHandle::close`] detaches only this
/// handle; it never affects the parent [`crate::Handle`] or any sibling
/// sub-table.
pub struct TableHandle {
    inner: Arc<HandleInner>,
    state: TableState,
    detached: AtomicBool,
}

impl TableHandle {
    pub(crate) fn new(inner: Arc<HandleInner>, state: TableState) -> Self {
        TableHandle {
            inner,
            state,
            detached: AtomicBool::new(false),
        }
    }

    pub(crate) fn core(&self) -> Core<'_> {
        Core {
            inner: &self.inner,
            state: &self.state,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.detached.load(Ordering::SeqCst) {
            return Err(Error::Closed {
                table: Some(self.state.table.clone()),
            });
        }
        if self.inner.is_closed() {
            return Err(Error::Closed {
                table: Some(self.state.table.clone()),
            });
        }
        Ok(())
    }

    /// Detaches this handle only. The parent handle and the underlying
    /// connection remain open.
    pub fn close(&self) {
        self.detached.store(true, Ordering::SeqCst);
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

    /// Mirrors Python's `iter(dict)`, which yields keys only; see
    /// [`crate::Handle::iter`].
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

    pub fn fetch_one(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        self.check_open()?;
        self.core().fetch_one(sql, params)
    }

    pub fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>> {
        self.check_open()?;
        self.core().fetch_all(sql, params)
    }

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

    pub fn get_table_schema(&self, table: &str) -> Result<Vec<crate::core::ColumnInfo>> {
        self.check_open()?;
        self.core().get_table_schema(table)
    }

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

    pub fn transaction(&self) -> Result<TransactionGuard<'_>> {
        self.check_open()?;
        TransactionGuard::begin(self.core())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NanokvConfig;
    use crate::handle::Handle;
    use tempfile::tempdir;

    #[test]
    fn sub_table_cache_is_isolated_from_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nanokv.db");
        let config = NanokvConfig::builder().path(path.to_string_lossy().to_string());
        let handle = Handle::open(config).unwrap();
        let child = handle.table("secondary").unwrap();

        handle.set("shared_key", "parent_value").unwrap();
        child.set("shared_key", "child_value").unwrap();

        assert_eq!(
            handle.get("shared_key").unwrap(),
            Some(Value::from("parent_value"))
        );
        assert_eq!(
            child.get("shared_key").unwrap(),
            Some(Value::from("child_value"))
        );
    }

    #[test]
    fn closing_child_does_not_close_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nanokv.db");
        let config = NanokvConfig::builder().path(path.to_string_lossy().to_string());
        let handle = Handle::open(config).unwrap();
        let child = handle.table("secondary").unwrap();
        child.close();

        assert!(child.get("x").is_err());
        assert!(handle.get("x").is_ok());
    }

    #[test]
    fn closing_parent_closes_child() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nanokv.db");
        let config = NanokvConfig::builder().path(path.to_string_lossy().to_string());
        let handle = Handle::open(config).unwrap();
        let child = handle.table("secondary").unwrap();
        handle.close();

        let err = child.get("x").unwrap_err();
        assert!(matches!(err, Error::Closed { table: Some(name) } if name == "secondary"));
    }
}
