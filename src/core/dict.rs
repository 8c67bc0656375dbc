//! The dict-like contract: `get`/`set`/`delete`/`contains`/`len`, bulk
//! accessors (`keys`/`values`/`items`/`to_dict`/`copy`), the
//! `Mapping`-flavored helpers (`pop`/`setdefault`/`update`/`clear`), the
//! typed `set_model`/`get_model` pair, and the batch/refresh/load-all
//! operations that keep the cache coherent with the table.

use std::collections::BTreeMap;

use rusqlite::OptionalExtension;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

use super::{now_millis, Core};

impl Core<'_> {
    /// Reads a key, consulting the cache first.
    ///
    /// On a cache miss the row is fetched, decoded, and (unless
    /// `cache_persistence_ttl` judges the on-disk row itself stale) stored
    /// back into the cache before being returned.
    pub(crate) fn get(&self, key: &str) -> Result<Option<Value>> {
        if let Some(value) = self.state.cache.lock().try_get(key) {
            return Ok(Some(value));
        }
        let Some((raw, created_at)) = self.fetch_row(key)? else {
            return Ok(None);
        };
        if self.row_is_stale(created_at) {
            return Ok(None);
        }
        let value = self.state.codec.decode(&raw)?;
        self.state.cache.lock().put(key.to_string(), value.clone());
        Ok(Some(value))
    }

    /// `get`, raising [`Error::KeyMissing`] instead of returning `None`.
    pub(crate) fn get_required(&self, key: &str) -> Result<Value> {
        self.get(key)?
            .ok_or_else(|| Error::KeyMissing(key.to_string()))
    }

    /// Writes a key, database first, then updates the cache — so a crash
    /// between the two never leaves the cache ahead of the table.
    pub(crate) fn set(&self, key: &str, value: &Value) -> Result<()> {
        let encoded = self.state.codec.encode(value)?;
        let table = self.state.quoted_table()?;
        let conn = self.inner.conn.lock();
        if self.state.persistence_ttl {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (key, value, created_at) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, created_at = excluded.created_at"
                ),
                rusqlite::params![key, encoded, now_millis()],
            )?;
        } else {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (key, value) VALUES (?1, ?2) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value"
                ),
                rusqlite::params![key, encoded],
            )?;
        }
        drop(conn);
        self.state.cache.lock().put(key.to_string(), value.clone());
        Ok(())
    }

    /// Deletes a key from both the table and the cache. Deleting an absent
    /// key is a no-op, matching `dict.pop`'s default-less sibling `del` only
    /// raising on a genuinely-used API; nanokv's `delete` is intentionally
    /// idempotent (see `pop` below for the raising variant).
    pub(crate) fn delete(&self, key: &str) -> Result<()> {
        let table = self.state.quoted_table()?;
        self.inner
            .conn
            .lock()
            .execute(&format!("DELETE FROM {table} WHERE key = ?1"), [key])?;
        self.state.cache.lock().invalidate(key);
        Ok(())
    }

    pub(crate) fn contains(&self, key: &str) -> Result<bool> {
        if self.state.cache.lock().contains(key) {
            return Ok(true);
        }
        Ok(self.fetch_row(key)?.is_some())
    }

    /// Authoritative row count, straight from the table (not the cache,
    /// which may hold fewer entries than are persisted).
    pub(crate) fn len(&self) -> Result<usize> {
        let table = self.state.quoted_table()?;
        let conn = self.inner.conn.lock();
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    pub(crate) fn keys(&self) -> Result<Vec<String>> {
        let table = self.state.quoted_table()?;
        let conn = self.inner.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT key FROM {table}"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    pub(crate) fn to_dict(&self) -> Result<BTreeMap<String, Value>> {
        let table = self.state.quoted_table()?;
        let conn = self.inner.conn.lock();
        let has_created_at = self.has_created_at_column(&conn)?;
        let query = if has_created_at {
            format!("SELECT key, value, created_at FROM {table}")
        } else {
            format!("SELECT key, value, NULL FROM {table}")
        };
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let raw: String = row.get(1)?;
            let created_at: Option<i64> = row.get(2)?;
            Ok((key, raw, created_at))
        })?;

        let mut out = BTreeMap::new();
        for row in rows {
            let (key, raw, created_at) = row?;
            if self.row_is_stale(created_at) {
                continue;
            }
            out.insert(key, self.state.codec.decode(&raw)?);
        }
        Ok(out)
    }

    pub(crate) fn values(&self) -> Result<Vec<Value>> {
        Ok(self.to_dict()?.into_values().collect())
    }

    pub(crate) fn items(&self) -> Result<Vec<(String, Value)>> {
        Ok(self.to_dict()?.into_iter().collect())
    }

    /// Shallow snapshot of the whole table; identical to `to_dict` under a
    /// different name to mirror `dict.copy()`.
    pub(crate) fn copy(&self) -> Result<BTreeMap<String, Value>> {
        self.to_dict()
    }

    pub(crate) fn clear(&self) -> Result<()> {
        let table = self.state.quoted_table()?;
        self.inner
            .conn
            .lock()
            .execute(&format!("DELETE FROM {table}"), [])?;
        self.state.cache.lock().invalidate_all();
        *self.state.all_loaded.lock().unwrap() = false;
        Ok(())
    }

    /// Removes `key` and returns its value, raising [`Error::KeyMissing`] if
    /// absent (unlike `delete`, which is silent on a missing key).
    pub(crate) fn pop(&self, key: &str) -> Result<Value> {
        let value = self.get_required(key)?;
        self.delete(key)?;
        Ok(value)
    }

    pub(crate) fn setdefault(&self, key: &str, default: &Value) -> Result<Value> {
        if let Some(existing) = self.get(key)? {
            return Ok(existing);
        }
        self.set(key, default)?;
        Ok(default.clone())
    }

    /// Merges `entries` in, one `set` per entry (not a single transaction —
    /// use `batch_update` for an all-or-nothing write).
    pub(crate) fn update(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Re-reads `key` (or, if `None`, every key currently cached) from the
    /// table, discarding any in-memory value even if the table row is
    /// unchanged.
    pub(crate) fn refresh(&self, key: Option<&str>) -> Result<()> {
        match key {
            Some(key) => {
                self.state.cache.lock().invalidate(key);
                self.get(key)?;
                Ok(())
            }
            None => {
                let keys: Vec<String> = {
                    let mut cache = self.state.cache.lock();
                    cache.invalidate_all();
                    self.keys()?
                };
                for key in keys {
                    self.get(&key)?;
                }
                Ok(())
            }
        }
    }

    /// Loads every row into the cache in one pass and marks the table fully
    /// cached; calling this again is a cheap no-op.
    pub(crate) fn load_all(&self) -> Result<()> {
        if *self.state.all_loaded.lock().unwrap() {
            return Ok(());
        }
        for (key, value) in self.to_dict()? {
            self.state.cache.lock().put(key, value);
        }
        *self.state.all_loaded.lock().unwrap() = true;
        Ok(())
    }

    pub(crate) fn is_cached(&self, key: &str) -> bool {
        self.state.cache.lock().contains(key)
    }

    /// Applies every `(key, value)` pair inside one `IMMEDIATE` transaction;
    /// a failure partway through rolls back the whole batch and leaves the
    /// cache untouched.
    pub(crate) fn batch_update(&self, entries: &[(String, Value)]) -> Result<()> {
        let table = self.state.quoted_table()?;
        let encoded: Vec<(String, String)> = entries
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.state.codec.encode(v)?)))
            .collect::<Result<Vec<_>>>()?;

        {
            let mut conn = self.inner.conn.lock();
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            for (key, value) in &encoded {
                if self.state.persistence_ttl {
                    tx.execute(
                        &format!(
                            "INSERT INTO {table} (key, value, created_at) VALUES (?1, ?2, ?3) \
                             ON CONFLICT(key) DO UPDATE SET value = excluded.value, created_at = excluded.created_at"
                        ),
                        rusqlite::params![key, value, now_millis()],
                    )?;
                } else {
                    tx.execute(
                        &format!(
                            "INSERT INTO {table} (key, value) VALUES (?1, ?2) \
                             ON CONFLICT(key) DO UPDATE SET value = excluded.value"
                        ),
                        rusqlite::params![key, value],
                    )?;
                }
            }
            tx.commit()?;
        }

        let mut cache = self.state.cache.lock();
        for (key, value) in entries {
            cache.put(key.clone(), value.clone());
        }
        Ok(())
    }

    /// Deletes every key in `keys` inside one `IMMEDIATE` transaction.
    pub(crate) fn batch_delete(&self, keys: &[String]) -> Result<()> {
        let table = self.state.quoted_table()?;
        {
            let mut conn = self.inner.conn.lock();
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            for key in keys {
                tx.execute(&format!("DELETE FROM {table} WHERE key = ?1"), [key])?;
            }
            tx.commit()?;
        }
        let mut cache = self.state.cache.lock();
        for key in keys {
            cache.invalidate(key);
        }
        Ok(())
    }

    /// Stores `model` tagged with its type name, so [`Core::get_model`] can
    /// confirm the caller is deserializing into the same shape that was
    /// written.
    pub(crate) fn set_model<T: Serialize>(&self, key: &str, model: &T) -> Result<()> {
        let type_name = std::any::type_name::<T>();
        let data = serde_json::to_value(model).map_err(|e| Error::Type(e.to_string()))?;
        let mut tagged = serde_json::Map::new();
        tagged.insert("__type__".to_string(), serde_json::Value::String(type_name.to_string()));
        tagged.insert("__data__".to_string(), data);
        self.set(key, &Value::from(serde_json::Value::Object(tagged)))
    }

    /// Reads back a value written with [`Core::set_model`], rejecting a type
    /// mismatch rather than silently deserializing into the wrong shape.
    pub(crate) fn get_model<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get_required(key)?;
        let expected = std::any::type_name::<T>();
        let object = value
            .as_object()
            .ok_or_else(|| Error::Type(format!("value at '{key}' is not a tagged model")))?;
        let actual_type = object
            .get("__type__")
            .and_then(|v| v.0.as_str().map(str::to_string))
            .ok_or_else(|| Error::Type(format!("value at '{key}' has no __type__ tag")))?;
        if actual_type != expected {
            return Err(Error::Type(format!(
                "model type mismatch at '{key}': stored '{actual_type}', expected '{expected}'"
            )));
        }
        let data = object
            .get("__data__")
            .cloned()
            .ok_or_else(|| Error::Type(format!("value at '{key}' has no __data__ payload")))?;
        data.into_typed()
    }

    fn fetch_row(&self, key: &str) -> Result<Option<(String, Option<i64>)>> {
        let table = self.state.quoted_table()?;
        let conn = self.inner.conn.lock();
        if self.has_created_at_column(&conn)? {
            conn.query_row(
                &format!("SELECT value, created_at FROM {table} WHERE key = ?1"),
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(Error::from)
        } else {
            conn.query_row(
                &format!("SELECT value FROM {table} WHERE key = ?1"),
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(Error::from)
            .map(|opt| opt.map(|raw| (raw, None)))
        }
    }

    fn has_created_at_column(&self, conn: &rusqlite::Connection) -> Result<bool> {
        if !self.state.persistence_ttl {
            return Ok(false);
        }
        let table = self.state.table.clone();
        let mut stmt = conn.prepare("SELECT 1 FROM pragma_table_info(?1) WHERE name = 'created_at'")?;
        let exists = stmt.exists([table])?;
        Ok(exists)
    }

    fn row_is_stale(&self, created_at: Option<i64>) -> bool {
        let (Some(ttl), Some(created_at)) = (self.state.cache_ttl, created_at) else {
            return false;
        };
        if !self.state.persistence_ttl {
            return false;
        }
        let age_ms = now_millis().saturating_sub(created_at);
        age_ms > ttl.as_millis() as i64
    }
}
