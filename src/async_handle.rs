//! Asynchronous façade over [`crate::Handle`].
//!
//! Every operation has the same semantics as its synchronous counterpart; it
//! is simply submitted to a bounded dispatch queue and executed by a
//! dedicated blocking worker so the calling task suspends instead of
//! blocking the executor. Writes on the primary connection are strictly
//! FIFO-ordered because exactly one logical worker drains the dispatch
//! channel and awaits each job to completion before picking up the next one,
//! routing every write through a single worker regardless of `max_workers`.
//!
//! When `read_pool_size > 0`, `fetch_one`/`fetch_all`/`query`/
//! `query_with_pagination` run against a small pool of dedicated read-only
//! connections instead of funneling through the single writer queue, so
//! concurrent reads do not wait behind writes (or each other).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex as SyncMutex;
use rusqlite::{Connection, OpenFlags};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{mpsc, oneshot, Semaphore};

use crate::config::NanokvConfig;
use crate::core::{assemble_select, fetch_all_on, fetch_one_on, ColumnInfo};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::sql_safety::{quote_identifier, FunctionOverride};
use crate::table_handle::TableHandle;
use crate::value::Value;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Turns a borrowed [`FunctionOverride`] into owned data that can cross the
/// `'static` boundary into a worker closure.
struct OwnedOverride {
    allowed: Option<Vec<String>>,
    override_allowed: bool,
    forbidden: Option<Vec<String>>,
}

impl OwnedOverride {
    fn capture(overrides: &FunctionOverride<'_>) -> Self {
        OwnedOverride {
            allowed: overrides.allowed.map(|s| s.to_vec()),
            override_allowed: overrides.override_allowed,
            forbidden: overrides.forbidden.map(|s| s.to_vec()),
        }
    }

    fn borrow(&self) -> FunctionOverride<'_> {
        FunctionOverride {
            allowed: self.allowed.as_deref(),
            override_allowed: self.override_allowed,
            forbidden: self.forbidden.as_deref(),
        }
    }
}

/// Submits `f` to `write_tx`'s worker and awaits its result. Shared by
/// [`AsyncHandle`] and [`AsyncTableHandle`] so both funnel writes through the
/// same single-writer ordering guarantee.
async fn submit<F, T>(write_tx: &mpsc::Sender<Job>, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job: Job = Box::new(move || {
        let _ = tx.send(f());
    });
    write_tx
        .send(job)
        .await
        .map_err(|_| Error::Closed { table: None })?;
    rx.await.map_err(|_| Error::Closed { table: None })?
}

/// A small fixed pool of read-only connections opened against the same
/// file, used to scale concurrent reads off the primary writer connection.
///
/// Grounded in `worldcoin-walletkit/walletkit-db`'s
/// `Connection::open(path, read_only)`, which gates the same native
/// `SQLITE_OPEN_READONLY` flag used here.
struct ReadPool {
    semaphore: Semaphore,
    connections: SyncMutex<Vec<Connection>>,
}

impl ReadPool {
    fn open(path: &str, size: usize) -> Result<Option<Self>> {
        if size == 0 {
            return Ok(None);
        }
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
                    | OpenFlags::SQLITE_OPEN_URI,
            )?;
            connections.push(conn);
        }
        Ok(Some(ReadPool {
            semaphore: Semaphore::new(size),
            connections: SyncMutex::new(connections),
        }))
    }

    /// Acquires a pooled connection, runs `f` against it on a blocking
    /// thread, and returns it to the pool. A mutating statement submitted
    /// here surfaces SQLite's native read-only error unchanged (the
    /// connection itself is opened `SQLITE_OPEN_READ_ONLY`; nothing here
    /// special-cases writes).
    async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("read pool semaphore is never closed");
        let conn = self
            .connections
            .lock()
            .pop()
            .expect("an acquired permit guarantees a free connection");

        let outcome = tokio::task::spawn_blocking(move || {
            let result = f(&conn);
            (conn, result)
        })
        .await;

        drop(permit);
        match outcome {
            Ok((conn, result)) => {
                self.connections.lock().push(conn);
                result
            }
            Err(_) => Err(Error::Validation("read-pool worker panicked".to_string())),
        }
    }
}

/// Asynchronous mirror of [`crate::Handle`].
pub struct AsyncHandle {
    handle: Arc<Handle>,
    write_tx: mpsc::Sender<Job>,
    read_pool: Option<Arc<ReadPool>>,
    closed: Arc<AtomicBool>,
}

impl AsyncHandle {
    /// Opens the database (a quick, synchronous step) and starts the worker
    /// task that drains the write-dispatch queue.
    pub fn open(config: NanokvConfig) -> Result<Self> {
        let path = config.path.clone();
        let max_workers = config.max_workers.max(1);
        let read_pool_size = config.read_pool_size;

        let handle = Arc::new(Handle::open(config)?);
        let read_pool = ReadPool::open(&path, read_pool_size)?.map(Arc::new);

        let (write_tx, mut write_rx) = mpsc::channel::<Job>(max_workers * 4);
        tokio::spawn(async move {
            while let Some(job) = write_rx.recv().await {
                // Awaiting each job before pulling the next preserves FIFO
                // write ordering even though `spawn_blocking` itself draws
                // from Tokio's shared blocking thread pool. Dropping the
                // awaiting caller's future does not abort this job —
                // cancellation is cooperative, never forced.
                let _ = tokio::task::spawn_blocking(job).await;
            }
        });

        info!("opened async nanokv handle (read_pool_size={read_pool_size})");
        Ok(AsyncHandle {
            handle,
            write_tx,
            read_pool,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn submit<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Handle) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed { table: None });
        }
        let handle = Arc::clone(&self.handle);
        submit(&self.write_tx, move || f(&handle)).await
    }

    /// Drains outstanding work, closes the read-only pool connections, then
    /// the primary connection. Subsequent operations fail with
    /// `Error::Closed`.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let handle = Arc::clone(&self.handle);
        // A best-effort final submission: lets any already-queued writes
        // drain before we flip the primary handle's own closed flag.
        let _ = submit(&self.write_tx, move || {
            handle.close();
            Ok(())
        })
        .await;
        debug!("closed async nanokv handle");
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.submit(move |h| h.get(&key)).await
    }

    pub async fn get_required(&self, key: &str) -> Result<Value> {
        let key = key.to_string();
        self.submit(move |h| h.get_required(&key)).await
    }

    pub async fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let key = key.to_string();
        let value = value.into();
        self.submit(move |h| h.set(&key, value)).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.submit(move |h| h.delete(&key)).await
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.submit(move |h| h.contains(&key)).await
    }

    pub async fn len(&self) -> Result<usize> {
        self.submit(|h| h.len()).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.submit(|h| h.keys()).await
    }

    /// Mirrors Python's `iter(dict)`, which yields keys only; see
    /// [`crate::Handle::iter`].
    pub async fn iter(&self) -> Result<Vec<String>> {
        self.keys().await
    }

    pub async fn values(&self) -> Result<Vec<Value>> {
        self.submit(|h| h.values()).await
    }

    pub async fn items(&self) -> Result<Vec<(String, Value)>> {
        self.submit(|h| h.items()).await
    }

    pub async fn to_dict(&self) -> Result<BTreeMap<String, Value>> {
        self.submit(|h| h.to_dict()).await
    }

    pub async fn copy(&self) -> Result<BTreeMap<String, Value>> {
        self.submit(|h| h.copy()).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.submit(|h| h.clear()).await
    }

    pub async fn pop(&self, key: &str) -> Result<Value> {
        let key = key.to_string();
        self.submit(move |h| h.pop(&key)).await
    }

    pub async fn setdefault(&self, key: &str, default: impl Into<Value>) -> Result<Value> {
        let key = key.to_string();
        let default = default.into();
        self.submit(move |h| h.setdefault(&key, default)).await
    }

    pub async fn update(&self, entries: BTreeMap<String, Value>) -> Result<()> {
        self.submit(move |h| h.update(&entries)).await
    }

    pub async fn refresh(&self, key: Option<&str>) -> Result<()> {
        let key = key.map(str::to_string);
        self.submit(move |h| h.refresh(key.as_deref())).await
    }

    pub async fn load_all(&self) -> Result<()> {
        self.submit(|h| h.load_all()).await
    }

    pub async fn is_cached(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.submit(move |h| h.is_cached(&key)).await
    }

    pub async fn batch_update(&self, entries: Vec<(String, Value)>) -> Result<()> {
        self.submit(move |h| h.batch_update(&entries)).await
    }

    pub async fn batch_delete(&self, keys: Vec<String>) -> Result<()> {
        self.submit(move |h| h.batch_delete(&keys)).await
    }

    pub async fn set_model<T>(&self, key: &str, model: T) -> Result<()>
    where
        T: Serialize + Send + 'static,
    {
        let key = key.to_string();
        self.submit(move |h| h.set_model(&key, &model)).await
    }

    pub async fn get_model<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let key = key.to_string();
        self.submit(move |h| h.get_model(&key)).await
    }

    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<usize> {
        let sql = sql.to_string();
        self.submit(move |h| h.execute(&sql, &params)).await
    }

    pub async fn execute_many(&self, sql: &str, param_sets: Vec<Vec<Value>>) -> Result<usize> {
        let sql = sql.to_string();
        self.submit(move |h| h.execute_many(&sql, &param_sets)).await
    }

    /// Runs against the read-only pool when one is configured; otherwise
    /// falls back to the primary connection via the write queue.
    pub async fn fetch_one(&self, sql: &str, params: Vec<Value>) -> Result<Option<Value>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed { table: None });
        }
        let sql_owned = sql.to_string();
        if let Some(pool) = &self.read_pool {
            return pool
                .with_connection(move |conn| fetch_one_on(conn, &sql_owned, &params))
                .await;
        }
        self.submit(move |h| h.fetch_one(&sql_owned, &params)).await
    }

    pub async fn fetch_all(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Value>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed { table: None });
        }
        let sql_owned = sql.to_string();
        if let Some(pool) = &self.read_pool {
            return pool
                .with_connection(move |conn| fetch_all_on(conn, &sql_owned, &params))
                .await;
        }
        self.submit(move |h| h.fetch_all(&sql_owned, &params)).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn query(
        &self,
        table: Option<&str>,
        columns: &str,
        where_clause: Option<&str>,
        order_by: Option<&str>,
        params: Vec<Value>,
        overrides: &FunctionOverride<'_>,
    ) -> Result<Vec<Value>> {
        self.query_with_limit(table, columns, where_clause, order_by, params, overrides, None)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn query_with_pagination(
        &self,
        table: Option<&str>,
        columns: &str,
        where_clause: Option<&str>,
        order_by: Option<&str>,
        params: Vec<Value>,
        overrides: &FunctionOverride<'_>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Value>> {
        self.query_with_limit(
            table,
            columns,
            where_clause,
            order_by,
            params,
            overrides,
            Some((limit, offset)),
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn query_with_limit(
        &self,
        table: Option<&str>,
        columns: &str,
        where_clause: Option<&str>,
        order_by: Option<&str>,
        params: Vec<Value>,
        overrides: &FunctionOverride<'_>,
        limit_offset: Option<(usize, usize)>,
    ) -> Result<Vec<Value>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed { table: None });
        }
        let table = table.map(str::to_string);
        let columns = columns.to_string();
        let where_clause = where_clause.map(str::to_string);
        let order_by = order_by.map(str::to_string);
        let owned_overrides = OwnedOverride::capture(overrides);

        if let Some(pool) = &self.read_pool {
            let quoted_table = match &table {
                Some(table) => quote_identifier(table)?,
                None => quote_identifier(self.handle.table_name())?,
            };
            let safety = self.handle.safety_config().clone();
            return pool
                .with_connection(move |conn| {
                    let mut sql = assemble_select(
                        &quoted_table,
                        &columns,
                        where_clause.as_deref(),
                        order_by.as_deref(),
                        &safety,
                        &owned_overrides.borrow(),
                    )?;
                    if let Some((limit, offset)) = limit_offset {
                        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
                    }
                    fetch_all_on(conn, &sql, &params)
                })
                .await;
        }

        self.submit(move |h| match limit_offset {
            Some((limit, offset)) => h.query_with_pagination(
                table.as_deref(),
                &columns,
                where_clause.as_deref(),
                order_by.as_deref(),
                &params,
                &owned_overrides.borrow(),
                limit,
                offset,
            ),
            None => h.query(
                table.as_deref(),
                &columns,
                where_clause.as_deref(),
                order_by.as_deref(),
                &params,
                &owned_overrides.borrow(),
            ),
        })
        .await
    }

    pub async fn count(
        &self,
        table: Option<&str>,
        where_clause: Option<&str>,
        params: Vec<Value>,
        overrides: &FunctionOverride<'_>,
    ) -> Result<i64> {
        let table = table.map(str::to_string);
        let where_clause = where_clause.map(str::to_string);
        let owned = OwnedOverride::capture(overrides);
        self.submit(move |h| {
            h.count(table.as_deref(), where_clause.as_deref(), &params, &owned.borrow())
        })
        .await
    }

    pub async fn exists(
        &self,
        table: Option<&str>,
        where_clause: &str,
        params: Vec<Value>,
        overrides: &FunctionOverride<'_>,
    ) -> Result<bool> {
        let table = table.map(str::to_string);
        let where_clause = where_clause.to_string();
        let owned = OwnedOverride::capture(overrides);
        self.submit(move |h| h.exists(table.as_deref(), &where_clause, &params, &owned.borrow()))
            .await
    }

    pub async fn sql_insert(&self, table: &str, row: Vec<(String, Value)>) -> Result<i64> {
        let table = table.to_string();
        self.submit(move |h| h.sql_insert(&table, &row)).await
    }

    pub async fn sql_update(
        &self,
        table: &str,
        assignments: Vec<(String, Value)>,
        where_clause: &str,
        where_params: Vec<Value>,
        overrides: &FunctionOverride<'_>,
    ) -> Result<usize> {
        let table = table.to_string();
        let where_clause = where_clause.to_string();
        let owned = OwnedOverride::capture(overrides);
        self.submit(move |h| {
            h.sql_update(&table, &assignments, &where_clause, &where_params, &owned.borrow())
        })
        .await
    }

    pub async fn sql_delete(
        &self,
        table: &str,
        where_clause: &str,
        where_params: Vec<Value>,
        overrides: &FunctionOverride<'_>,
    ) -> Result<usize> {
        let table = table.to_string();
        let where_clause = where_clause.to_string();
        let owned = OwnedOverride::capture(overrides);
        self.submit(move |h| h.sql_delete(&table, &where_clause, &where_params, &owned.borrow()))
            .await
    }

    pub async fn upsert(
        &self,
        table: &str,
        row: Vec<(String, Value)>,
        conflict_column: &str,
        update_columns: Vec<String>,
    ) -> Result<()> {
        let table = table.to_string();
        let conflict_column = conflict_column.to_string();
        self.submit(move |h| h.upsert(&table, &row, &conflict_column, &update_columns))
            .await
    }

    pub async fn create_table(&self, name: &str, columns: &str) -> Result<()> {
        let name = name.to_string();
        let columns = columns.to_string();
        self.submit(move |h| h.create_table(&name, &columns)).await
    }

    pub async fn create_index(
        &self,
        index_name: &str,
        table: &str,
        columns: Vec<String>,
        unique: bool,
    ) -> Result<()> {
        let index_name = index_name.to_string();
        let table = table.to_string();
        self.submit(move |h| h.create_index(&index_name, &table, &columns, unique))
            .await
    }

    pub async fn drop_table(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.submit(move |h| h.drop_table(&name)).await
    }

    pub async fn drop_index(&self, index_name: &str) -> Result<()> {
        let index_name = index_name.to_string();
        self.submit(move |h| h.drop_index(&index_name)).await
    }

    pub async fn alter_table_add_column(
        &self,
        table: &str,
        column: &str,
        sql_type: &str,
    ) -> Result<()> {
        let table = table.to_string();
        let column = column.to_string();
        let sql_type = sql_type.to_string();
        self.submit(move |h| h.alter_table_add_column(&table, &column, &sql_type))
            .await
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let table = table.to_string();
        self.submit(move |h| h.table_exists(&table)).await
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.submit(|h| h.list_tables()).await
    }

    pub async fn list_indexes(&self, table: &str) -> Result<Vec<String>> {
        let table = table.to_string();
        self.submit(move |h| h.list_indexes(&table)).await
    }

    pub async fn get_table_schema(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let table = table.to_string();
        self.submit(move |h| h.get_table_schema(&table)).await
    }

    pub async fn vacuum(&self) -> Result<()> {
        self.submit(|h| h.vacuum()).await
    }

    pub async fn get_db_size(&self) -> Result<u64> {
        self.submit(|h| h.get_db_size()).await
    }

    pub async fn export_table_to_dict(&self, table: &str) -> Result<Vec<Value>> {
        let table = table.to_string();
        self.submit(move |h| h.export_table_to_dict(&table)).await
    }

    pub async fn import_from_dict_list(
        &self,
        table: &str,
        rows: Vec<BTreeMap<String, Value>>,
    ) -> Result<usize> {
        let table = table.to_string();
        self.submit(move |h| h.import_from_dict_list(&table, &rows))
            .await
    }

    pub async fn get_last_insert_rowid(&self) -> Result<i64> {
        self.submit(|h| h.get_last_insert_rowid()).await
    }

    pub async fn pragma(&self, name: &str, value: Option<&str>) -> Result<Option<String>> {
        let name = name.to_string();
        let value = value.map(str::to_string);
        self.submit(move |h| h.pragma(&name, value.as_deref()))
            .await
    }

    pub async fn checkpoint(&self, mode: &str) -> Result<(i64, i64, i64)> {
        let mode = mode.to_string();
        self.submit(move |h| h.checkpoint(&mode)).await
    }

    pub async fn begin_transaction(&self) -> Result<()> {
        self.submit(|h| h.begin_transaction()).await
    }

    pub async fn commit(&self) -> Result<()> {
        self.submit(|h| h.commit()).await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.submit(|h| h.rollback()).await
    }

    /// Runs `f` as a single scoped transaction: `BEGIN IMMEDIATE`, then `f`,
    /// then `COMMIT` on `Ok` or `ROLLBACK` on `Err` — all inside the one
    /// worker job that owns the primary connection for its duration, which
    /// is the async rendering of "guaranteed commit on success / rollback
    /// on all other exit paths" for a façade that cannot hold the
    /// connection open across separate awaited calls.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Handle) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(move |h| {
            h.begin_transaction()?;
            match f(h) {
                Ok(value) => {
                    h.commit()?;
                    Ok(value)
                }
                Err(e) => {
                    let _ = h.rollback();
                    Err(e)
                }
            }
        })
        .await
    }

    /// Builds a sub-table handle sharing this handle's primary connection
    /// and closed flag, submitted through the same write queue so its
    /// schema-creation step cannot race a concurrent write.
    pub async fn table(&self, name: impl Into<String>) -> Result<AsyncTableHandle> {
        let name = name.into();
        let table_handle = self.submit(move |h| h.table(&name).map(Arc::new)).await?;
        Ok(AsyncTableHandle {
            inner: table_handle,
            write_tx: self.write_tx.clone(),
        })
    }
}

/// Asynchronous mirror of [`crate::TableHandle`], sharing the parent
/// [`AsyncHandle`]'s write-dispatch queue so sub-table writes are ordered
/// relative to primary-table writes exactly as the synchronous core orders
/// them relative to each other (same connection, same lock).
pub struct AsyncTableHandle {
    inner: Arc<TableHandle>,
    write_tx: mpsc::Sender<Job>,
}

impl AsyncTableHandle {
    async fn submit<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TableHandle) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        submit(&self.write_tx, move || f(&inner)).await
    }

    /// Detaches this sub-table handle only; the parent handle stays open.
    pub async fn close(&self) {
        let inner = Arc::clone(&self.inner);
        let _ = submit(&self.write_tx, move || {
            inner.close();
            Ok(())
        })
        .await;
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.submit(move |t| t.get(&key)).await
    }

    pub async fn get_required(&self, key: &str) -> Result<Value> {
        let key = key.to_string();
        self.submit(move |t| t.get_required(&key)).await
    }

    pub async fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let key = key.to_string();
        let value = value.into();
        self.submit(move |t| t.set(&key, value)).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.submit(move |t| t.delete(&key)).await
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.submit(move |t| t.contains(&key)).await
    }

    pub async fn len(&self) -> Result<usize> {
        self.submit(|t| t.len()).await
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.submit(|t| t.keys()).await
    }

    /// Mirrors Python's `iter(dict)`, which yields keys only; see
    /// [`crate::Handle::iter`].
    pub async fn iter(&self) -> Result<Vec<String>> {
        self.keys().await
    }

    pub async fn to_dict(&self) -> Result<BTreeMap<String, Value>> {
        self.submit(|t| t.to_dict()).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.submit(|t| t.clear()).await
    }

    pub async fn batch_update(&self, entries: Vec<(String, Value)>) -> Result<()> {
        self.submit(move |t| t.batch_update(&entries)).await
    }

    pub async fn batch_delete(&self, keys: Vec<String>) -> Result<()> {
        self.submit(move |t| t.batch_delete(&keys)).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn query(
        &self,
        table: Option<&str>,
        columns: &str,
        where_clause: Option<&str>,
        order_by: Option<&str>,
        params: Vec<Value>,
        overrides: &FunctionOverride<'_>,
    ) -> Result<Vec<Value>> {
        let table = table.map(str::to_string);
        let columns = columns.to_string();
        let where_clause = where_clause.map(str::to_string);
        let order_by = order_by.map(str::to_string);
        let owned = OwnedOverride::capture(overrides);
        self.submit(move |t| {
            t.query(
                table.as_deref(),
                &columns,
                where_clause.as_deref(),
                order_by.as_deref(),
                &params,
                &owned.borrow(),
            )
        })
        .await
    }

    pub async fn count(
        &self,
        table: Option<&str>,
        where_clause: Option<&str>,
        params: Vec<Value>,
        overrides: &FunctionOverride<'_>,
    ) -> Result<i64> {
        let table = table.map(str::to_string);
        let where_clause = where_clause.map(str::to_string);
        let owned = OwnedOverride::capture(overrides);
        self.submit(move |t| {
            t.count(table.as_deref(), where_clause.as_deref(), &params, &owned.borrow())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NanokvConfig;
    use tempfile::tempdir;

    fn temp_config() -> (tempfile::TempDir, NanokvConfig) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nanokv.db");
        let config = NanokvConfig::builder().path(path.to_string_lossy().to_string());
        (dir, config)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (_dir, config) = temp_config();
        let handle = AsyncHandle::open(config).unwrap();
        handle.set("name", "ada").await.unwrap();
        assert_eq!(handle.get("name").await.unwrap(), Some(Value::from("ada")));
    }

    #[tokio::test]
    async fn closed_handle_rejects_operations() {
        let (_dir, config) = temp_config();
        let handle = AsyncHandle::open(config).unwrap();
        handle.close().await;
        let err = handle.get("anything").await.unwrap_err();
        assert!(matches!(err, Error::Closed { .. }));
    }

    #[tokio::test]
    async fn writes_from_one_caller_are_serialized() {
        let (_dir, config) = temp_config();
        let handle = Arc::new(AsyncHandle::open(config).unwrap());
        for i in 0..50 {
            handle.set(&format!("k{i}"), i as i64).await.unwrap();
        }
        assert_eq!(handle.len().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn read_only_pool_rejects_mutating_statement() {
        let (_dir, mut config) = temp_config();
        config.read_pool_size = 2;
        let handle = AsyncHandle::open(config).unwrap();
        handle.set("user:1", "present").await.unwrap();

        let rows = handle
            .fetch_all("SELECT key FROM data", vec![])
            .await
            .unwrap();
        assert!(rows.iter().any(|row| row
            .as_object()
            .and_then(|obj| obj.get("key").cloned())
            == Some(Value::from("user:1"))));

        let err = handle
            .fetch_all("DELETE FROM data WHERE key = ?1", vec![Value::from("user:1")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Engine(_)));

        // the row survives: the read pool never executed the delete.
        assert_eq!(handle.get("user:1").await.unwrap(), Some(Value::from("present")));
    }

    #[tokio::test]
    async fn disabled_read_pool_still_serves_reads_and_writes() {
        let (_dir, config) = temp_config();
        let handle = AsyncHandle::open(config).unwrap();
        handle.set("a", 1_i64).await.unwrap();
        let rows = handle.fetch_all("SELECT key FROM data", vec![]).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn sub_table_shares_write_queue_and_stays_isolated() {
        let (_dir, config) = temp_config();
        let handle = AsyncHandle::open(config).unwrap();
        let child = handle.table("secondary").await.unwrap();

        handle.set("shared", "parent").await.unwrap();
        child.set("shared", "child").await.unwrap();

        assert_eq!(handle.get("shared").await.unwrap(), Some(Value::from("parent")));
        assert_eq!(child.get("shared").await.unwrap(), Some(Value::from("child")));
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_error() {
        let (_dir, config) = temp_config();
        let handle = AsyncHandle::open(config).unwrap();
        handle
            .create_table("t", "id INTEGER PRIMARY KEY, label TEXT")
            .await
            .unwrap();
        let result: Result<()> = handle
            .transaction(|h| {
                h.sql_insert("t", &[("label".to_string(), Value::from("x"))])?;
                Err(Error::Validation("force rollback".to_string()))
            })
            .await;
        assert!(result.is_err());
        let count = handle
            .count(Some("t"), None, vec![], &FunctionOverride::default())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
