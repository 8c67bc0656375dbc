//! Shared implementation behind both [`crate::Handle`] and
//! [`crate::TableHandle`].
//!
//! Both public types are thin wrappers around the same two pieces of state:
//! a [`HandleInner`] (the physical connection and the shared closed flag,
//! owned by the parent, borrowed by every sub-table) and a [`TableState`]
//! (everything that is *per-table*: the table name, its own cache, its own
//! codec and safety config). `Core` bundles references to both and carries
//! every dict/SQL/schema/admin/transaction operation; `Handle`/`TableHandle`
//! are just `check_open` + `self.core().<op>(..)`.

mod admin;
mod convert;
mod dict;
mod schema;
mod sql;
mod tx;

pub use schema::ColumnInfo;
pub(crate) use sql::{assemble_select, fetch_all_on, fetch_one_on};
pub(crate) use tx::TransactionGuard;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::cache::CacheStrategy;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::sql_safety::SqlSafetyConfig;

/// Connection + lifecycle state shared between a parent handle and every
/// sub-table handle built from it.
pub(crate) struct HandleInner {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) closed: AtomicBool,
    pub(crate) db_path: String,
}

impl HandleInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Everything owned independently by one physical table: its own cache, not
/// shared with the parent table or with sibling sub-tables.
pub(crate) struct TableState {
    pub(crate) table: String,
    pub(crate) cache: Mutex<Box<dyn CacheStrategy>>,
    pub(crate) codec: Codec,
    pub(crate) safety: SqlSafetyConfig,
    pub(crate) all_loaded: StdMutex<bool>,
    pub(crate) persistence_ttl: bool,
    pub(crate) cache_ttl: Option<Duration>,
}

impl TableState {
    pub(crate) fn quoted_table(&self) -> Result<String> {
        crate::sql_safety::quote_identifier(&self.table)
    }
}

/// A borrowed view combining the shared connection with one table's private
/// state; every dict/SQL/schema/admin/transaction method lives in one of the
/// sibling modules as an `impl Core<'_>` block.
#[derive(Clone, Copy)]
pub(crate) struct Core<'a> {
    pub(crate) inner: &'a HandleInner,
    pub(crate) state: &'a TableState,
}

/// Checks the shared closed flag, producing the right error for either a
/// primary handle (`table: None`) or a sub-table handle whose parent closed
/// (`table: Some(name)`).
pub(crate) fn check_open(inner: &HandleInner, table_name_if_child: Option<&str>) -> Result<()> {
    if inner.is_closed() {
        return Err(Error::Closed {
            table: table_name_if_child.map(|s| s.to_string()),
        });
    }
    Ok(())
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
