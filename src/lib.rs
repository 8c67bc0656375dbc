//! nanokv: an embedded, persistent key/value mapping over SQLite.
//!
//! A [`Handle`] opens a SQLite file and behaves like a dict-like mapping
//! backed by a single table, with an in-process cache in front of it, an
//! optional authenticated-encryption codec wrapping every stored value, a
//! defensive layer over caller-supplied SQL fragments, and direct-SQL/schema/
//! admin/transaction escape hatches for everything a pure key/value API
//! can't express. [`AsyncHandle`] is the same surface behind a FIFO-ordered
//! dispatch queue plus an optional read-only connection pool, for callers
//! running under `tokio`.

pub mod async_handle;
pub mod cache;
pub mod codec;
pub mod config;
pub(crate) mod core;
pub mod error;
pub mod handle;
pub mod sql_safety;
pub mod table_handle;
pub mod value;

pub use crate::async_handle::{AsyncHandle, AsyncTableHandle};
pub use crate::cache::CacheStrategy;
pub use crate::codec::EncryptionMode;
pub use crate::config::{CacheStrategyKind, NanokvConfig};
pub use crate::core::ColumnInfo;
pub use crate::error::{Error, Result};
pub use crate::handle::Handle;
pub use crate::sql_safety::{FunctionOverride, SqlSafetyConfig};
pub use crate::table_handle::TableHandle;
pub use crate::value::Value;
