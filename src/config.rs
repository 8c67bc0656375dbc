//! Configuration for a [`crate::Handle`]/[`crate::AsyncHandle`], loadable from
//! a `Nanokv.toml` file or built up programmatically. Reads a TOML file and
//! falls back to defaults if it is absent.

use std::fs;
use std::io;
use std::path::Path;

use log::info;
use serde::Deserialize;

use crate::codec::EncryptionMode;

/// Which eviction/expiry strategy the in-process cache uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategyKind {
    #[default]
    Unbounded,
    Lru,
    Ttl,
}

/// Full configuration for a nanokv handle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NanokvConfig {
    /// Path to the SQLite file.
    pub path: String,
    /// Name of the primary key/value table.
    pub table: String,
    /// Run `load_all` at open.
    pub bulk_load: bool,
    /// Apply the default performance PRAGMAs at open.
    pub optimize: bool,
    /// SQLite page-cache size, in megabytes.
    pub cache_size_mb: i64,
    /// SQLite busy timeout, in milliseconds. `None` leaves the engine default.
    pub busy_timeout_ms: Option<u32>,
    /// Set `locking_mode = EXCLUSIVE`.
    pub exclusive_lock: bool,
    /// `wal_autocheckpoint` threshold, in pages.
    pub wal_autocheckpoint: Option<u32>,
    /// Hard-error (true) vs. warn (false) on risky SQL fragments.
    pub strict_sql_validation: bool,
    /// Additive allow-list for function-call detection.
    pub allowed_sql_functions: Vec<String>,
    /// Deny-list; always wins over any allow-list.
    pub forbidden_sql_functions: Vec<String>,
    /// Cap on per-clause string length. `None` disables the cap.
    pub max_clause_length: Option<usize>,
    /// Cache eviction/expiry strategy.
    pub cache_strategy: CacheStrategyKind,
    /// Capacity for the LRU strategy.
    pub cache_size: Option<usize>,
    /// TTL, in seconds, for the TTL strategy.
    pub cache_ttl: Option<u64>,
    /// Also treat on-disk rows older than `cache_ttl` as stale.
    pub cache_persistence_ttl: bool,
    /// Base64 or raw UTF-8 secret enabling value-level encryption.
    pub encryption_key: Option<String>,
    /// Which authenticated-encryption scheme to use.
    pub encryption_mode: EncryptionMode,
    /// Async worker pool size.
    pub max_workers: usize,
    /// Async read-only pool size (0 disables the pool).
    pub read_pool_size: usize,
}

impl Default for NanokvConfig {
    fn default() -> Self {
        NanokvConfig {
            path: "nanokv.db".to_string(),
            table: "data".to_string(),
            bulk_load: false,
            optimize: true,
            cache_size_mb: 64,
            busy_timeout_ms: None,
            exclusive_lock: false,
            wal_autocheckpoint: None,
            strict_sql_validation: true,
            allowed_sql_functions: Vec::new(),
            forbidden_sql_functions: Vec::new(),
            max_clause_length: Some(1000),
            cache_strategy: CacheStrategyKind::Unbounded,
            cache_size: None,
            cache_ttl: None,
            cache_persistence_ttl: false,
            encryption_key: None,
            encryption_mode: EncryptionMode::AesGcm,
            max_workers: 5,
            read_pool_size: 0,
        }
    }
}

impl NanokvConfig {
    /// Starts a builder seeded with the defaults above.
    pub fn builder() -> NanokvConfig {
        NanokvConfig::default()
    }

    /// Sets the database file path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the primary table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Reads configuration from a TOML file, falling back to defaults if the
    /// file does not exist — a missing config file is not an error.
    pub fn from_file(file_path: impl AsRef<Path>) -> io::Result<Self> {
        let file_path = file_path.as_ref();
        if !file_path.exists() {
            info!("{} not found, using default values", file_path.display());
            return Ok(NanokvConfig::default());
        }

        let contents = fs::read_to_string(file_path)?;
        let config: NanokvConfig = toml::from_str(&contents)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(config)
    }
}
