//! Error taxonomy for nanokv operations.

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All ways a nanokv operation can fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An indexed read or delete targeted a key that does not exist.
    #[error("key not found: {0}")]
    KeyMissing(String),

    /// The handle (or its parent, for a sub-table handle) has been closed.
    #[error("{}", closed_message(table))]
    Closed {
        /// The sub-table name, if the closed handle was a sub-table handle.
        table: Option<String>,
    },

    /// A SQL fragment failed strict validation (clause length, function
    /// allow/deny lists, or a dangerous lexical pattern).
    #[error("validation error: {0}")]
    Validation(String),

    /// Authenticated decryption failed; the stored envelope was tampered
    /// with, corrupted, or the wrong key was used.
    #[error("decryption failed")]
    Decryption,

    /// An error surfaced unchanged from the underlying SQLite engine.
    #[error(transparent)]
    Engine(#[from] rusqlite::Error),

    /// A value did not have the shape a typed helper expected.
    #[error("type error: {0}")]
    Type(String),
}

fn closed_message(table: &Option<String>) -> String {
    match table {
        Some(name) => format!(
            "Parent database connection is closed (table: '{name}')"
        ),
        None => "database connection is closed".to_string(),
    }
}
