use parley_shared::paths::StorePath;
use parley_shared::IdError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The addressed record does not exist.
    #[error("Record not found: {0}")]
    NotFound(StorePath),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// UUID parsing error.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Stored identifier failed validation.
    #[error("Identifier error: {0}")]
    Id(#[from] IdError),

    /// The access rules rejected a write.
    #[error("Permission denied at {path}: {reason}")]
    PermissionDenied { path: StorePath, reason: String },

    /// The write was well-formed but carries an invalid record.
    #[error("Invalid record at {path}: {reason}")]
    Invalid { path: StorePath, reason: String },

    /// The store has been shut down.
    #[error("Store is closed")]
    Closed,

    /// A previous holder of the store lock panicked.
    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
