use thiserror::Error;

/// Failures of the persistent store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no platform data directory for the store")]
    NoDataDir,

    #[error("store directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("record not found")]
    NotFound,

    #[error("schema migration to v{version} failed: {source}")]
    Migration {
        version: u32,
        source: rusqlite::Error,
    },

    /// A column held a value this build cannot interpret.
    #[error("invalid stored value: {0}")]
    InvalidValue(String),

    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
