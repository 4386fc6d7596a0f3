//! Error types for stride-store.

use std::path::PathBuf;

/// Result type for stride-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in stride-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Stored value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored day or key failed to parse.
    #[error("Parse error: {0}")]
    Parse(#[from] stride_types::ParseError),

    /// CSV export error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A backend lock was poisoned by a panicking writer.
    #[error("Store lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
