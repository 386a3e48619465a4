//! Error types for the mattone service

use thiserror::Error;

/// Result type alias for mattone operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the mattone service
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket or filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Resource already bound to someone else
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<r2d2::Error> for Error {
    fn from(e: r2d2::Error) -> Self {
        Self::Database(e.to_string())
    }
}
