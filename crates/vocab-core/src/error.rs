//! Error types for vocab-core

use thiserror::Error;

/// Result type alias using vocab-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vocab-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Card not found (unknown id or already deleted)
    #[error("Card not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store could not be opened or used
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
