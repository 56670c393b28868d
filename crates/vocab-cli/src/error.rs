use std::io;

use thiserror::Error;
use vocab_core::sync::SyncError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] vocab_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Card ID cannot be empty")]
    EmptyCardId,
    #[error("Card not found for id/prefix: {0}")]
    CardNotFound(String),
    #[error("{0}")]
    AmbiguousCardId(String),
    #[error("Provide a rating (again, hard, good, easy) or --adjust")]
    MissingRating,
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
    #[error("Refusing to reset review progress without --yes")]
    ResetNotConfirmed,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Run `vocab config set server-url <URL>` and `vocab config set token <TOKEN>`, or set VOCAB_SERVER_URL and VOCAB_SYNC_TOKEN."
    )]
    SyncNotConfigured,
}
