//! Sync error types

use std::time::Duration;

use thiserror::Error;

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a sync round. The cursor is never advanced on error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The sync service rejected the bearer token
    #[error("Sync token was rejected by the server")]
    Unauthorized,

    /// The sync service rejected the request as malformed
    #[error("Sync request rejected: {0}")]
    Rejected(String),

    /// The sync service failed while handling the request
    #[error("Sync service error: {0}")]
    Server(String),

    /// The request never produced an HTTP response
    #[error("Network error: {0}")]
    Network(String),

    /// No response within the request timeout
    #[error("Sync request timed out")]
    Timeout,

    /// The response body could not be decoded
    #[error("Malformed sync response: {0}")]
    MalformedResponse(String),

    /// A previous round failed recently
    #[error("Sync is cooling down after a failure; retry in {}s", .0.as_secs().max(1))]
    CoolingDown(Duration),

    /// Invalid client configuration
    #[error("Invalid sync configuration: {0}")]
    InvalidConfiguration(String),

    /// Local store or cursor failure
    #[error(transparent)]
    Store(#[from] crate::Error),
}

impl SyncError {
    /// Whether retrying later without user action may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::Server(_) | Self::CoolingDown(_)
        )
    }
}
