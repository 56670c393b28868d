//! Sync client for the card service.
//!
//! A round collects every local change since the stored cursor, exchanges it
//! with the sync service and applies what comes back. See [`SyncClient`].

mod client;
mod cursor;
mod error;
mod protocol;
mod transport;

pub use client::{
    SyncClient, SyncClientConfig, SyncOutcome, SyncPhase, SyncReport, SyncStatus,
};
pub use cursor::{CursorStore, FileCursorStore, MemoryCursorStore};
pub use error::{SyncError, SyncResult};
pub use protocol::{SyncRequest, SyncResponse, SYNC_PATH};
pub use transport::{HttpSyncTransport, SyncTransport};
