//! Wire types for `POST /v1/sync`

use serde::{Deserialize, Serialize};

use crate::models::Card;

/// Route served by the sync service
pub const SYNC_PATH: &str = "/v1/sync";

/// Changes pushed by a device since its last successful round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Server timestamp returned by the previous round, 0 on first sync
    pub last_sync_timestamp: i64,
    /// Local rows (tombstones included) modified after the cursor
    pub changes: Vec<Card>,
}

/// Rows the device has not seen yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Server time of this round; the device's next cursor
    pub timestamp: i64,
    #[serde(default)]
    pub changes: Vec<Card>,
}
