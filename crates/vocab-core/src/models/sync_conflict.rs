//! Sync conflict model

use serde::{Deserialize, Serialize};

/// Incoming remote row that was not applied because the local row was newer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Card involved in the conflict
    pub card_id: String,
    /// Local row's timestamp when the conflict occurred
    pub local_updated_at: i64,
    /// Incoming row's timestamp that was rejected
    pub incoming_updated_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
