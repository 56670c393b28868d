//! Sync round state machine

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::cursor::CursorStore;
use super::error::{SyncError, SyncResult};
use super::protocol::SyncRequest;
use super::transport::SyncTransport;
use crate::services::CardService;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_FAILURE_COOLDOWN: Duration = Duration::from_secs(5);

/// Timing knobs for [`SyncClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncClientConfig {
    /// Upper bound on one request/response exchange
    pub request_timeout: Duration,
    /// How long `sync()` refuses to start after a failed round
    pub failure_cooldown: Duration,
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            failure_cooldown: DEFAULT_FAILURE_COOLDOWN,
        }
    }
}

impl SyncClientConfig {
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = cooldown;
        self
    }
}

/// Where the client is within a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Collecting,
    Sending,
    Applying,
    Failed,
}

/// Snapshot of the client's progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// Local time of the last successful round
    pub last_synced_at: Option<i64>,
    pub last_error: Option<String>,
    pub rounds_completed: u64,
}

/// Counts for one completed round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Local rows sent
    pub pushed: usize,
    /// Rows returned by the server
    pub pulled: usize,
    /// Returned rows written locally
    pub applied: usize,
    /// Returned rows skipped in favour of newer local edits
    pub kept_local: usize,
    /// Cursor saved at the end of the round
    pub cursor: i64,
}

/// Result of a call to [`SyncClient::sync`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// This call ran at least one round; the report is from the last one
    Completed(SyncReport),
    /// A round was already in flight and will run again on this caller's behalf
    Coalesced,
}

#[derive(Debug, Default)]
struct ClientState {
    status: SyncStatus,
    cooldown_until: Option<Instant>,
}

/// Pushes local changes and pulls remote ones, one round at a time.
pub struct SyncClient<T, C> {
    cards: CardService,
    transport: T,
    cursor: C,
    config: SyncClientConfig,
    round: tokio::sync::Mutex<()>,
    rerun_requested: AtomicBool,
    state: Mutex<ClientState>,
}

impl<T: SyncTransport, C: CursorStore> SyncClient<T, C> {
    pub fn new(cards: CardService, transport: T, cursor: C) -> Self {
        Self::with_config(cards, transport, cursor, SyncClientConfig::default())
    }

    pub fn with_config(
        cards: CardService,
        transport: T,
        cursor: C,
        config: SyncClientConfig,
    ) -> Self {
        Self {
            cards,
            transport,
            cursor,
            config,
            round: tokio::sync::Mutex::new(()),
            rerun_requested: AtomicBool::new(false),
            state: Mutex::new(ClientState::default()),
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.state().status.clone()
    }

    /// Cursor as last saved.
    pub fn cursor(&self) -> SyncResult<i64> {
        Ok(self.cursor.load()?)
    }

    /// Run a sync round.
    ///
    /// If a round is already running the call returns
    /// [`SyncOutcome::Coalesced`] immediately and the running caller performs
    /// one more round before returning. When the running round fails, the
    /// pending rerun is dropped along with it: the failure is reported through
    /// [`SyncClient::status`] and the cooldown applies to every caller.
    pub async fn sync(&self) -> SyncResult<SyncOutcome> {
        if let Some(remaining) = self.cooldown_remaining() {
            return Err(SyncError::CoolingDown(remaining));
        }

        // Flag before trying the lock so a holder that is finishing up sees it
        self.rerun_requested.store(true, Ordering::SeqCst);

        let mut last_report = None;
        loop {
            let Ok(guard) = self.round.try_lock() else {
                tracing::debug!("Sync round already in flight; coalescing request");
                return Ok(last_report.map_or(SyncOutcome::Coalesced, SyncOutcome::Completed));
            };

            if !self.rerun_requested.swap(false, Ordering::SeqCst) {
                // Another caller's round started after this request was made
                return Ok(last_report.map_or(SyncOutcome::Coalesced, SyncOutcome::Completed));
            }

            let result = self.run_round().await;
            drop(guard);

            match result {
                Ok(report) => {
                    self.record_success();
                    last_report = Some(report);
                }
                Err(error) => {
                    self.rerun_requested.store(false, Ordering::SeqCst);
                    self.record_failure(&error);
                    return Err(error);
                }
            }

            if !self.rerun_requested.load(Ordering::SeqCst) {
                return Ok(last_report.map_or(SyncOutcome::Coalesced, SyncOutcome::Completed));
            }
            tracing::debug!("Sync requested during round; running again");
        }
    }

    async fn run_round(&self) -> SyncResult<SyncReport> {
        let cursor = self.cursor.load()?;

        self.set_phase(SyncPhase::Collecting);
        let changes = self.cards.changed_since(cursor).await?;
        let pushed = changes.len();
        let request = SyncRequest {
            last_sync_timestamp: cursor,
            changes,
        };

        self.set_phase(SyncPhase::Sending);
        tracing::debug!(cursor, pushed, "Sending sync request");
        let response = tokio::time::timeout(
            self.config.request_timeout,
            self.transport.exchange(&request),
        )
        .await
        .map_err(|_| SyncError::Timeout)??;

        if response.timestamp < 0 {
            return Err(SyncError::MalformedResponse(format!(
                "negative server timestamp {}",
                response.timestamp
            )));
        }

        self.set_phase(SyncPhase::Applying);
        let applied = self
            .cards
            .apply_round(&request.changes, &response.changes, cursor, response.timestamp)
            .await?;
        self.cursor.save(response.timestamp)?;

        let report = SyncReport {
            pushed,
            pulled: response.changes.len(),
            applied: applied.applied,
            kept_local: applied.kept_local,
            cursor: response.timestamp,
        };
        tracing::info!(
            pushed = report.pushed,
            pulled = report.pulled,
            applied = report.applied,
            kept_local = report.kept_local,
            restamped = applied.restamped,
            cursor = report.cursor,
            "Sync round completed"
        );
        Ok(report)
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: SyncPhase) {
        tracing::debug!(?phase, "Sync phase");
        self.state().status.phase = phase;
    }

    fn cooldown_remaining(&self) -> Option<Duration> {
        let until = self.state().cooldown_until?;
        until.checked_duration_since(Instant::now())
    }

    fn record_success(&self) {
        let now = self.cards.now();
        let mut state = self.state();
        state.status.phase = SyncPhase::Idle;
        state.status.last_synced_at = Some(now);
        state.status.last_error = None;
        state.status.rounds_completed += 1;
        state.cooldown_until = None;
    }

    fn record_failure(&self, error: &SyncError) {
        tracing::warn!(%error, "Sync round failed");
        let mut state = self.state();
        state.status.phase = SyncPhase::Failed;
        state.status.last_error = Some(error.to_string());
        state.cooldown_until = Instant::now().checked_add(self.config.failure_cooldown);
    }
}
