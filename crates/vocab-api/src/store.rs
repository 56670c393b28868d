//! Shared card table backing `POST /v1/sync`

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use vocab_core::sync::{SyncRequest, SyncResponse};
use vocab_core::{Card, CardId};

use crate::error::AppError;

const CURRENT_VERSION: i32 = 1;

const CARD_COLUMNS: &str = "id, original, translation, article, score, created_at, \
     last_reviewed_at, next_review_at, updated_at, deleted_at";

/// How a pushed row is merged with the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Apply only when the incoming `updatedAt` is not older than the stored one
    #[default]
    NewestWins,
    /// Apply every push in arrival order
    LastPusherWins,
}

impl MergePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewestWins => "newest-wins",
            Self::LastPusherWins => "last-pusher-wins",
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "newest-wins" => Ok(Self::NewestWins),
            "last-pusher-wins" => Ok(Self::LastPusherWins),
            other => Err(format!(
                "SYNC_MERGE_POLICY must be `newest-wins` or `last-pusher-wins`, got `{other}`"
            )),
        }
    }
}

/// Summary of one applied batch, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub written: usize,
    pub stale: usize,
    pub foreign: usize,
}

/// Server-side card store. One connection, one writer at a time.
#[derive(Clone)]
pub struct SyncStore {
    conn: Arc<Mutex<Connection>>,
}

impl SyncStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AppError> {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .ok();
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Apply a sync request for `owner` using the wall clock.
    pub fn apply(
        &self,
        owner: &str,
        request: &SyncRequest,
        policy: MergePolicy,
    ) -> Result<(SyncResponse, ApplyStats), AppError> {
        self.apply_at(owner, request, policy, chrono::Utc::now().timestamp_millis())
    }

    /// Apply a sync request as if the wall clock read `wall_clock_ms`.
    ///
    /// Upserts and the response query run in one `IMMEDIATE` transaction; any
    /// failure leaves the store untouched.
    pub fn apply_at(
        &self,
        owner: &str,
        request: &SyncRequest,
        policy: MergePolicy,
        wall_clock_ms: i64,
    ) -> Result<(SyncResponse, ApplyStats), AppError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| AppError::internal("sync store lock poisoned"))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let server_now = next_server_time(&tx, wall_clock_ms)?;
        let mut stats = ApplyStats::default();
        let mut stale_ids = Vec::new();

        for card in &request.changes {
            if upsert_card(&tx, owner, card, policy, server_now)? {
                stats.written += 1;
                continue;
            }

            match stored_owner(&tx, &card.id)? {
                Some(stored) if stored == owner => {
                    stats.stale += 1;
                    stale_ids.push(card.id);
                }
                _ => {
                    stats.foreign += 1;
                    tracing::debug!(card_id = %card.id, "Ignored push for card owned by another account");
                }
            }
        }

        let changes = select_changes(
            &tx,
            owner,
            request.last_sync_timestamp,
            server_now,
            &stale_ids,
        )?;
        tx.commit()?;

        Ok((
            SyncResponse {
                timestamp: server_now,
                changes,
            },
            stats,
        ))
    }
}

fn migrate(conn: &Connection) -> Result<(), AppError> {
    let has_version_table = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    let version: i32 = if has_version_table {
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?
    } else {
        0
    };

    if version < 1 {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                original TEXT NOT NULL,
                translation TEXT NOT NULL,
                article TEXT NOT NULL DEFAULT '',
                score INTEGER NOT NULL CHECK (score >= 0),
                created_at INTEGER NOT NULL,
                last_reviewed_at INTEGER NOT NULL,
                next_review_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                deleted_at INTEGER,
                server_updated_at INTEGER NOT NULL,
                CHECK (deleted_at IS NOT NULL OR next_review_at >= 0)
            );
            CREATE INDEX IF NOT EXISTS idx_cards_owner_server_updated
                ON cards(owner_id, server_updated_at);
            CREATE TABLE IF NOT EXISTS sync_clock (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_issued INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO sync_clock (id, last_issued) VALUES (1, 0);
            INSERT INTO schema_version (version) VALUES (1);",
        )?;
        tx.commit()?;
        tracing::info!("Migrated sync store to version {CURRENT_VERSION}");
    }

    Ok(())
}

/// Strictly increasing server timestamp, persisted across restarts.
fn next_server_time(tx: &Transaction<'_>, wall_clock_ms: i64) -> Result<i64, AppError> {
    let last_issued: i64 =
        tx.query_row("SELECT last_issued FROM sync_clock WHERE id = 1", [], |row| {
            row.get(0)
        })?;
    let server_now = wall_clock_ms.max(last_issued.saturating_add(1));
    tx.execute(
        "UPDATE sync_clock SET last_issued = ? WHERE id = 1",
        params![server_now],
    )?;
    Ok(server_now)
}

/// Returns whether the row was written.
fn upsert_card(
    tx: &Transaction<'_>,
    owner: &str,
    card: &Card,
    policy: MergePolicy,
    server_now: i64,
) -> Result<bool, AppError> {
    let freshness = match policy {
        MergePolicy::NewestWins => " AND excluded.updated_at >= cards.updated_at",
        MergePolicy::LastPusherWins => "",
    };
    let assignments = if card.is_deleted() {
        "deleted_at = excluded.deleted_at,
         updated_at = excluded.updated_at,
         server_updated_at = excluded.server_updated_at"
    } else {
        "original = excluded.original,
         translation = excluded.translation,
         article = excluded.article,
         score = excluded.score,
         created_at = excluded.created_at,
         last_reviewed_at = excluded.last_reviewed_at,
         next_review_at = excluded.next_review_at,
         updated_at = excluded.updated_at,
         deleted_at = NULL,
         server_updated_at = excluded.server_updated_at"
    };

    let sql = format!(
        "INSERT INTO cards ({CARD_COLUMNS}, owner_id, server_updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET {assignments}
         WHERE cards.owner_id = excluded.owner_id{freshness}"
    );
    let written = tx.execute(
        &sql,
        params![
            card.id.as_str(),
            card.original,
            card.translation,
            card.article,
            card.score,
            card.created_at,
            card.last_reviewed_at,
            card.next_review_at,
            card.updated_at,
            card.deleted_at,
            owner,
            server_now,
        ],
    )?;
    Ok(written > 0)
}

fn stored_owner(tx: &Transaction<'_>, id: &CardId) -> Result<Option<String>, AppError> {
    let owner = tx
        .query_row(
            "SELECT owner_id FROM cards WHERE id = ?",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner)
}

fn select_changes(
    tx: &Transaction<'_>,
    owner: &str,
    last_sync: i64,
    server_now: i64,
    stale_ids: &[CardId],
) -> Result<Vec<Card>, AppError> {
    let mut stmt = tx.prepare_cached(&format!(
        "SELECT {CARD_COLUMNS} FROM cards
         WHERE owner_id = ? AND server_updated_at > ? AND server_updated_at <= ?
         ORDER BY server_updated_at ASC, id ASC"
    ))?;
    let mut changes = stmt
        .query_map(params![owner, last_sync, server_now], parse_card)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut seen: HashSet<CardId> = changes.iter().map(|card| card.id).collect();
    for id in stale_ids {
        if !seen.insert(*id) {
            continue;
        }
        let card = tx
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ? AND owner_id = ?"),
                params![id.as_str(), owner],
                parse_card,
            )
            .optional()?;
        changes.extend(card);
    }

    Ok(changes)
}

fn parse_card(row: &rusqlite::Row<'_>) -> rusqlite::Result<Card> {
    let id: String = row.get(0)?;
    let id = id.parse().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(Card {
        id,
        original: row.get(1)?,
        translation: row.get(2)?,
        article: row.get(3)?,
        score: row.get(4)?,
        created_at: row.get(5)?,
        last_reviewed_at: row.get(6)?,
        next_review_at: row.get(7)?,
        updated_at: row.get(8)?,
        deleted_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(last: i64, changes: Vec<Card>) -> SyncRequest {
        SyncRequest {
            last_sync_timestamp: last,
            changes,
        }
    }

    #[test]
    fn server_time_is_strictly_increasing() {
        let store = SyncStore::open_in_memory().unwrap();
        let (first, _) = store
            .apply_at("a", &request(0, vec![]), MergePolicy::NewestWins, 5_000)
            .unwrap();
        let (second, _) = store
            .apply_at("a", &request(0, vec![]), MergePolicy::NewestWins, 5_000)
            .unwrap();
        let (third, _) = store
            .apply_at("a", &request(0, vec![]), MergePolicy::NewestWins, 1_000)
            .unwrap();

        assert_eq!(first.timestamp, 5_000);
        assert_eq!(second.timestamp, 5_001);
        assert_eq!(third.timestamp, 5_002);
    }

    #[test]
    fn pushed_rows_are_returned_to_owner_only() {
        let store = SyncStore::open_in_memory().unwrap();
        let card = Card::new("Haus", "house", "das", 100);

        let (response, stats) = store
            .apply_at("a", &request(0, vec![card.clone()]), MergePolicy::NewestWins, 1_000)
            .unwrap();
        assert_eq!(stats.written, 1);
        assert_eq!(response.changes, vec![card]);

        let (other, _) = store
            .apply_at("b", &request(0, vec![]), MergePolicy::NewestWins, 2_000)
            .unwrap();
        assert!(other.changes.is_empty());
    }

    #[test]
    fn foreign_owner_cannot_overwrite() {
        let store = SyncStore::open_in_memory().unwrap();
        let card = Card::new("Haus", "house", "das", 100);
        store
            .apply_at("a", &request(0, vec![card.clone()]), MergePolicy::LastPusherWins, 1_000)
            .unwrap();

        let mut hijack = card.clone();
        hijack.translation = "stolen".to_string();
        hijack.updated_at = 500;
        let (response, stats) = store
            .apply_at("b", &request(0, vec![hijack]), MergePolicy::LastPusherWins, 2_000)
            .unwrap();
        assert_eq!(stats.foreign, 1);
        assert!(response.changes.is_empty());

        let (owner_view, _) = store
            .apply_at("a", &request(0, vec![]), MergePolicy::LastPusherWins, 3_000)
            .unwrap();
        assert_eq!(owner_view.changes, vec![card]);
    }

    #[test]
    fn newest_wins_returns_stored_row_for_stale_push() {
        let store = SyncStore::open_in_memory().unwrap();
        let mut newer = Card::new("Haus", "house", "das", 100);
        newer.updated_at = 900;
        let (first, _) = store
            .apply_at("a", &request(0, vec![newer.clone()]), MergePolicy::NewestWins, 1_000)
            .unwrap();

        let mut older = newer.clone();
        older.translation = "home".to_string();
        older.updated_at = 500;
        let (response, stats) = store
            .apply_at(
                "a",
                &request(first.timestamp, vec![older]),
                MergePolicy::NewestWins,
                2_000,
            )
            .unwrap();

        assert_eq!(stats.stale, 1);
        assert_eq!(response.changes, vec![newer]);
    }

    #[test]
    fn last_pusher_wins_accepts_older_push() {
        let store = SyncStore::open_in_memory().unwrap();
        let mut newer = Card::new("Haus", "house", "das", 100);
        newer.updated_at = 900;
        store
            .apply_at("a", &request(0, vec![newer.clone()]), MergePolicy::LastPusherWins, 1_000)
            .unwrap();

        let mut older = newer.clone();
        older.translation = "home".to_string();
        older.updated_at = 500;
        let (response, stats) = store
            .apply_at("a", &request(1_000, vec![older.clone()]), MergePolicy::LastPusherWins, 2_000)
            .unwrap();

        assert_eq!(stats.written, 1);
        assert_eq!(response.changes, vec![older]);
    }

    #[test]
    fn tombstone_keeps_fields_and_is_idempotent() {
        let store = SyncStore::open_in_memory().unwrap();
        let card = Card::new("Hund", "dog", "der", 100);
        store
            .apply_at("a", &request(0, vec![card.clone()]), MergePolicy::NewestWins, 1_000)
            .unwrap();

        let mut tombstone = card.clone();
        tombstone.original = String::new();
        tombstone.deleted_at = Some(200);
        tombstone.updated_at = 200;
        for wall in [2_000, 3_000] {
            store
                .apply_at("a", &request(0, vec![tombstone.clone()]), MergePolicy::NewestWins, wall)
                .unwrap();
        }

        let (response, _) = store
            .apply_at("a", &request(0, vec![]), MergePolicy::NewestWins, 4_000)
            .unwrap();
        assert_eq!(response.changes.len(), 1);
        assert_eq!(response.changes[0].original, "Hund");
        assert_eq!(response.changes[0].deleted_at, Some(200));
    }

    #[test]
    fn failure_mid_batch_rolls_back_everything() {
        let store = SyncStore::open_in_memory().unwrap();
        let good = Card::new("Haus", "house", "das", 100);
        let mut bad = Card::new("Hund", "dog", "der", 100);
        bad.next_review_at = -1;

        let result = store.apply_at(
            "a",
            &request(0, vec![good, bad]),
            MergePolicy::NewestWins,
            1_000,
        );
        assert!(result.is_err());

        let (response, _) = store
            .apply_at("a", &request(0, vec![]), MergePolicy::NewestWins, 500)
            .unwrap();
        assert!(response.changes.is_empty());
        // The failed request did not consume a server timestamp
        assert_eq!(response.timestamp, 500);
    }

    #[test]
    fn merge_policy_parses_config_values() {
        assert_eq!(
            "newest-wins".parse::<MergePolicy>(),
            Ok(MergePolicy::NewestWins)
        );
        assert_eq!(
            " Last-Pusher-Wins ".parse::<MergePolicy>(),
            Ok(MergePolicy::LastPusherWins)
        );
        assert!("lww".parse::<MergePolicy>().is_err());
    }
}
