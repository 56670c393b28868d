//! Card repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{Card, CardEdit, CardId, SyncConflict};
use crate::scheduler::ReviewOutcome;
use rusqlite::{params, Connection, OptionalExtension};

const CARD_COLUMNS: &str = "id, original, translation, article, score, created_at, \
     last_reviewed_at, next_review_at, updated_at, deleted_at";

/// Strategy name recorded for rows kept by the last-writer-wins guard
pub const LWW_STRATEGY: &str = "lww";

/// Counts produced by applying a batch of remote rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Rows written locally
    pub applied: usize,
    /// Rows skipped because the local copy was newer and not yet pushed
    pub kept_local: usize,
    /// Local edits the round did not carry, re-stamped past the server time
    pub restamped: usize,
}

/// Trait for card storage operations
pub trait CardRepository {
    /// Insert a new card
    fn insert(&self, card: &Card) -> Result<()>;

    /// Get a card by ID, including tombstones
    fn get(&self, id: &CardId) -> Result<Option<Card>>;

    /// Get a live card by ID
    fn get_live(&self, id: &CardId) -> Result<Option<Card>>;

    /// List live cards, soonest due first
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Card>>;

    /// Live cards due at `now`, soonest due first
    fn list_due(&self, now: i64) -> Result<Vec<Card>>;

    /// Number of live cards
    fn count_live(&self) -> Result<usize>;

    /// Apply display-field edits
    fn update_fields(&self, id: &CardId, edit: &CardEdit, now: i64) -> Result<Card>;

    /// Store the result of a review
    fn record_review(&self, id: &CardId, outcome: &ReviewOutcome, now: i64) -> Result<Card>;

    /// Move a card's due time without touching its score
    fn reschedule(&self, id: &CardId, next_review_at: i64, now: i64) -> Result<Card>;

    /// Soft delete a card
    fn soft_delete(&self, id: &CardId, now: i64) -> Result<()>;

    /// Reset every live card to score 0, due now
    fn reset_all(&self, now: i64) -> Result<usize>;

    /// Rows (tombstones included) modified strictly after `cursor`
    fn changed_since(&self, cursor: i64) -> Result<Vec<Card>>;

    /// Upsert rows received from the server in one transaction
    fn apply_remote(&self, cards: &[Card], cursor: i64, now: i64) -> Result<ApplyReport>;

    /// Finish a sync round in one transaction.
    ///
    /// Applies `incoming` like [`CardRepository::apply_remote`], then moves
    /// every local edit in `(cursor, server_time]` that is not in `pushed`
    /// to `now`, which must be past `server_time`. Those edits were made
    /// while the round was in flight and would otherwise sort below the new
    /// cursor.
    fn apply_round(
        &self,
        pushed: &[Card],
        incoming: &[Card],
        cursor: i64,
        server_time: i64,
        now: i64,
    ) -> Result<ApplyReport>;

    /// Most recent conflict records, newest first
    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// `SQLite` implementation of `CardRepository`
pub struct SqliteCardRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCardRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a card from a database row
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

    fn query_cards(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(sql)?;
        let cards = stmt
            .query_map(params, Self::parse_card)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    fn require_live(&self, id: &CardId) -> Result<Card> {
        self.get_live(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Write returned rows, skipping newer unpushed local edits. Returns the
    /// ids that were written. Runs inside the caller's transaction.
    fn apply_rows(
        &self,
        cards: &[Card],
        cursor: i64,
        now: i64,
    ) -> Result<(ApplyReport, HashSet<String>)> {
        let mut report = ApplyReport::default();
        let mut applied = HashSet::new();

        for card in cards {
            let local_updated_at: Option<i64> = self
                .conn
                .query_row(
                    "SELECT updated_at FROM cards WHERE id = ?",
                    params![card.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            // A local edit made after the snapshot was collected has not been
            // pushed yet; keep it and let the next round send it.
            if let Some(local) = local_updated_at {
                if local > card.updated_at && local > cursor {
                    self.conn.execute(
                        "INSERT INTO sync_conflicts
                            (card_id, local_updated_at, incoming_updated_at, resolved_at, strategy)
                         VALUES (?, ?, ?, ?, ?)",
                        params![card.id.as_str(), local, card.updated_at, now, LWW_STRATEGY],
                    )?;
                    tracing::debug!(
                        card_id = %card.id,
                        local_updated_at = local,
                        incoming_updated_at = card.updated_at,
                        "Kept newer local card during sync apply"
                    );
                    report.kept_local += 1;
                    continue;
                }
            }

            self.upsert(card)?;
            applied.insert(card.id.as_str());
            report.applied += 1;
        }

        Ok((report, applied))
    }

    fn restamp_unpushed(
        &self,
        pushed: &[Card],
        applied: &HashSet<String>,
        cursor: i64,
        server_time: i64,
        now: i64,
    ) -> Result<usize> {
        let pushed: HashSet<(String, i64)> = pushed
            .iter()
            .map(|card| (card.id.as_str(), card.updated_at))
            .collect();

        let mut stmt = self
            .conn
            .prepare("SELECT id, updated_at FROM cards WHERE updated_at > ? AND updated_at <= ?")?;
        let pending = stmt
            .query_map(params![cursor, server_time], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut restamped = 0;
        for (id, updated_at) in pending {
            if applied.contains(&id) || pushed.contains(&(id.clone(), updated_at)) {
                continue;
            }
            self.conn.execute(
                "UPDATE cards SET updated_at = ? WHERE id = ?",
                params![now, id],
            )?;
            tracing::debug!(
                card_id = %id,
                updated_at,
                restamped_at = now,
                "Re-stamped card edited during sync round"
            );
            restamped += 1;
        }

        Ok(restamped)
    }

    fn upsert(&self, card: &Card) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO cards ({CARD_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    original = excluded.original,
                    translation = excluded.translation,
                    article = excluded.article,
                    score = excluded.score,
                    created_at = excluded.created_at,
                    last_reviewed_at = excluded.last_reviewed_at,
                    next_review_at = excluded.next_review_at,
                    updated_at = excluded.updated_at,
                    deleted_at = excluded.deleted_at"
            ),
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
            ],
        )?;
        Ok(())
    }
}

impl CardRepository for SqliteCardRepository<'_> {
    fn insert(&self, card: &Card) -> Result<()> {
        self.conn.execute(
            &format!("INSERT INTO cards ({CARD_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
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
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &CardId) -> Result<Option<Card>> {
        let card = self
            .conn
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?"),
                params![id.as_str()],
                Self::parse_card,
            )
            .optional()?;
        Ok(card)
    }

    fn get_live(&self, id: &CardId) -> Result<Option<Card>> {
        Ok(self.get(id)?.filter(|card| !card.is_deleted()))
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Card>> {
        self.query_cards(
            &format!(
                "SELECT {CARD_COLUMNS} FROM cards
                 WHERE deleted_at IS NULL
                 ORDER BY next_review_at ASC, created_at ASC, id ASC
                 LIMIT ? OFFSET ?"
            ),
            params![limit as i64, offset as i64],
        )
    }

    fn list_due(&self, now: i64) -> Result<Vec<Card>> {
        self.query_cards(
            &format!(
                "SELECT {CARD_COLUMNS} FROM cards
                 WHERE deleted_at IS NULL AND next_review_at <= ?
                 ORDER BY next_review_at ASC, created_at ASC, id ASC"
            ),
            params![now],
        )
    }

    fn count_live(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cards WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn update_fields(&self, id: &CardId, edit: &CardEdit, now: i64) -> Result<Card> {
        let affected = self.conn.execute(
            "UPDATE cards SET
                original = COALESCE(?, original),
                translation = COALESCE(?, translation),
                article = COALESCE(?, article),
                updated_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![edit.original, edit.translation, edit.article, now, id.as_str()],
        )?;

        if affected == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.require_live(id)
    }

    fn record_review(&self, id: &CardId, outcome: &ReviewOutcome, now: i64) -> Result<Card> {
        let affected = self.conn.execute(
            "UPDATE cards SET score = ?, last_reviewed_at = ?, next_review_at = ?, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![outcome.score, now, outcome.next_review_at, now, id.as_str()],
        )?;

        if affected == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.require_live(id)
    }

    fn reschedule(&self, id: &CardId, next_review_at: i64, now: i64) -> Result<Card> {
        let affected = self.conn.execute(
            "UPDATE cards SET next_review_at = ?, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![next_review_at, now, id.as_str()],
        )?;

        if affected == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.require_live(id)
    }

    fn soft_delete(&self, id: &CardId, now: i64) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE cards SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
            params![now, now, id.as_str()],
        )?;

        if affected == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn reset_all(&self, now: i64) -> Result<usize> {
        let affected = self.conn.execute(
            "UPDATE cards SET score = 0, next_review_at = ?, updated_at = ?
             WHERE deleted_at IS NULL",
            params![now, now],
        )?;
        Ok(affected)
    }

    fn changed_since(&self, cursor: i64) -> Result<Vec<Card>> {
        self.query_cards(
            &format!(
                "SELECT {CARD_COLUMNS} FROM cards
                 WHERE updated_at > ?
                 ORDER BY updated_at ASC, id ASC"
            ),
            params![cursor],
        )
    }

    fn apply_remote(&self, cards: &[Card], cursor: i64, now: i64) -> Result<ApplyReport> {
        let tx = self.conn.unchecked_transaction()?;
        let (report, _) = self.apply_rows(cards, cursor, now)?;
        tx.commit()?;
        Ok(report)
    }

    fn apply_round(
        &self,
        pushed: &[Card],
        incoming: &[Card],
        cursor: i64,
        server_time: i64,
        now: i64,
    ) -> Result<ApplyReport> {
        let tx = self.conn.unchecked_transaction()?;
        let (mut report, applied) = self.apply_rows(incoming, cursor, now)?;
        report.restamped = self.restamp_unpushed(pushed, &applied, cursor, server_time, now)?;
        tx.commit()?;
        Ok(report)
    }

    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, card_id, local_updated_at, incoming_updated_at, resolved_at, strategy
             FROM sync_conflicts
             ORDER BY resolved_at DESC, id DESC
             LIMIT ?",
        )?;
        let conflicts = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SyncConflict {
                    id: row.get(0)?,
                    card_id: row.get(1)?,
                    local_updated_at: row.get(2)?,
                    incoming_updated_at: row.get(3)?,
                    resolved_at: row.get(4)?,
                    strategy: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }
}
