//! Shared card service used by every client.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use rusqlite::ErrorCode;
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::db::{
    ApplyReport, CardRepository, Database, SettingsRepository, SqliteCardRepository,
    SqliteSettingsRepository,
};
use crate::models::{AlgorithmSettings, Card, CardEdit, CardId, Rating, SyncConflict};
use crate::scheduler;
use crate::{Error, Result};

/// Thread-safe local mutation API over the record store.
///
/// All operations are serialised on one connection. Mutations are stamped
/// with the injected [`Clock`], never earlier than one millisecond past the
/// last server time seen by sync, so local edits always sort after the
/// sync cursor even when the device clock lags the server.
#[derive(Clone)]
pub struct CardService {
    db: Arc<Mutex<Database>>,
    clock: Arc<dyn Clock>,
    server_time_floor: Arc<AtomicI64>,
}

impl CardService {
    /// Open a card service at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and a fresh store is
    /// created in its place.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = match Database::open(&db_path) {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local store at {} is not a database ({error}); starting fresh",
                    db_path.display()
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path)?
            }
            Err(error) => {
                return Err(Error::Unavailable(format!(
                    "{}: {error}",
                    db_path.display()
                )))
            }
        };

        Self::from_database(db)
    }

    /// Open an in-memory card service (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_database(Database::open_in_memory()?)
    }

    fn from_database(db: Database) -> Result<Self> {
        let floor = SqliteSettingsRepository::new(db.connection()).load_server_time_floor()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            clock: Arc::new(SystemClock),
            server_time_floor: Arc::new(AtomicI64::new(floor)),
        })
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the service clock, raised past the last
    /// observed server time.
    pub fn now(&self) -> i64 {
        let floor = self.server_time_floor.load(Ordering::Acquire);
        self.clock.now_millis().max(floor.saturating_add(1))
    }

    /// Record a server timestamp returned by a completed sync exchange.
    pub async fn observe_server_time(&self, server_time: i64) -> Result<()> {
        let db = self.db.lock().await;
        let floor =
            SqliteSettingsRepository::new(db.connection()).raise_server_time_floor(server_time)?;
        self.server_time_floor.fetch_max(floor, Ordering::AcqRel);
        Ok(())
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        matches!(
            error,
            Error::Database(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::NotADatabase
        )
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("vocab.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale local DB file {}", path.display());
            }
        }

        Ok(())
    }

    /// Create a new card, due immediately.
    pub async fn create(&self, original: &str, translation: &str, article: &str) -> Result<Card> {
        let original = required_field("original", original)?;
        let translation = required_field("translation", translation)?;
        let card = Card::new(original, translation, article.trim(), self.now());

        let db = self.db.lock().await;
        SqliteCardRepository::new(db.connection()).insert(&card)?;
        tracing::debug!(card_id = %card.id, "Created card");
        Ok(card)
    }

    /// Fetch a live card by id.
    pub async fn get(&self, id: &CardId) -> Result<Option<Card>> {
        let db = self.db.lock().await;
        SqliteCardRepository::new(db.connection()).get_live(id)
    }

    /// List live cards, soonest due first.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Card>> {
        let db = self.db.lock().await;
        SqliteCardRepository::new(db.connection()).list(limit, offset)
    }

    /// Number of live cards.
    pub async fn count_live(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteCardRepository::new(db.connection()).count_live()
    }

    /// Live cards due at `now`.
    pub async fn list_due(&self, now: i64) -> Result<Vec<Card>> {
        let db = self.db.lock().await;
        SqliteCardRepository::new(db.connection()).list_due(now)
    }

    /// Live cards due according to the service clock.
    pub async fn due_now(&self) -> Result<Vec<Card>> {
        self.list_due(self.now()).await
    }

    /// Rate a card using the configured adjustment for `rating`.
    pub async fn rate(&self, id: &CardId, rating: Rating) -> Result<Card> {
        let db = self.db.lock().await;
        let settings = SqliteSettingsRepository::new(db.connection()).load()?;
        let adjustment = settings.rating_adjustments.for_rating(rating);
        Self::apply_rating(&db, &settings, id, adjustment, self.now())
    }

    /// Rate a card with an explicit score adjustment.
    pub async fn rate_with_adjustment(&self, id: &CardId, adjustment: i32) -> Result<Card> {
        let db = self.db.lock().await;
        let settings = SqliteSettingsRepository::new(db.connection()).load()?;
        Self::apply_rating(&db, &settings, id, adjustment, self.now())
    }

    fn apply_rating(
        db: &Database,
        settings: &AlgorithmSettings,
        id: &CardId,
        adjustment: i32,
        now: i64,
    ) -> Result<Card> {
        let repo = SqliteCardRepository::new(db.connection());
        let card = repo
            .get_live(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let outcome = scheduler::compute_next_review(card.score, adjustment, settings, now);
        let updated = repo.record_review(id, &outcome, now)?;
        tracing::debug!(
            card_id = %id,
            score = outcome.score,
            next_review_at = outcome.next_review_at,
            archived = outcome.archived,
            "Rated card"
        );
        Ok(updated)
    }

    /// Show the card again after the configured short delay.
    pub async fn snooze(&self, id: &CardId) -> Result<Card> {
        let now = self.now();
        let db = self.db.lock().await;
        let settings = SqliteSettingsRepository::new(db.connection()).load()?;
        let next_review_at = scheduler::snooze_until(&settings, now);
        SqliteCardRepository::new(db.connection()).reschedule(id, next_review_at, now)
    }

    /// Overwrite the provided display fields.
    pub async fn edit(&self, id: &CardId, edit: CardEdit) -> Result<Card> {
        if edit.is_empty() {
            return Err(Error::InvalidInput("nothing to edit".to_string()));
        }

        let edit = CardEdit {
            original: edit
                .original
                .map(|value| required_field("original", &value))
                .transpose()?,
            translation: edit
                .translation
                .map(|value| required_field("translation", &value))
                .transpose()?,
            article: edit.article.map(|value| value.trim().to_string()),
        };

        let db = self.db.lock().await;
        SqliteCardRepository::new(db.connection()).update_fields(id, &edit, self.now())
    }

    /// Soft-delete a card, leaving a tombstone for sync.
    pub async fn soft_delete(&self, id: &CardId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteCardRepository::new(db.connection()).soft_delete(id, self.now())?;
        tracing::debug!(card_id = %id, "Deleted card");
        Ok(())
    }

    /// Reset every live card to score 0, due now.
    pub async fn reset_all(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let count = SqliteCardRepository::new(db.connection()).reset_all(self.now())?;
        tracing::info!(count, "Reset review progress");
        Ok(count)
    }

    /// Load algorithm settings.
    pub async fn load_settings(&self) -> Result<AlgorithmSettings> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).load()
    }

    /// Save algorithm settings.
    pub async fn save_settings(&self, settings: &AlgorithmSettings) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).save(settings)
    }

    /// Rows changed after `cursor`, tombstones included.
    pub async fn changed_since(&self, cursor: i64) -> Result<Vec<Card>> {
        let db = self.db.lock().await;
        SqliteCardRepository::new(db.connection()).changed_since(cursor)
    }

    /// Apply rows received from the sync service in one transaction.
    pub async fn apply_remote(&self, cards: &[Card], cursor: i64) -> Result<ApplyReport> {
        let db = self.db.lock().await;
        SqliteCardRepository::new(db.connection()).apply_remote(cards, cursor, self.now())
    }

    /// Finish a sync round under one lock.
    ///
    /// Writes the returned rows, re-stamps local edits that were made while
    /// the exchange was in flight past `server_time`, then raises the stamp
    /// floor. Every edit the round did not carry sorts after the new cursor.
    pub async fn apply_round(
        &self,
        pushed: &[Card],
        incoming: &[Card],
        cursor: i64,
        server_time: i64,
    ) -> Result<ApplyReport> {
        let db = self.db.lock().await;
        let now = self.now().max(server_time.saturating_add(1));
        let report = SqliteCardRepository::new(db.connection()).apply_round(
            pushed,
            incoming,
            cursor,
            server_time,
            now,
        )?;
        let floor =
            SqliteSettingsRepository::new(db.connection()).raise_server_time_floor(server_time)?;
        self.server_time_floor.fetch_max(floor, Ordering::AcqRel);
        Ok(report)
    }

    /// List recently resolved sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        SqliteCardRepository::new(db.connection()).list_conflicts(limit)
    }
}

fn required_field(name: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{name} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::scheduler::ARCHIVED_NEXT_REVIEW_AT;
    use crate::MaxScoreBehavior;
    use pretty_assertions::assert_eq;

    const START: i64 = 1_700_000_000_000;

    fn service() -> (CardService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let service = CardService::open_in_memory()
            .unwrap()
            .with_clock(clock.clone());
        (service, clock)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_and_list_roundtrip() {
        let (service, _) = service();

        let card = service.create(" Haus ", "house", "das").await.unwrap();
        assert_eq!(card.original, "Haus");

        let cards = service.list(10, 0).await.unwrap();
        assert_eq!(cards, vec![card]);
        assert_eq!(service.count_live().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_rejects_blank_fields() {
        let (service, _) = service();
        assert!(matches!(
            service.create("  ", "house", "").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            service.create("Haus", "", "").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rating_good_schedules_next_level() {
        let (service, clock) = service();
        let card = service.create("Haus", "house", "das").await.unwrap();

        clock.advance(5_000);
        let rated = service.rate(&card.id, Rating::Good).await.unwrap();

        assert_eq!(rated.score, 1);
        assert_eq!(rated.last_reviewed_at, START + 5_000);
        assert_eq!(rated.updated_at, START + 5_000);
        assert_eq!(rated.next_review_at, START + 5_000 + 3_600_000);
        assert!(service.due_now().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rating_again_at_zero_stays_at_zero() {
        let (service, _) = service();
        let card = service.create("Haus", "house", "das").await.unwrap();

        let rated = service.rate(&card.id, Rating::Again).await.unwrap();
        assert_eq!(rated.score, 0);
        assert_eq!(rated.next_review_at, START + 600_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn archive_behavior_removes_card_from_due_set() {
        let (service, clock) = service();
        let mut settings = AlgorithmSettings::default().with_behavior(MaxScoreBehavior::Archive);
        settings.max_score = 1;
        settings.intervals.retain(|level, _| *level <= 1);
        service.save_settings(&settings).await.unwrap();

        let card = service.create("Haus", "house", "das").await.unwrap();
        let rated = service.rate_with_adjustment(&card.id, 3).await.unwrap();
        assert_eq!(rated.next_review_at, ARCHIVED_NEXT_REVIEW_AT);

        clock.advance(365 * 24 * 3_600_000);
        assert!(service.due_now().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn snooze_keeps_score_and_review_time() {
        let (service, clock) = service();
        let card = service.create("Haus", "house", "das").await.unwrap();
        let rated = service.rate(&card.id, Rating::Easy).await.unwrap();

        clock.advance(1_000);
        let snoozed = service.snooze(&card.id).await.unwrap();
        assert_eq!(snoozed.score, rated.score);
        assert_eq!(snoozed.last_reviewed_at, rated.last_reviewed_at);
        assert_eq!(snoozed.next_review_at, START + 1_000 + 60_000);
        assert_eq!(snoozed.updated_at, START + 1_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn edit_updates_display_fields_only() {
        let (service, clock) = service();
        let card = service.create("Hous", "house", "").await.unwrap();

        clock.advance(10);
        let edited = service
            .edit(
                &card.id,
                CardEdit {
                    original: Some("Haus".to_string()),
                    article: Some("das".to_string()),
                    ..CardEdit::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(edited.original, "Haus");
        assert_eq!(edited.article, "das");
        assert_eq!(edited.translation, "house");
        assert_eq!(edited.next_review_at, card.next_review_at);
        assert_eq!(edited.updated_at, START + 10);

        assert!(matches!(
            service.edit(&card.id, CardEdit::default()).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleted_card_rejects_mutations() {
        let (service, _) = service();
        let card = service.create("Haus", "house", "das").await.unwrap();
        service.soft_delete(&card.id).await.unwrap();

        assert!(service.get(&card.id).await.unwrap().is_none());
        assert!(matches!(
            service.rate(&card.id, Rating::Good).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            service.snooze(&card.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            service.soft_delete(&card.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_all_makes_every_card_due() {
        let (service, clock) = service();
        let a = service.create("a", "a", "").await.unwrap();
        let b = service.create("b", "b", "").await.unwrap();
        service.rate(&a.id, Rating::Easy).await.unwrap();
        service.rate(&b.id, Rating::Good).await.unwrap();
        assert!(service.due_now().await.unwrap().is_empty());

        clock.advance(100);
        assert_eq!(service.reset_all().await.unwrap(), 2);

        let due = service.due_now().await.unwrap();
        assert_eq!(due.len(), 2);
        assert!(due.iter().all(|card| card.score == 0));
        assert!(due.iter().all(|card| card.updated_at == START + 100));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn changed_since_includes_tombstones() {
        let (service, clock) = service();
        let card = service.create("Haus", "house", "das").await.unwrap();
        let cursor = clock.now_millis();

        clock.advance(1);
        service.soft_delete(&card.id).await.unwrap();

        let changes = service.changed_since(cursor).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].deleted_at, Some(START + 1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mutations_sort_after_observed_server_time() {
        let (service, _) = service();
        let server_time = START + 3_600_000;
        service.observe_server_time(server_time).await.unwrap();

        let card = service.create("Haus", "house", "das").await.unwrap();
        assert_eq!(card.updated_at, server_time + 1);
        assert_eq!(service.changed_since(server_time).await.unwrap(), vec![card]);

        service.observe_server_time(START).await.unwrap();
        assert_eq!(service.now(), server_time + 1);
    }

    #[test]
    fn server_time_floor_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("vocab.db");
        let runtime = tokio::runtime::Runtime::new().unwrap();

        let service = CardService::open_path(&db_path).unwrap();
        runtime
            .block_on(service.observe_server_time(i64::MAX / 2))
            .unwrap();
        drop(service);

        let reopened = CardService::open_path(&db_path).unwrap();
        assert_eq!(reopened.now(), i64::MAX / 2 + 1);
    }

    #[test]
    fn detects_corrupted_db_errors() {
        let corrupted = Error::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_NOTADB),
            None,
        ));
        assert!(CardService::is_corrupted_db_error(&corrupted));
        assert!(!CardService::is_corrupted_db_error(&Error::InvalidInput(
            "original cannot be empty".to_string()
        )));
    }

    #[test]
    fn open_path_recovers_from_corrupted_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("vocab.db");
        std::fs::write(&db_path, vec![b'x'; 4096]).unwrap();
        std::fs::write(tmp.path().join("vocab.db-wal"), b"wal").unwrap();

        CardService::open_path(&db_path).unwrap();

        let mut found_backup = false;
        for entry in std::fs::read_dir(tmp.path()).unwrap() {
            let entry = entry.unwrap();
            let file_name = entry.file_name();
            if file_name.to_string_lossy().starts_with("vocab.db.corrupt-") {
                found_backup = true;
            }
        }
        assert!(found_backup);
    }
}
