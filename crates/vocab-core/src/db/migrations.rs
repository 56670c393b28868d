//! Database migrations

use std::collections::HashSet;

use crate::error::Result;
use crate::models::CardId;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    if !table_exists(conn, "schema_version")? {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(exists)
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(columns)
}

/// Migration to version 1: cards and settings
fn migrate_v1(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS cards (
            id TEXT PRIMARY KEY,
            original TEXT NOT NULL,
            translation TEXT NOT NULL,
            article TEXT NOT NULL DEFAULT '',
            score INTEGER NOT NULL DEFAULT 0 CHECK (score >= 0),
            created_at INTEGER NOT NULL,
            last_reviewed_at INTEGER NOT NULL DEFAULT 0,
            next_review_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_cards_due ON cards(next_review_at) WHERE deleted_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_cards_updated ON cards(updated_at);
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        INSERT INTO schema_version (version) VALUES (1);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: LWW conflict logging for applied sync rounds
fn migrate_v2(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id TEXT NOT NULL,
            local_updated_at INTEGER NOT NULL,
            incoming_updated_at INTEGER NOT NULL,
            resolved_at INTEGER NOT NULL,
            strategy TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_card_id ON sync_conflicts(card_id);
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC);
        INSERT INTO schema_version (version) VALUES (2);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version 2");
    Ok(())
}

/// Migration to version 3: import cards from the legacy `words` table
fn migrate_v3(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let imported = import_legacy_words(&tx, crate::util::unix_millis_now())?;
    tx.execute("INSERT INTO schema_version (version) VALUES (3)", [])?;
    tx.commit()?;

    if imported > 0 {
        tracing::info!(imported, "Imported legacy words into cards");
    }
    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

/// Copy rows of a legacy `words` table into `cards` with fresh ids.
///
/// Older stores used integer ids and camelCase review columns, some of which
/// may be missing. The legacy table is renamed afterwards so the import runs once.
fn import_legacy_words(tx: &Transaction<'_>, now: i64) -> Result<usize> {
    if !table_exists(tx, "words")? {
        return Ok(0);
    }

    let columns = table_columns(tx, "words")?;
    let pick = |name: &str, fallback: &str| {
        if columns.contains(name) {
            format!("COALESCE(\"{name}\", {fallback})")
        } else {
            fallback.to_string()
        }
    };
    let sql = format!(
        "SELECT original, translation, {article}, {score}, {created}, {reviewed}, {next} FROM words",
        article = pick("article", "''"),
        score = pick("score", "0"),
        created = pick("createdAt", "0"),
        reviewed = pick("lastReviewedAt", "0"),
        next = pick("nextReviewAt", "0"),
    );

    let rows = {
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    for (original, translation, article, score, created_at, last_reviewed_at, next_review_at) in
        &rows
    {
        let created_at = if *created_at > 0 { *created_at } else { now };
        tx.execute(
            "INSERT INTO cards (
                id, original, translation, article, score, created_at,
                last_reviewed_at, next_review_at, updated_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
            params![
                CardId::new().as_str(),
                original,
                translation,
                article,
                (*score).max(0),
                created_at,
                (*last_reviewed_at).max(0),
                (*next_review_at).max(0),
                now,
            ],
        )?;
    }

    tx.execute_batch("ALTER TABLE words RENAME TO legacy_words_imported")?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_v2_creates_conflict_table() {
        let conn = setup();
        run(&conn).unwrap();
        assert!(table_exists(&conn, "sync_conflicts").unwrap());
    }

    #[test]
    fn test_legacy_words_are_imported() {
        let conn = setup();
        conn.execute_batch(
            "CREATE TABLE words (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                original TEXT NOT NULL,
                translation TEXT NOT NULL,
                article TEXT NOT NULL DEFAULT '',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            ALTER TABLE words ADD COLUMN score INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE words ADD COLUMN createdAt INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE words ADD COLUMN lastReviewedAt INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE words ADD COLUMN nextReviewAt INTEGER NOT NULL DEFAULT 0;
            INSERT INTO words (original, translation, article, score, createdAt, nextReviewAt)
                VALUES ('Haus', 'house', 'das', 3, 1000, 5000);
            INSERT INTO words (original, translation) VALUES ('gehen', 'to go');",
        )
        .unwrap();

        run(&conn).unwrap();

        let mut stmt = conn
            .prepare("SELECT original, article, score, created_at, next_review_at FROM cards ORDER BY original")
            .unwrap();
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ("Haus".to_string(), "das".to_string(), 3, 1000, 5000));
        assert_eq!(rows[1].0, "gehen");
        assert!(rows[1].3 > 0);

        assert!(!table_exists(&conn, "words").unwrap());
        assert!(table_exists(&conn, "legacy_words_imported").unwrap());
    }

    #[test]
    fn test_legacy_import_handles_minimal_schema() {
        let conn = setup();
        conn.execute_batch(
            "CREATE TABLE words (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                original TEXT NOT NULL,
                translation TEXT NOT NULL
            );
            INSERT INTO words (original, translation) VALUES ('Katze', 'cat');",
        )
        .unwrap();

        run(&conn).unwrap();

        let (article, score): (String, i64) = conn
            .query_row("SELECT article, score FROM cards", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(article, "");
        assert_eq!(score, 0);
    }
}
