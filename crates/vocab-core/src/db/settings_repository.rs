//! Settings repository implementation

use crate::error::{Error, Result};
use crate::models::AlgorithmSettings;
use rusqlite::{params, Connection, OptionalExtension};

const ALGORITHM_SETTINGS_KEY: &str = "algorithm_settings";
const SERVER_TIME_FLOOR_KEY: &str = "server_time_floor";

/// Trait for settings storage operations
pub trait SettingsRepository {
    /// Load algorithm settings, persisting defaults on first use
    fn load(&self) -> Result<AlgorithmSettings>;

    /// Validate and save algorithm settings
    fn save(&self, settings: &AlgorithmSettings) -> Result<()>;

    /// Latest server timestamp seen by this device, 0 if never synced
    fn load_server_time_floor(&self) -> Result<i64>;

    /// Raise the stored server timestamp; lower values are ignored
    fn raise_server_time_floor(&self, server_time: i64) -> Result<i64>;
}

/// `SQLite` implementation of `SettingsRepository`
pub struct SqliteSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Get a single setting value
    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Set a single setting value
    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn load(&self) -> Result<AlgorithmSettings> {
        let Some(raw) = self.get_setting(ALGORITHM_SETTINGS_KEY)? else {
            let defaults = AlgorithmSettings::default();
            self.save(&defaults)?;
            return Ok(defaults);
        };

        match serde_json::from_str::<AlgorithmSettings>(&raw) {
            Ok(settings) if settings.validate().is_ok() => Ok(settings),
            Ok(_) | Err(_) => {
                tracing::warn!("Stored algorithm settings are invalid; using defaults");
                Ok(AlgorithmSettings::default())
            }
        }
    }

    fn save(&self, settings: &AlgorithmSettings) -> Result<()> {
        settings.validate().map_err(Error::InvalidInput)?;
        let json = serde_json::to_string(settings)?;
        self.set_setting(ALGORITHM_SETTINGS_KEY, &json)
    }

    fn load_server_time_floor(&self) -> Result<i64> {
        Ok(self
            .get_setting(SERVER_TIME_FLOOR_KEY)?
            .and_then(|value| value.parse().ok())
            .unwrap_or(0))
    }

    fn raise_server_time_floor(&self, server_time: i64) -> Result<i64> {
        let floor = self.load_server_time_floor()?.max(server_time);
        self.set_setting(SERVER_TIME_FLOOR_KEY, &floor.to_string())?;
        Ok(floor)
    }
}
