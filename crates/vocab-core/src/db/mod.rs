//! Local record store

mod connection;
mod migrations;
mod repository;
mod settings_repository;

pub use connection::Database;
pub use repository::{ApplyReport, CardRepository, SqliteCardRepository, LWW_STRATEGY};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
