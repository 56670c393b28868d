//! vocab-api - sync service for vocab devices
//!
//! Serves `POST /v1/sync` over a shared `SQLite` card table, scoped by the
//! account id carried in the bearer token.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use error::AppError;
pub use routes::{app_router, AppState};
pub use store::{MergePolicy, SyncStore};
